//! Error types for the orchestration core.

use thiserror::Error;

use crate::client::ClientError;

/// Errors that can occur while orchestrating sessions and jobs.
///
/// Every variant is reported to the immediate caller; nothing here is
/// retried or swallowed by the core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// A merged option value failed its validator.
    #[error("Invalid value {value} for option '{key}': expected {expected}")]
    Validation {
        /// Option name.
        key: String,
        /// Offending value, rendered for display.
        value: String,
        /// Constraint the value had to satisfy.
        expected: String,
    },

    /// More circuits than the backend accepts in one job.
    #[error("Job carries {requested} circuits but this backend accepts at most {max}")]
    Capacity {
        /// Number of circuits in the batch.
        requested: usize,
        /// Backend limit (`max_circuits`).
        max: usize,
    },

    /// Session resolution could not produce a live session id.
    #[error("Session error: {0}")]
    Session(String),

    /// Transport or remote failure while submitting a job.
    #[error("Job submission failed: {0}")]
    Submission(#[source] ClientError),

    /// The remote service reported the job as failed.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// Unknown result rendering format.
    #[error("Unsupported result format '{0}' (expected one of: native, qiskit, cirq, histogram, json)")]
    UnsupportedFormat(String),

    /// Result requested from a job that was never submitted.
    #[error("Job '{0}' has not been submitted")]
    NotSubmitted(String),

    /// Remote failure outside submission (status polls, result fetches).
    #[error("Remote service error: {0}")]
    Remote(#[from] ClientError),

    /// Result envelope could not be decoded.
    #[error("Result decoding failed: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No backend matches a lookup.
    #[error("Backend not found: {0}")]
    BackendNotFound(String),
}

impl HalError {
    /// Build a validation error for `key`.
    pub fn validation(
        key: impl Into<String>,
        value: impl std::fmt::Display,
        expected: impl Into<String>,
    ) -> Self {
        HalError::Validation {
            key: key.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    /// Whether this error was raised locally, before any remote call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            HalError::Validation { .. }
                | HalError::Capacity { .. }
                | HalError::UnsupportedFormat(_)
                | HalError::NotSubmitted(_)
                | HalError::Configuration(_)
        )
    }
}

/// Result type for orchestration operations.
pub type HalResult<T> = Result<T, HalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_names_key_value_and_constraint() {
        let err = HalError::validation("shots", 2_000_000, "a number in [1, 1000000]");
        let msg = err.to_string();
        assert!(msg.contains("shots"));
        assert!(msg.contains("2000000"));
        assert!(msg.contains("[1, 1000000]"));
        assert!(err.is_local());
    }

    #[test]
    fn test_capacity_display() {
        let err = HalError::Capacity {
            requested: 2,
            max: 1,
        };
        assert!(err.to_string().contains("at most 1"));
        assert!(err.is_local());
    }

    #[test]
    fn test_submission_keeps_client_error_verbatim() {
        let err = HalError::Submission(ClientError::Transport("connection reset".into()));
        assert!(err.to_string().contains("connection reset"));
        assert!(!err.is_local());
    }

    #[test]
    fn test_job_failed_carries_detail() {
        let err = HalError::JobFailed("simulation diverged".into());
        assert!(err.to_string().contains("simulation diverged"));
    }
}
