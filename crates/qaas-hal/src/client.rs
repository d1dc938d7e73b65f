//! Remote service collaborator.
//!
//! [`QaasClient`] is the seam between the orchestration core and whatever
//! transport reaches the execution service. The core only issues the calls
//! below and trusts the service for session deduplication, expiry and job
//! execution. Retries, authentication and connection handling belong to the
//! implementation.
//!
//! | Operation | Used by |
//! |-----------|---------|
//! | `create_session` | session resolution (create-or-reuse by dedup key) |
//! | `get_session` | explicit session ids, liveness checks |
//! | `terminate_session` | `stop_session` |
//! | `create_job` | job submission |
//! | `get_job` | status polling |
//! | `list_job_results` / `download_result` | result fetch |
//! | `list_platforms` | backend discovery |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::JobConfig;
use crate::job::Program;

/// Transport-level error reported by a [`QaasClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The requested resource does not exist (or no longer exists).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Credentials were rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The request conflicts with the resource state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-success response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP-like status code.
        status: u16,
        /// Response body or message.
        message: String,
    },

    /// The request never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// Result type for collaborator calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Create-or-reuse session request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateSessionRequest {
    /// Platform (backend id) the session runs on.
    pub platform_id: String,
    /// Display name.
    pub name: String,
    /// Deduplication key; an existing live session with the same key is reused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduplication_id: Option<String>,
    /// Maximum lifetime, `"<seconds>s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<String>,
    /// Maximum idle time, `"<seconds>s"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_idle_duration: Option<String>,
}

/// Session as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session ID.
    pub id: String,
    /// Session name.
    #[serde(default)]
    pub name: Option<String>,
    /// Platform the session runs on.
    #[serde(default)]
    pub platform_id: Option<String>,
    /// Deduplication key.
    #[serde(default)]
    pub deduplication_id: Option<String>,
    /// Status: starting, running, stopping, stopped, expired.
    pub status: String,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Termination timestamp.
    #[serde(default)]
    pub terminated_at: Option<DateTime<Utc>>,
    /// Maximum lifetime (e.g. "1200s").
    #[serde(default)]
    pub max_duration: Option<String>,
    /// Maximum idle time (e.g. "1200s").
    #[serde(default)]
    pub max_idle_duration: Option<String>,
    /// Progress message from the platform.
    #[serde(default)]
    pub progress_message: Option<String>,
}

/// Job submission request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateJobRequest {
    /// Human-readable job name.
    pub name: String,
    /// Session to run the job in.
    pub session_id: String,
    /// Target platform.
    pub platform_id: String,
    /// Target platform name.
    pub backend_name: String,
    /// Ordered circuits.
    pub programs: Vec<Program>,
    /// Job-level options.
    pub config: JobConfig,
}

/// Coarse job status reported by the remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteJobStatus {
    /// Waiting in the session queue.
    Waiting,
    /// Executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
    /// Cancelled (or being cancelled).
    Cancelled,
}

/// Job as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Job ID.
    pub id: String,
    /// Job name.
    #[serde(default)]
    pub name: Option<String>,
    /// Session this job belongs to.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Status: waiting, running, completed, error, cancelled, cancelling.
    pub status: String,
    /// Progress or error message.
    #[serde(default)]
    pub progress_message: Option<String>,
    /// Job execution duration (e.g., "2.5s").
    #[serde(default)]
    pub job_duration: Option<String>,
    /// Creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Start timestamp.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Last update timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Interpret the status string. Unknown statuses count as waiting.
    pub fn remote_status(&self) -> RemoteJobStatus {
        match self.status.to_lowercase().as_str() {
            "running" => RemoteJobStatus::Running,
            "completed" => RemoteJobStatus::Completed,
            "error" => RemoteJobStatus::Error,
            "cancelled" | "cancelling" => RemoteJobStatus::Cancelled,
            _ => RemoteJobStatus::Waiting,
        }
    }
}

/// A single job result entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResultRecord {
    /// Job ID.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Inline result: a JSON document or a JSON-encoded string.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Download URL for large results.
    #[serde(default)]
    pub url: Option<String>,
    /// Timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Platform (backend) metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformRecord {
    /// Platform ID.
    pub id: String,
    /// Platform name (e.g. "aer_simulation_pop_c16m128").
    pub name: String,
    /// Platform version.
    #[serde(default)]
    pub version: String,
    /// Provider name (e.g. "aer", "qsim", "iqm").
    #[serde(default)]
    pub provider_name: String,
    /// Execution engine name.
    #[serde(default)]
    pub backend_name: String,
    /// Platform type (simulator, qpu).
    #[serde(default, rename = "type")]
    pub platform_type: Option<String>,
    /// Maximum number of qubits.
    #[serde(default)]
    pub max_qubit_count: u32,
    /// Availability: available, shortage, scarce, ...
    #[serde(default)]
    pub availability: String,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: Option<String>,
}

/// Filter for [`QaasClient::list_platforms`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformFilter {
    /// Exact platform name.
    pub name: Option<String>,
    /// Execution engine name.
    pub backend_name: Option<String>,
    /// Provider name.
    pub provider_name: Option<String>,
}

impl PlatformFilter {
    /// Match a platform by name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Whether `platform` satisfies every set criterion.
    pub fn matches(&self, platform: &PlatformRecord) -> bool {
        self.name.as_ref().is_none_or(|n| *n == platform.name)
            && self
                .backend_name
                .as_ref()
                .is_none_or(|b| *b == platform.backend_name)
            && self
                .provider_name
                .as_ref()
                .is_none_or(|p| *p == platform.provider_name)
    }
}

/// Authenticated calls against the remote execution service.
#[async_trait]
pub trait QaasClient: Send + Sync {
    /// Create a session, or return the live session holding the same
    /// deduplication key.
    async fn create_session(&self, request: &CreateSessionRequest) -> ClientResult<SessionRecord>;

    /// Look up a session.
    async fn get_session(&self, session_id: &str) -> ClientResult<SessionRecord>;

    /// Request session termination.
    async fn terminate_session(&self, session_id: &str) -> ClientResult<SessionRecord>;

    /// Submit a job into a session.
    async fn create_job(&self, request: &CreateJobRequest) -> ClientResult<JobRecord>;

    /// Look up a job.
    async fn get_job(&self, job_id: &str) -> ClientResult<JobRecord>;

    /// List result entries of a finished job.
    async fn list_job_results(&self, job_id: &str) -> ClientResult<Vec<JobResultRecord>>;

    /// Download a result published by URL.
    async fn download_result(&self, url: &str) -> ClientResult<String>;

    /// List platforms matching `filter`.
    async fn list_platforms(&self, filter: &PlatformFilter) -> ClientResult<Vec<PlatformRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: &str) -> JobRecord {
        JobRecord {
            id: "j1".into(),
            name: None,
            session_id: None,
            status: status.into(),
            progress_message: None,
            job_duration: None,
            created_at: None,
            started_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_job_status_mapping() {
        assert_eq!(job("waiting").remote_status(), RemoteJobStatus::Waiting);
        assert_eq!(job("RUNNING").remote_status(), RemoteJobStatus::Running);
        assert_eq!(job("completed").remote_status(), RemoteJobStatus::Completed);
        assert_eq!(job("error").remote_status(), RemoteJobStatus::Error);
        assert_eq!(job("cancelling").remote_status(), RemoteJobStatus::Cancelled);
        assert_eq!(job("unknown_status").remote_status(), RemoteJobStatus::Waiting);
    }

    #[test]
    fn test_session_record_deserializes_sparse_payload() {
        let record: SessionRecord = serde_json::from_str(
            r#"{"id": "s1", "status": "running", "created_at": "2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(record.id, "s1");
        assert!(record.created_at.is_some());
        assert!(record.deduplication_id.is_none());
    }

    #[test]
    fn test_platform_filter_matches() {
        let platform = PlatformRecord {
            id: "p1".into(),
            name: "qsim_simulation_l4".into(),
            version: "1.0".into(),
            provider_name: "scaleway".into(),
            backend_name: "qsim".into(),
            platform_type: Some("simulator".into()),
            max_qubit_count: 32,
            availability: "available".into(),
            metadata: None,
        };
        assert!(PlatformFilter::default().matches(&platform));
        assert!(PlatformFilter::by_name("qsim_simulation_l4").matches(&platform));
        assert!(!PlatformFilter::by_name("aer_simulation_local").matches(&platform));
        let by_backend = PlatformFilter {
            backend_name: Some("aer".into()),
            ..PlatformFilter::default()
        };
        assert!(!by_backend.matches(&platform));
    }

    #[test]
    fn test_create_session_request_skips_unset_fields() {
        let request = CreateSessionRequest {
            platform_id: "p1".into(),
            name: "auto-s".into(),
            deduplication_id: None,
            max_duration: Some("1200s".into()),
            max_idle_duration: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("deduplication_id").is_none());
        assert_eq!(json["max_duration"], "1200s");
    }
}
