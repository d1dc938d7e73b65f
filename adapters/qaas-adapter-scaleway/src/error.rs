//! Error types for the Scaleway QaaS adapter.

use qaas_hal::{ClientError, HalError};
use thiserror::Error;

/// Result type for Scaleway operations.
pub type ScalewayResult<T> = Result<T, ScalewayError>;

/// Errors that can occur when interacting with Scaleway QaaS.
#[derive(Debug, Error)]
pub enum ScalewayError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Missing API token.
    #[error("Missing Scaleway secret key (set SCALEWAY_SECRET_KEY)")]
    MissingToken,

    /// Missing project ID.
    #[error("Missing Scaleway project ID (set SCALEWAY_PROJECT_ID)")]
    MissingProjectId,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Request conflicts with the resource state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// API error response.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Circuit payload could not be compressed.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Invalid provider configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ScalewayError> for ClientError {
    fn from(e: ScalewayError) -> Self {
        match e {
            ScalewayError::Http(ref err) if err.is_decode() => ClientError::Decode(e.to_string()),
            ScalewayError::Http(err) => ClientError::Transport(err.to_string()),
            ScalewayError::Json(err) => ClientError::Decode(err.to_string()),
            ScalewayError::AuthFailed(_)
            | ScalewayError::MissingToken
            | ScalewayError::MissingProjectId => ClientError::Unauthorized(e.to_string()),
            ScalewayError::NotFound(msg) => ClientError::NotFound(msg),
            ScalewayError::Conflict(msg) => ClientError::Conflict(msg),
            ScalewayError::ApiError { status, message } => ClientError::Api { status, message },
            ScalewayError::Compression(msg) | ScalewayError::Config(msg) => {
                ClientError::Transport(msg)
            }
        }
    }
}

impl From<ScalewayError> for HalError {
    fn from(e: ScalewayError) -> Self {
        match e {
            ScalewayError::MissingToken
            | ScalewayError::MissingProjectId
            | ScalewayError::Config(_) => HalError::Configuration(e.to_string()),
            other => HalError::Remote(other.into()),
        }
    }
}
