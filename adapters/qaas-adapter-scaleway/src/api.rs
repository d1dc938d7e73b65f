//! Scaleway Quantum-as-a-Service REST API client.
//!
//! Implements [`QaasClient`] over the Scaleway QaaS v1alpha1 API.
//!
//! ## Submission flow
//!
//! 1. Compress each program (zlib + base64)
//! 2. Wrap the programs in a `QuantumComputationModel` JSON document
//! 3. `POST /models` → get `model.id`
//! 4. `POST /jobs` with `model_id` + parameters → get `job.id`
//! 5. Poll `GET /jobs/{id}` until terminal state
//! 6. Read results from `GET /jobs/{id}/results` (inline or by URL)

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use qaas_hal::{
    ClientResult, CreateJobRequest, CreateSessionRequest, JobConfig, JobRecord, JobResultRecord,
    PlatformFilter, PlatformRecord, Program, QaasClient, SessionRecord,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::ProviderConfig;
use crate::error::{ScalewayError, ScalewayResult};

/// Default QaaS API root.
pub const DEFAULT_API_URL: &str = "https://api.scaleway.com/qaas/v1alpha1";

/// User agent string sent inside computation models.
const USER_AGENT: &str = concat!("qaas-adapter-scaleway/", env!("CARGO_PKG_VERSION"));

/// `CompressionFormat.ZLIB_BASE64_V1`.
const COMPRESSION_ZLIB_BASE64: u8 = 2;

/// Scaleway QaaS API client.
#[derive(Clone)]
pub struct ScalewayClient {
    /// HTTP client.
    client: Client,
    /// API root, e.g. `https://api.scaleway.com/qaas/v1alpha1`.
    base_url: String,
    /// Scaleway secret key (used as X-Auth-Token).
    secret_key: String,
    /// Scaleway project ID.
    project_id: String,
}

impl std::fmt::Debug for ScalewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalewayClient")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl ScalewayClient {
    /// Create a client against the default API root.
    pub fn new(
        secret_key: impl Into<String>,
        project_id: impl Into<String>,
    ) -> ScalewayResult<Self> {
        Self::build(
            secret_key.into(),
            project_id.into(),
            DEFAULT_API_URL,
            Duration::from_secs(120),
            Duration::from_secs(10),
        )
    }

    /// Create a client from a validated provider configuration.
    pub fn from_config(config: &ProviderConfig) -> ScalewayResult<Self> {
        Self::build(
            config.secret_key.clone(),
            config.project_id.clone(),
            &config.url,
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    fn build(
        secret_key: String,
        project_id: String,
        base_url: &str,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> ScalewayResult<Self> {
        if secret_key.is_empty() {
            return Err(ScalewayError::MissingToken);
        }
        if project_id.is_empty() {
            return Err(ScalewayError::MissingProjectId);
        }

        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(ScalewayError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key,
            project_id,
        })
    }

    /// Override the API root (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Get the project ID.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// API root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the full API URL for an endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("X-Auth-Token", &self.secret_key)
    }

    // ─── Session management ─────────────────────────────────────────

    #[instrument(skip(self, request), fields(platform_id = %request.platform_id))]
    async fn post_session(&self, request: &CreateSessionRequest) -> ScalewayResult<SessionRecord> {
        let url = self.url("/sessions");
        debug!("Creating session '{}' at {}", request.name, url);

        let body = CreateSessionBody {
            project_id: &self.project_id,
            request,
        };
        let response = self.authed(self.client.post(&url)).json(&body).send().await?;
        handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn fetch_session(&self, session_id: &str) -> ScalewayResult<SessionRecord> {
        let url = self.url(&format!("/sessions/{session_id}"));
        debug!("Getting session from {}", url);

        let response = self.authed(self.client.get(&url)).send().await?;
        handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn post_terminate(&self, session_id: &str) -> ScalewayResult<SessionRecord> {
        let url = self.url(&format!("/sessions/{session_id}/terminate"));
        debug!("Terminating session at {}", url);

        let response = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        handle_response(response).await
    }

    // ─── Model management ───────────────────────────────────────────

    /// Upload a computation model (compressed circuits + metadata).
    ///
    /// The returned model ID is passed to `POST /jobs` to reference the
    /// circuits.
    #[instrument(skip(self, payload))]
    async fn create_model(&self, payload: &str) -> ScalewayResult<ModelResponse> {
        let url = self.url("/models");
        debug!("Creating model at {}", url);

        let body = CreateModelRequest {
            project_id: self.project_id.clone(),
            payload: payload.to_string(),
        };
        let response = self.authed(self.client.post(&url)).json(&body).send().await?;
        handle_response(response).await
    }

    // ─── Job management ─────────────────────────────────────────────

    #[instrument(skip(self, request), fields(job = %request.name))]
    async fn post_job(&self, request: &CreateJobRequest) -> ScalewayResult<JobRecord> {
        let model = build_computation_model(&request.programs, &request.backend_name)?;
        let model = self.create_model(&model.to_string()).await?;

        let url = self.url("/jobs");
        debug!("Creating job at {} with model {}", url, model.id);

        let body = CreateJobBody {
            name: request.name.clone(),
            session_id: request.session_id.clone(),
            model_id: model.id,
            parameters: Some(build_computation_parameters(&request.config)),
        };
        let response = self.authed(self.client.post(&url)).json(&body).send().await?;
        handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn fetch_job(&self, job_id: &str) -> ScalewayResult<JobRecord> {
        let url = self.url(&format!("/jobs/{job_id}"));
        debug!("Getting job from {}", url);

        let response = self.authed(self.client.get(&url)).send().await?;
        handle_response(response).await
    }

    #[instrument(skip(self))]
    async fn fetch_job_results(&self, job_id: &str) -> ScalewayResult<Vec<JobResultRecord>> {
        let url = self.url(&format!("/jobs/{job_id}/results"));
        debug!("Getting job results from {}", url);

        let response = self.authed(self.client.get(&url)).send().await?;
        let body: ListJobResultsResponse = handle_response(response).await?;
        Ok(body.job_results)
    }

    /// Download a published result. Result URLs are pre-signed, so no
    /// token is attached.
    #[instrument(skip(self, url))]
    async fn fetch_url(&self, url: &str) -> ScalewayResult<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.text().await?)
        } else {
            Err(status_error(status, response.text().await.unwrap_or_default()))
        }
    }

    // ─── Platforms ──────────────────────────────────────────────────

    #[instrument(skip(self))]
    async fn fetch_platforms(&self, filter: &PlatformFilter) -> ScalewayResult<Vec<PlatformRecord>> {
        let url = self.url("/platforms");
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(name) = &filter.name {
            query.push(("name", name.as_str()));
        }
        if let Some(backend) = &filter.backend_name {
            query.push(("backend_name", backend.as_str()));
        }
        if let Some(provider) = &filter.provider_name {
            query.push(("provider_name", provider.as_str()));
        }
        debug!("Listing platforms at {} ({:?})", url, query);

        let response = self
            .authed(self.client.get(&url))
            .query(&query)
            .send()
            .await?;
        let body: ListPlatformsResponse = handle_response(response).await?;
        Ok(body
            .platforms
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect())
    }
}

#[async_trait]
impl QaasClient for ScalewayClient {
    async fn create_session(&self, request: &CreateSessionRequest) -> ClientResult<SessionRecord> {
        Ok(self.post_session(request).await?)
    }

    async fn get_session(&self, session_id: &str) -> ClientResult<SessionRecord> {
        Ok(self.fetch_session(session_id).await?)
    }

    async fn terminate_session(&self, session_id: &str) -> ClientResult<SessionRecord> {
        Ok(self.post_terminate(session_id).await?)
    }

    async fn create_job(&self, request: &CreateJobRequest) -> ClientResult<JobRecord> {
        Ok(self.post_job(request).await?)
    }

    async fn get_job(&self, job_id: &str) -> ClientResult<JobRecord> {
        Ok(self.fetch_job(job_id).await?)
    }

    async fn list_job_results(&self, job_id: &str) -> ClientResult<Vec<JobResultRecord>> {
        Ok(self.fetch_job_results(job_id).await?)
    }

    async fn download_result(&self, url: &str) -> ClientResult<String> {
        Ok(self.fetch_url(url).await?)
    }

    async fn list_platforms(&self, filter: &PlatformFilter) -> ClientResult<Vec<PlatformRecord>> {
        Ok(self.fetch_platforms(filter).await?)
    }
}

/// Extract JSON from a response, or map its status to an error.
async fn handle_response<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> ScalewayResult<T> {
    let status = response.status();

    if status.is_success() {
        let body = response.json().await?;
        Ok(body)
    } else {
        let message = response.text().await.unwrap_or_default();
        Err(status_error(status, message))
    }
}

fn status_error(status: StatusCode, message: String) -> ScalewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ScalewayError::AuthFailed(message),
        StatusCode::NOT_FOUND => ScalewayError::NotFound(message),
        StatusCode::CONFLICT => ScalewayError::Conflict(message),
        _ => ScalewayError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

// ─── Circuit compression ────────────────────────────────────────────

/// Compress a serialized circuit with zlib and encode as base64.
pub fn compress_program(source: &str) -> ScalewayResult<String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(source.as_bytes())
        .map_err(|e| ScalewayError::Compression(format!("zlib compression failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ScalewayError::Compression(format!("zlib finalize failed: {e}")))?;
    Ok(BASE64.encode(compressed))
}

/// Build the `QuantumComputationModel` JSON payload accepted by `POST /models`.
pub fn build_computation_model(
    programs: &[Program],
    backend_name: &str,
) -> ScalewayResult<serde_json::Value> {
    let programs = programs
        .iter()
        .map(|program| {
            Ok(serde_json::json!({
                "serialization_format": program.serialization_format.code(),
                "compression_format": COMPRESSION_ZLIB_BASE64,
                "serialization": compress_program(&program.serialization)?,
            }))
        })
        .collect::<ScalewayResult<Vec<_>>>()?;

    Ok(serde_json::json!({
        "programs": programs,
        "backend": {
            "name": backend_name,
            "version": null,
            "options": {}
        },
        "client": {
            "user_agent": USER_AGENT
        },
        "noise_model": null
    }))
}

/// Build the `QuantumComputationParameters` JSON string: `shots` at the top
/// level and every other job option under `options`.
pub fn build_computation_parameters(config: &JobConfig) -> String {
    let mut options = match config.to_json() {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let shots = options.remove("shots").unwrap_or(serde_json::Value::Null);
    serde_json::json!({
        "shots": shots,
        "options": options
    })
    .to_string()
}

// ─── Request types ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateSessionBody<'a> {
    project_id: &'a str,
    #[serde(flatten)]
    request: &'a CreateSessionRequest,
}

/// Request body for creating a model.
#[derive(Debug, Clone, Serialize)]
struct CreateModelRequest {
    /// Scaleway project ID.
    project_id: String,
    /// Serialized `QuantumComputationModel` JSON string.
    payload: String,
}

/// Request body for creating a job.
#[derive(Debug, Clone, Serialize)]
struct CreateJobBody {
    name: String,
    session_id: String,
    model_id: String,
    /// Execution parameters as JSON string (shots, options).
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<String>,
}

// ─── Response types ─────────────────────────────────────────────────

/// Model upload response.
#[derive(Debug, Clone, Deserialize)]
struct ModelResponse {
    /// Model ID, passed to `POST /jobs`.
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ListJobResultsResponse {
    #[serde(default)]
    job_results: Vec<JobResultRecord>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListPlatformsResponse {
    #[serde(default)]
    platforms: Vec<PlatformRecord>,
}
