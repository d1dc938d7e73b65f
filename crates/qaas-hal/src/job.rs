//! Job lifecycle types.
//!
//! The job state machine:
//!
//! ```text
//!   new() ──→ Created ──submit()──→ Submitted ──→ Running ──→ Succeeded
//!               │                       │            │
//!               │ (transport error)     └────────────┴──→ Failed(detail)
//!               └──→ stays Created
//! ```
//!
//! **Invariants:**
//! - A handle leaves `Created` only after the remote service accepted it.
//! - Transitions are monotonic; terminal states are permanent.
//! - The terminal outcome is fetched once and cached on the handle.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, CreateJobRequest, QaasClient, RemoteJobStatus};
use crate::config::{JobConfig, OptionWarning};
use crate::error::{HalError, HalResult};
use crate::result::{DecodedResult, ResultEnvelope, ResultFormat, fetch_envelope};

/// Default delay between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How a program is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SerializationFormat {
    /// OpenQASM 2.0.
    QasmV2,
    /// OpenQASM 3.0.
    QasmV3,
}

impl SerializationFormat {
    /// Numeric code used by the execution service.
    pub fn code(self) -> u8 {
        match self {
            SerializationFormat::QasmV2 => 2,
            SerializationFormat::QasmV3 => 3,
        }
    }
}

/// One circuit, opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Serialization format.
    pub serialization_format: SerializationFormat,
    /// Serialized circuit.
    pub serialization: String,
}

impl Program {
    /// An OpenQASM 2.0 program.
    pub fn qasm2(source: impl Into<String>) -> Self {
        Self {
            serialization_format: SerializationFormat::QasmV2,
            serialization: source.into(),
        }
    }

    /// An OpenQASM 3.0 program.
    pub fn qasm3(source: impl Into<String>) -> Self {
        Self {
            serialization_format: SerializationFormat::QasmV3,
            serialization: source.into(),
        }
    }
}

/// Ordered circuits of one job. Built from a single program or a sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CircuitBatch(Vec<Program>);

impl CircuitBatch {
    /// Number of circuits.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the batch against a backend's `max_circuits`.
    pub fn ensure_within(&self, max_circuits: usize) -> HalResult<()> {
        if self.0.is_empty() {
            return Err(HalError::validation(
                "circuits",
                0,
                "at least one circuit",
            ));
        }
        if self.0.len() > max_circuits {
            return Err(HalError::Capacity {
                requested: self.0.len(),
                max: max_circuits,
            });
        }
        Ok(())
    }

    /// Circuits in submission order.
    pub fn programs(&self) -> &[Program] {
        &self.0
    }

    /// Take the circuits.
    pub fn into_programs(self) -> Vec<Program> {
        self.0
    }
}

impl From<Program> for CircuitBatch {
    fn from(program: Program) -> Self {
        Self(vec![program])
    }
}

impl From<Vec<Program>> for CircuitBatch {
    fn from(programs: Vec<Program>) -> Self {
        Self(programs)
    }
}

impl From<&[Program]> for CircuitBatch {
    fn from(programs: &[Program]) -> Self {
        Self(programs.to_vec())
    }
}

impl<const N: usize> From<[Program; N]> for CircuitBatch {
    fn from(programs: [Program; N]) -> Self {
        Self(programs.into())
    }
}

/// Local state of a job handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    /// Built locally, not accepted by the remote service.
    Created,
    /// Accepted; waiting in the session queue.
    Submitted,
    /// Executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error.
    Failed,
}

impl JobState {
    /// Check if this is a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Created => write!(f, "Created"),
            JobState::Submitted => write!(f, "Submitted"),
            JobState::Running => write!(f, "Running"),
            JobState::Succeeded => write!(f, "Succeeded"),
            JobState::Failed => write!(f, "Failed"),
        }
    }
}

/// Terminal outcome, cached once learned.
#[derive(Debug, Clone)]
enum Outcome {
    Succeeded(ResultEnvelope),
    Failed(String),
}

/// A job owned by the caller: submission, polling, and result rendering.
pub struct JobHandle {
    client: Arc<dyn QaasClient>,
    backend_name: String,
    platform_id: String,
    name: String,
    programs: Vec<Program>,
    config: JobConfig,
    warnings: Vec<OptionWarning>,
    session_id: Option<String>,
    job_id: Option<JobId>,
    state: JobState,
    outcome: Option<Outcome>,
    poll_interval: Duration,
    created_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("name", &self.name)
            .field("backend", &self.backend_name)
            .field("platform_id", &self.platform_id)
            .field("session_id", &self.session_id)
            .field("job_id", &self.job_id)
            .field("circuits", &self.programs.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl JobHandle {
    /// Create a job in `Created` state.
    pub fn new(
        client: Arc<dyn QaasClient>,
        backend_name: impl Into<String>,
        platform_id: impl Into<String>,
        circuits: impl Into<CircuitBatch>,
        config: JobConfig,
        name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            backend_name: backend_name.into(),
            platform_id: platform_id.into(),
            name: name.into(),
            programs: circuits.into().into_programs(),
            config,
            warnings: Vec::new(),
            session_id: None,
            job_id: None,
            state: JobState::Created,
            outcome: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            created_at: Utc::now(),
            submitted_at: None,
            finished_at: None,
        }
    }

    /// Attach merge warnings for the caller to inspect.
    pub fn with_warnings(mut self, warnings: Vec<OptionWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Set the delay between status polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Human-readable job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the backend the job targets.
    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// Platform (backend id) the job targets.
    pub fn platform_id(&self) -> &str {
        &self.platform_id
    }

    /// Session the job was submitted into.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Remote job id, once submitted.
    pub fn job_id(&self) -> Option<&JobId> {
        self.job_id.as_ref()
    }

    /// Circuits in submission order.
    pub fn programs(&self) -> &[Program] {
        &self.programs
    }

    /// Job-level configuration.
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Override keys the backend ignored.
    pub fn warnings(&self) -> &[OptionWarning] {
        &self.warnings
    }

    /// Last known state.
    pub fn state(&self) -> JobState {
        self.state
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time the remote service accepted the job.
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Time the terminal state was observed.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Submit the job into `session_id`.
    ///
    /// A single request, never retried here. On failure the handle stays in
    /// `Created` and the transport error is returned unchanged inside
    /// [`HalError::Submission`].
    #[instrument(skip(self), fields(job = %self.name))]
    pub async fn submit(&mut self, session_id: &str) -> HalResult<JobId> {
        if let Some(id) = &self.job_id {
            return Ok(id.clone());
        }
        if session_id.trim().is_empty() {
            return Err(HalError::Session(
                "job submission requires a session id".into(),
            ));
        }

        let request = CreateJobRequest {
            name: self.name.clone(),
            session_id: session_id.to_string(),
            platform_id: self.platform_id.clone(),
            backend_name: self.backend_name.clone(),
            programs: self.programs.clone(),
            config: self.config.clone(),
        };

        let record = match self.client.create_job(&request).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Submission of {} failed: {}", self.name, e);
                return Err(HalError::Submission(e));
            }
        };
        if record.id.trim().is_empty() {
            return Err(HalError::Submission(ClientError::Decode(
                "job accepted without an id".into(),
            )));
        }

        let job_id = JobId::new(record.id);
        info!(
            "Job {} submitted as {} into session {} ({} circuits)",
            self.name,
            job_id,
            session_id,
            self.programs.len()
        );
        self.job_id = Some(job_id.clone());
        self.session_id = Some(session_id.to_string());
        self.state = JobState::Submitted;
        self.submitted_at = Some(Utc::now());
        Ok(job_id)
    }

    /// Poll the remote service once and return the updated state.
    pub async fn status(&mut self) -> HalResult<JobState> {
        if self.outcome.is_none() {
            self.poll_once().await?;
        }
        Ok(self.state)
    }

    /// Poll until the job reaches a terminal state.
    ///
    /// There is no client-side deadline; wrap the call in
    /// `tokio::time::timeout` to bound the wait.
    #[instrument(skip(self), fields(job = %self.name))]
    pub async fn wait(&mut self) -> HalResult<JobState> {
        while self.outcome.is_none() {
            if !self.poll_once().await? {
                debug!(
                    "Job {} is {}, polling again in {:?}",
                    self.name, self.state, self.poll_interval
                );
                sleep(self.poll_interval).await;
            }
        }
        Ok(self.state)
    }

    /// Wait for the job and render its result as `format`.
    ///
    /// The empty string selects the native encoding. Unknown formats fail
    /// before any remote call. The terminal payload is fetched once; later
    /// calls, in any format, render from the cached copy. A failed job fails
    /// every call with [`HalError::JobFailed`].
    #[instrument(skip(self), fields(job = %self.name))]
    pub async fn result(&mut self, format: &str) -> HalResult<DecodedResult> {
        let format: ResultFormat = format.parse()?;
        self.wait().await?;
        match &self.outcome {
            Some(Outcome::Succeeded(envelope)) => envelope.render(format),
            Some(Outcome::Failed(detail)) => Err(HalError::JobFailed(detail.clone())),
            None => Err(HalError::NotSubmitted(self.name.clone())),
        }
    }

    /// Cached result envelope, if the job succeeded.
    pub fn envelope(&self) -> Option<&ResultEnvelope> {
        match &self.outcome {
            Some(Outcome::Succeeded(envelope)) => Some(envelope),
            _ => None,
        }
    }

    /// One status poll. Returns `true` once the outcome is known.
    async fn poll_once(&mut self) -> HalResult<bool> {
        let job_id = self
            .job_id
            .clone()
            .ok_or_else(|| HalError::NotSubmitted(self.name.clone()))?;
        let record = self.client.get_job(&job_id.0).await?;

        match record.remote_status() {
            RemoteJobStatus::Waiting => Ok(false),
            RemoteJobStatus::Running => {
                self.state = JobState::Running;
                Ok(false)
            }
            RemoteJobStatus::Completed => {
                let envelope = fetch_envelope(self.client.as_ref(), &job_id.0).await?;
                if envelope.success {
                    self.finish(Outcome::Succeeded(envelope));
                } else {
                    let detail = envelope
                        .error
                        .clone()
                        .or(record.progress_message)
                        .unwrap_or_else(|| "Job failed".into());
                    self.finish(Outcome::Failed(detail));
                }
                Ok(true)
            }
            RemoteJobStatus::Error => {
                let detail = record
                    .progress_message
                    .unwrap_or_else(|| "Job failed".into());
                self.finish(Outcome::Failed(detail));
                Ok(true)
            }
            RemoteJobStatus::Cancelled => {
                let detail = record.progress_message.map_or_else(
                    || "Job cancelled".to_string(),
                    |m| format!("Job cancelled: {m}"),
                );
                self.finish(Outcome::Failed(detail));
                Ok(true)
            }
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        self.state = match &outcome {
            Outcome::Succeeded(_) => JobState::Succeeded,
            Outcome::Failed(detail) => {
                warn!("Job {} failed: {}", self.name, detail);
                JobState::Failed
            }
        };
        self.finished_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }
}
