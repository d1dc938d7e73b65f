//! In-process execution service.
//!
//! [`InMemoryService`] implements [`QaasClient`] without a network: sessions
//! are deduplicated atomically under one lock, jobs finish with a scripted
//! outcome after a configurable number of non-terminal polls, and every
//! collaborator call is counted. Useful for tests and offline development.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::client::{
    ClientError, ClientResult, CreateJobRequest, CreateSessionRequest, JobRecord,
    JobResultRecord, PlatformFilter, PlatformRecord, QaasClient, SessionRecord,
};
use crate::result::{Counts, ResultEnvelope};

const DEFAULT_PLATFORM: &str = "platform-1";
const DEFAULT_SHOTS: u64 = 1000;

/// How jobs submitted to an [`InMemoryService`] finish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Succeed with shots split evenly between all-zeros and all-ones.
    Generated,
    /// Succeed with these counts, one entry per circuit.
    Counts(Vec<Counts>),
    /// Fail with this detail.
    Fail(String),
}

/// Snapshot of per-operation call counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `create_session` calls.
    pub create_session: usize,
    /// `get_session` calls.
    pub get_session: usize,
    /// `terminate_session` calls.
    pub terminate_session: usize,
    /// `create_job` calls.
    pub create_job: usize,
    /// `get_job` calls.
    pub get_job: usize,
    /// `list_job_results` calls.
    pub list_job_results: usize,
    /// `download_result` calls.
    pub download_result: usize,
    /// `list_platforms` calls.
    pub list_platforms: usize,
}

impl CallCounts {
    /// Total remote calls.
    pub fn total(&self) -> usize {
        self.create_session
            + self.get_session
            + self.terminate_session
            + self.create_job
            + self.get_job
            + self.list_job_results
            + self.download_result
            + self.list_platforms
    }
}

#[derive(Debug, Default)]
struct Counters {
    create_session: AtomicUsize,
    get_session: AtomicUsize,
    terminate_session: AtomicUsize,
    create_job: AtomicUsize,
    get_job: AtomicUsize,
    list_job_results: AtomicUsize,
    download_result: AtomicUsize,
    list_platforms: AtomicUsize,
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

#[derive(Debug)]
struct StoredJob {
    record: JobRecord,
    request: CreateJobRequest,
    polls_left: usize,
}

#[derive(Debug, Default)]
struct State {
    sessions: FxHashMap<String, SessionRecord>,
    jobs: FxHashMap<String, StoredJob>,
    downloads: FxHashMap<String, String>,
    submission_failures: VecDeque<ClientError>,
}

fn is_live(record: &SessionRecord) -> bool {
    matches!(record.status.as_str(), "starting" | "running")
}

/// In-process [`QaasClient`].
#[derive(Debug)]
pub struct InMemoryService {
    state: Mutex<State>,
    counters: Counters,
    outcome: ScriptedOutcome,
    pending_polls: usize,
    results_by_url: bool,
    platforms: Vec<PlatformRecord>,
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryService {
    /// Service whose jobs succeed on the first poll with generated counts.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            counters: Counters::default(),
            outcome: ScriptedOutcome::Generated,
            pending_polls: 0,
            results_by_url: false,
            platforms: Vec::new(),
        }
    }

    /// Outcome of every job.
    pub fn with_outcome(mut self, outcome: ScriptedOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Number of polls that report `running` before a job finishes.
    pub fn with_pending_polls(mut self, polls: usize) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Publish results by download URL instead of inline.
    pub fn with_results_by_url(mut self, by_url: bool) -> Self {
        self.results_by_url = by_url;
        self
    }

    /// Platforms returned by `list_platforms`.
    pub fn with_platforms(mut self, platforms: Vec<PlatformRecord>) -> Self {
        self.platforms = platforms;
        self
    }

    /// Call counters so far.
    pub fn calls(&self) -> CallCounts {
        let c = &self.counters;
        CallCounts {
            create_session: c.create_session.load(Ordering::SeqCst),
            get_session: c.get_session.load(Ordering::SeqCst),
            terminate_session: c.terminate_session.load(Ordering::SeqCst),
            create_job: c.create_job.load(Ordering::SeqCst),
            get_job: c.get_job.load(Ordering::SeqCst),
            list_job_results: c.list_job_results.load(Ordering::SeqCst),
            download_result: c.download_result.load(Ordering::SeqCst),
            list_platforms: c.list_platforms.load(Ordering::SeqCst),
        }
    }

    /// Create a running session directly, bypassing the call counters.
    pub async fn open_session(&self, name: &str) -> String {
        let record = new_session(DEFAULT_PLATFORM, name, None, None, None);
        let id = record.id.clone();
        self.state.lock().await.sessions.insert(id.clone(), record);
        id
    }

    /// Expire a session as if its duration had elapsed.
    pub async fn expire_session(&self, session_id: &str) {
        if let Some(record) = self.state.lock().await.sessions.get_mut(session_id) {
            record.status = "expired".into();
            record.terminated_at = Some(Utc::now());
        }
    }

    /// Number of sessions accepting jobs.
    pub async fn live_session_count(&self) -> usize {
        self.state
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| is_live(s))
            .count()
    }

    /// Fail the next `create_job` call with `error`.
    pub async fn fail_next_submission(&self, error: ClientError) {
        self.state.lock().await.submission_failures.push_back(error);
    }

    /// Every accepted job request, in no particular order.
    pub async fn submitted_jobs(&self) -> Vec<CreateJobRequest> {
        self.state
            .lock()
            .await
            .jobs
            .values()
            .map(|job| job.request.clone())
            .collect()
    }

    fn envelope_for(&self, job_id: &str, request: &CreateJobRequest) -> ResultEnvelope {
        match &self.outcome {
            ScriptedOutcome::Counts(counts) => ResultEnvelope::from_counts(job_id, counts),
            ScriptedOutcome::Fail(detail) => ResultEnvelope::failure(job_id, detail.clone()),
            ScriptedOutcome::Generated => {
                let shots = request
                    .config
                    .shots()
                    .and_then(|s| u64::try_from(s).ok())
                    .unwrap_or(DEFAULT_SHOTS);
                let counts: Vec<Counts> = request
                    .programs
                    .iter()
                    .map(|_| [("00", shots - shots / 2), ("11", shots / 2)].into_iter().collect())
                    .collect();
                ResultEnvelope::from_counts(job_id, &counts)
            }
        }
    }
}

fn new_session(
    platform_id: &str,
    name: &str,
    deduplication_id: Option<String>,
    max_duration: Option<String>,
    max_idle_duration: Option<String>,
) -> SessionRecord {
    SessionRecord {
        id: Uuid::new_v4().to_string(),
        name: Some(name.to_string()),
        platform_id: Some(platform_id.to_string()),
        deduplication_id,
        status: "running".into(),
        created_at: Some(Utc::now()),
        terminated_at: None,
        max_duration,
        max_idle_duration,
        progress_message: None,
    }
}

#[async_trait]
impl QaasClient for InMemoryService {
    async fn create_session(&self, request: &CreateSessionRequest) -> ClientResult<SessionRecord> {
        bump(&self.counters.create_session);
        let mut state = self.state.lock().await;

        if let Some(key) = &request.deduplication_id {
            let existing = state.sessions.values().find(|s| {
                is_live(s)
                    && s.deduplication_id.as_ref() == Some(key)
                    && s.platform_id.as_deref() == Some(request.platform_id.as_str())
            });
            if let Some(existing) = existing {
                debug!("Reusing session {} for key {}", existing.id, key);
                return Ok(existing.clone());
            }
        }

        let record = new_session(
            &request.platform_id,
            &request.name,
            request.deduplication_id.clone(),
            request.max_duration.clone(),
            request.max_idle_duration.clone(),
        );
        state.sessions.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn get_session(&self, session_id: &str) -> ClientResult<SessionRecord> {
        bump(&self.counters.get_session);
        self.state
            .lock()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("session {session_id}")))
    }

    async fn terminate_session(&self, session_id: &str) -> ClientResult<SessionRecord> {
        bump(&self.counters.terminate_session);
        let mut state = self.state.lock().await;
        let record = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| ClientError::NotFound(format!("session {session_id}")))?;
        if !is_live(record) {
            return Err(ClientError::Conflict(format!(
                "session {session_id} is {}",
                record.status
            )));
        }
        record.status = "stopped".into();
        record.terminated_at = Some(Utc::now());
        Ok(record.clone())
    }

    async fn create_job(&self, request: &CreateJobRequest) -> ClientResult<JobRecord> {
        bump(&self.counters.create_job);
        let mut state = self.state.lock().await;
        if let Some(error) = state.submission_failures.pop_front() {
            return Err(error);
        }

        let session = state
            .sessions
            .get(&request.session_id)
            .ok_or_else(|| ClientError::NotFound(format!("session {}", request.session_id)))?;
        if !is_live(session) {
            return Err(ClientError::Conflict(format!(
                "session {} is {}",
                session.id, session.status
            )));
        }

        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4().to_string(),
            name: Some(request.name.clone()),
            session_id: Some(request.session_id.clone()),
            status: "waiting".into(),
            progress_message: None,
            job_duration: None,
            created_at: Some(now),
            started_at: None,
            updated_at: Some(now),
        };
        state.jobs.insert(
            record.id.clone(),
            StoredJob {
                record: record.clone(),
                request: request.clone(),
                polls_left: self.pending_polls,
            },
        );
        Ok(record)
    }

    async fn get_job(&self, job_id: &str) -> ClientResult<JobRecord> {
        bump(&self.counters.get_job);
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ClientError::NotFound(format!("job {job_id}")))?;

        let now = Utc::now();
        if job.polls_left > 0 {
            job.polls_left -= 1;
            job.record.status = "running".into();
            job.record.started_at.get_or_insert(now);
        } else {
            match &self.outcome {
                ScriptedOutcome::Fail(detail) => {
                    job.record.status = "error".into();
                    job.record.progress_message = Some(detail.clone());
                }
                _ => job.record.status = "completed".into(),
            }
        }
        job.record.updated_at = Some(now);
        Ok(job.record.clone())
    }

    async fn list_job_results(&self, job_id: &str) -> ClientResult<Vec<JobResultRecord>> {
        bump(&self.counters.list_job_results);
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get(job_id)
            .ok_or_else(|| ClientError::NotFound(format!("job {job_id}")))?;
        if job.record.status != "completed" && job.record.status != "error" {
            return Ok(Vec::new());
        }

        let envelope = self.envelope_for(job_id, &job.request);
        let payload =
            serde_json::to_string(&envelope).map_err(|e| ClientError::Decode(e.to_string()))?;

        if self.results_by_url {
            let url = format!("memory://results/{job_id}");
            state.downloads.insert(url.clone(), payload);
            return Ok(vec![JobResultRecord {
                job_id: Some(job_id.to_string()),
                result: None,
                url: Some(url),
                created_at: Some(Utc::now()),
            }]);
        }
        Ok(vec![JobResultRecord {
            job_id: Some(job_id.to_string()),
            result: Some(serde_json::Value::String(payload)),
            url: None,
            created_at: Some(Utc::now()),
        }])
    }

    async fn download_result(&self, url: &str) -> ClientResult<String> {
        bump(&self.counters.download_result);
        self.state
            .lock()
            .await
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(url.to_string()))
    }

    async fn list_platforms(&self, filter: &PlatformFilter) -> ClientResult<Vec<PlatformRecord>> {
        bump(&self.counters.list_platforms);
        Ok(self
            .platforms
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_request(key: Option<&str>) -> CreateSessionRequest {
        CreateSessionRequest {
            platform_id: DEFAULT_PLATFORM.into(),
            name: "auto-s".into(),
            deduplication_id: key.map(String::from),
            max_duration: Some("1200s".into()),
            max_idle_duration: None,
        }
    }

    #[tokio::test]
    async fn test_dedup_skips_dead_sessions() {
        let service = InMemoryService::new();
        let first = service.create_session(&session_request(Some("k"))).await.unwrap();
        service.expire_session(&first.id).await;
        let second = service.create_session(&session_request(Some("k"))).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(service.live_session_count().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_without_key_are_never_shared() {
        let service = InMemoryService::new();
        let a = service.create_session(&session_request(None)).await.unwrap();
        let b = service.create_session(&session_request(None)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(service.calls().create_session, 2);
    }

    #[tokio::test]
    async fn test_jobs_require_live_session() {
        let service = InMemoryService::new();
        let session = service.open_session("s").await;
        service.expire_session(&session).await;
        let request = CreateJobRequest {
            name: "qj-test-a".into(),
            session_id: session,
            platform_id: DEFAULT_PLATFORM.into(),
            backend_name: "memory_simulation".into(),
            programs: Vec::new(),
            config: Default::default(),
        };
        assert!(matches!(
            service.create_job(&request).await,
            Err(ClientError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_results_by_url() {
        let service = InMemoryService::new().with_results_by_url(true);
        let session = service.open_session("s").await;
        let request = CreateJobRequest {
            name: "qj-test-b".into(),
            session_id: session,
            platform_id: DEFAULT_PLATFORM.into(),
            backend_name: "memory_simulation".into(),
            programs: vec![crate::job::Program::qasm2("x")],
            config: Default::default(),
        };
        let job = service.create_job(&request).await.unwrap();
        service.get_job(&job.id).await.unwrap();
        let entries = service.list_job_results(&job.id).await.unwrap();
        let url = entries[0].url.clone().unwrap();
        let body = service.download_result(&url).await.unwrap();
        let envelope = ResultEnvelope::from_json_str(&body).unwrap();
        assert_eq!(envelope.results.len(), 1);
        assert_eq!(envelope.results[0].shots, Some(DEFAULT_SHOTS));
    }
}
