//! Session lifecycle.
//!
//! Sessions are owned by the remote service: it creates them, deduplicates
//! them by key, and expires them after `max_idle_duration` without activity or
//! after `max_duration` regardless of activity. The core only keeps an id and
//! observes the state the service reports; it never runs expiry timers of its
//! own.
//!
//! ```text
//!   resolve(Auto) ────→ create_session(dedup key) ──→ id (new or reused)
//!   resolve(Explicit) ─→ get_session(id) ──→ id if Active, else SessionError
//!   stop(id) ─────────→ terminate_session(id)   (no-op if already gone)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, CreateSessionRequest, QaasClient, SessionRecord};
use crate::error::{HalError, HalResult};
use crate::options::{OptionValue, SESSION_ID};

/// How a run picks its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Create a session, or reuse the live one holding the dedup key.
    Auto,
    /// Use this exact session; the caller asserts it is live.
    Explicit(String),
}

impl SessionPolicy {
    /// Interpret a `session_id` option value.
    ///
    /// `null`, `false`, the empty string and `"auto"` (any case) all mean
    /// automatic resolution; any other string is an explicit session id.
    pub fn parse(value: &OptionValue) -> HalResult<Self> {
        match value {
            OptionValue::Null | OptionValue::Bool(false) => Ok(SessionPolicy::Auto),
            OptionValue::Str(s) if is_auto(s) => Ok(SessionPolicy::Auto),
            OptionValue::Str(s) => Ok(SessionPolicy::Explicit(s.clone())),
            other => Err(HalError::validation(
                SESSION_ID,
                other,
                "a session id string or \"auto\"",
            )),
        }
    }
}

fn is_auto(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("auto")
}

/// Session-control values popped out of a merged configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Reuse policy.
    pub policy: SessionPolicy,
    /// Base display name.
    pub name: String,
    /// Deduplication key.
    pub deduplication_id: Option<String>,
    /// Maximum session lifetime.
    pub max_duration: Option<Duration>,
    /// Maximum idle time.
    pub max_idle_duration: Option<Duration>,
}

/// Parameters for creating a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    /// Display name.
    pub name: String,
    /// Deduplication key.
    pub deduplication_id: Option<String>,
    /// Maximum session lifetime.
    pub max_duration: Option<Duration>,
    /// Maximum idle time.
    pub max_idle_duration: Option<Duration>,
}

impl SessionSpec {
    /// Spec with just a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deduplication_id: None,
            max_duration: None,
            max_idle_duration: None,
        }
    }

    /// Set the deduplication key.
    pub fn with_deduplication_id(mut self, id: impl Into<String>) -> Self {
        self.deduplication_id = Some(id.into());
        self
    }

    /// Set the maximum lifetime.
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    /// Set the idle timeout.
    pub fn with_max_idle_duration(mut self, duration: Duration) -> Self {
        self.max_idle_duration = Some(duration);
        self
    }

    fn to_request(&self, platform_id: &str) -> CreateSessionRequest {
        CreateSessionRequest {
            platform_id: platform_id.to_string(),
            name: self.name.clone(),
            deduplication_id: self.deduplication_id.clone(),
            max_duration: self.max_duration.map(format_duration),
            max_idle_duration: self.max_idle_duration.map(format_duration),
        }
    }
}

/// Liveness of a session as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Starting or running; accepts jobs.
    Active,
    /// Passed its idle or total duration.
    Expired,
    /// Stopped on request.
    Stopped,
}

impl SessionState {
    /// Map a remote status string.
    pub fn from_status(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "starting" | "running" => SessionState::Active,
            "stopping" | "stopped" => SessionState::Stopped,
            _ => SessionState::Expired,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::Expired => write!(f, "expired"),
            SessionState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Local view of a remote session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session ID.
    pub id: String,
    /// Display name.
    pub name: Option<String>,
    /// Platform the session runs on.
    pub platform_id: Option<String>,
    /// Deduplication key.
    pub deduplication_id: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Maximum lifetime.
    pub max_duration: Option<Duration>,
    /// Maximum idle time.
    pub max_idle_duration: Option<Duration>,
    /// Observed state.
    pub state: SessionState,
}

impl Session {
    /// Build from a remote record. A record without an id is rejected.
    pub fn from_record(record: SessionRecord) -> HalResult<Self> {
        if record.id.trim().is_empty() {
            return Err(HalError::Session(
                "remote service returned a session without an id".into(),
            ));
        }
        Ok(Self {
            state: SessionState::from_status(&record.status),
            max_duration: record.max_duration.as_deref().and_then(wire_duration),
            max_idle_duration: record.max_idle_duration.as_deref().and_then(wire_duration),
            id: record.id,
            name: record.name,
            platform_id: record.platform_id,
            deduplication_id: record.deduplication_id,
            created_at: record.created_at,
        })
    }

    /// Whether the session accepts jobs.
    pub fn is_live(&self) -> bool {
        self.state == SessionState::Active
    }
}

/// Creates, reuses and stops sessions through a [`QaasClient`].
///
/// Holds no per-session state: the remote service is the sole arbiter of
/// session uniqueness, across threads and across processes.
#[derive(Clone)]
pub struct SessionManager {
    client: Arc<dyn QaasClient>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager").finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a session manager.
    pub fn new(client: Arc<dyn QaasClient>) -> Self {
        Self { client }
    }

    /// Resolve the session a job should run in.
    ///
    /// Never returns an empty id: missing or dead sessions surface as
    /// [`HalError::Session`].
    #[instrument(skip(self, request), fields(policy = ?request.policy))]
    pub async fn resolve(&self, request: &SessionRequest, platform_id: &str) -> HalResult<String> {
        match &request.policy {
            SessionPolicy::Auto => {
                let spec = SessionSpec {
                    name: format!("auto-{}", request.name),
                    deduplication_id: request.deduplication_id.clone(),
                    max_duration: request.max_duration,
                    max_idle_duration: request.max_idle_duration,
                };
                let session = self.start(platform_id, &spec).await?;
                if !session.is_live() {
                    return Err(HalError::Session(format!(
                        "session {} returned for '{}' is {}",
                        session.id, spec.name, session.state
                    )));
                }
                Ok(session.id)
            }
            SessionPolicy::Explicit(id) => {
                let session = self.get(id).await?;
                if !session.is_live() {
                    return Err(HalError::Session(format!(
                        "session {id} is {} and cannot accept jobs",
                        session.state
                    )));
                }
                debug!("Reusing explicit session {}", id);
                Ok(session.id)
            }
        }
    }

    /// Create a session (or receive the live one sharing the dedup key).
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn start(&self, platform_id: &str, spec: &SessionSpec) -> HalResult<Session> {
        let record = self
            .client
            .create_session(&spec.to_request(platform_id))
            .await
            .map_err(|e| HalError::Session(format!("could not create session: {e}")))?;
        let session = Session::from_record(record)?;
        info!(
            "Session {} ({}) on platform {}",
            session.id, session.state, platform_id
        );
        Ok(session)
    }

    /// Look up a session.
    #[instrument(skip(self))]
    pub async fn get(&self, session_id: &str) -> HalResult<Session> {
        if session_id.trim().is_empty() {
            return Err(HalError::Session("empty session id".into()));
        }
        let record = self
            .client
            .get_session(session_id)
            .await
            .map_err(|e| match e {
                ClientError::NotFound(_) => {
                    HalError::Session(format!("session {session_id} does not exist"))
                }
                other => HalError::Session(format!("could not look up session {session_id}: {other}")),
            })?;
        Session::from_record(record)
    }

    /// Request termination. Stopping a session that is already stopped,
    /// expired or gone succeeds without doing anything.
    #[instrument(skip(self))]
    pub async fn stop(&self, session_id: &str) -> HalResult<()> {
        match self.client.terminate_session(session_id).await {
            Ok(record) => {
                info!("Session {} terminated (status: {})", session_id, record.status);
                Ok(())
            }
            Err(ClientError::NotFound(_) | ClientError::Conflict(_)) => {
                debug!("Session {} already gone", session_id);
                Ok(())
            }
            Err(e) => match self.client.get_session(session_id).await {
                Ok(record) if SessionState::from_status(&record.status) != SessionState::Active => {
                    debug!("Session {} already {}", session_id, record.status);
                    Ok(())
                }
                _ => {
                    warn!("Failed to stop session {}: {}", session_id, e);
                    Err(HalError::Session(format!(
                        "could not stop session {session_id}: {e}"
                    )))
                }
            },
        }
    }
}

/// Parse a duration such as `"30s"`, `"20m"`, `"2h"`, `"1d"`, `"1h30m"`, or
/// bare seconds.
pub fn parse_duration(input: &str) -> HalResult<Duration> {
    let invalid = || HalError::Configuration(format!("invalid duration '{input}'"));
    let s = input.trim();
    if s.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let unit: u64 = match c {
            's' => 1,
            'm' => 60,
            'h' => 3_600,
            'd' => 86_400,
            _ => return Err(invalid()),
        };
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        total = n
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
    }
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}

/// Wire form of a duration: whole seconds with an `s` suffix.
pub fn format_duration(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

/// Lenient parse for durations reported by the service ("2.5s", "1200s").
fn wire_duration(s: &str) -> Option<Duration> {
    if let Some(secs) = s.strip_suffix('s').and_then(|n| n.parse::<f64>().ok()) {
        if secs.is_finite() && secs >= 0.0 {
            return Some(Duration::from_secs_f64(secs));
        }
    }
    parse_duration(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryService;

    fn auto_request(dedup: &str) -> SessionRequest {
        SessionRequest {
            policy: SessionPolicy::Auto,
            name: "qsim-session".into(),
            deduplication_id: Some(dedup.into()),
            max_duration: Some(Duration::from_secs(1200)),
            max_idle_duration: Some(Duration::from_secs(600)),
        }
    }

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("20m").unwrap(), Duration::from_secs(1200));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1h30").is_err());
    }

    #[test]
    fn test_format_and_wire_duration() {
        assert_eq!(format_duration(Duration::from_secs(1200)), "1200s");
        assert_eq!(wire_duration("2.5s"), Some(Duration::from_millis(2500)));
        assert_eq!(wire_duration("20m"), Some(Duration::from_secs(1200)));
        assert_eq!(wire_duration("never"), None);
    }

    #[test]
    fn test_session_state_mapping() {
        assert_eq!(SessionState::from_status("starting"), SessionState::Active);
        assert_eq!(SessionState::from_status("Running"), SessionState::Active);
        assert_eq!(SessionState::from_status("stopping"), SessionState::Stopped);
        assert_eq!(SessionState::from_status("expired"), SessionState::Expired);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            SessionPolicy::parse(&OptionValue::from("auto")).unwrap(),
            SessionPolicy::Auto
        );
        assert_eq!(
            SessionPolicy::parse(&OptionValue::from("s-1")).unwrap(),
            SessionPolicy::Explicit("s-1".into())
        );
        assert_eq!(
            SessionPolicy::parse(&OptionValue::from("AUTO")).unwrap(),
            SessionPolicy::Auto
        );
        assert_eq!(
            SessionPolicy::parse(&OptionValue::Bool(false)).unwrap(),
            SessionPolicy::Auto
        );
        assert_eq!(
            SessionPolicy::parse(&OptionValue::Null).unwrap(),
            SessionPolicy::Auto
        );
        assert!(SessionPolicy::parse(&OptionValue::Bool(true)).is_err());
        assert!(SessionPolicy::parse(&OptionValue::Int(3)).is_err());
    }

    #[test]
    fn test_session_from_record_requires_id() {
        let record = SessionRecord {
            id: String::new(),
            name: None,
            platform_id: None,
            deduplication_id: None,
            status: "running".into(),
            created_at: None,
            terminated_at: None,
            max_duration: None,
            max_idle_duration: None,
            progress_message: None,
        };
        assert!(matches!(
            Session::from_record(record),
            Err(HalError::Session(_))
        ));
    }

    #[tokio::test]
    async fn test_auto_resolution_reuses_dedup_key() {
        let service = Arc::new(InMemoryService::new());
        let manager = SessionManager::new(service.clone());

        let first = manager.resolve(&auto_request("k1"), "p1").await.unwrap();
        let second = manager.resolve(&auto_request("k1"), "p1").await.unwrap();
        let other = manager.resolve(&auto_request("k2"), "p1").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(service.live_session_count().await, 2);

        let session = manager.get(&first).await.unwrap();
        assert_eq!(session.name.as_deref(), Some("auto-qsim-session"));
        assert_eq!(session.max_idle_duration, Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_explicit_resolution_requires_live_session() {
        let service = Arc::new(InMemoryService::new());
        let manager = SessionManager::new(service.clone());

        let session = manager
            .start("p1", &SessionSpec::new("workshop"))
            .await
            .unwrap();
        let explicit = SessionRequest {
            policy: SessionPolicy::Explicit(session.id.clone()),
            ..auto_request("unused")
        };
        assert_eq!(manager.resolve(&explicit, "p1").await.unwrap(), session.id);

        service.expire_session(&session.id).await;
        let err = manager.resolve(&explicit, "p1").await.unwrap_err();
        assert!(matches!(err, HalError::Session(msg) if msg.contains("expired")));

        let missing = SessionRequest {
            policy: SessionPolicy::Explicit("nope".into()),
            ..auto_request("unused")
        };
        assert!(matches!(
            manager.resolve(&missing, "p1").await,
            Err(HalError::Session(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let service = Arc::new(InMemoryService::new());
        let manager = SessionManager::new(service.clone());

        let session = manager
            .start("p1", &SessionSpec::new("s"))
            .await
            .unwrap();
        manager.stop(&session.id).await.unwrap();
        manager.stop(&session.id).await.unwrap();
        manager.stop("never-existed").await.unwrap();

        let other = manager
            .start("p1", &SessionSpec::new("t"))
            .await
            .unwrap();
        service.expire_session(&other.id).await;
        manager.stop(&other.id).await.unwrap();

        assert_eq!(
            manager.get(&session.id).await.unwrap().state,
            SessionState::Stopped
        );
    }
}
