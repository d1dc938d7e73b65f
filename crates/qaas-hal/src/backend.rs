//! Backend adapter: one remote platform exposed as a runnable backend.
//!
//! A [`QaasBackend`] joins a platform description ([`BackendInfo`]), a
//! [`BackendVariant`] (option table, batch limit, optional target) and the
//! shared [`QaasClient`]. Variants differ only in data; the run pipeline is
//! the same for all of them:
//!
//! ```text
//! run(circuits, overrides)
//!   → CircuitBatch::ensure_within(max_circuits)
//!   → config::merge(options, overrides)
//!   → SessionManager::resolve(session request)
//!   → JobHandle::submit(session id)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::capability::{Capabilities, Target};
use crate::client::{PlatformRecord, QaasClient};
use crate::config::{OptionWarning, merge};
use crate::error::{HalError, HalResult};
use crate::job::{CircuitBatch, DEFAULT_POLL_INTERVAL, JobHandle};
use crate::naming::{NameGenerator, RandomNameGenerator};
use crate::options::{OptionSet, Overrides, Validator};
use crate::session::{Session, SessionManager, SessionSpec};

/// Per-variant data of a backend.
pub trait BackendVariant: Send + Sync + fmt::Debug {
    /// Short kind used in generated job names (`"aer"`, `"qsim"`).
    fn kind(&self) -> &'static str;

    /// Type name used in the display form (`"AerBackend"`).
    fn type_name(&self) -> &'static str;

    /// Option defaults and validators, including the session-control keys.
    fn default_options(&self) -> OptionSet;

    /// Maximum circuits per job.
    fn max_circuits(&self) -> usize;

    /// Compiler-facing description for a platform with `num_qubits` qubits.
    fn target(&self, _num_qubits: u32) -> Option<Target> {
        None
    }
}

/// Static description of a remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Platform ID.
    pub id: String,
    /// Platform name.
    pub name: String,
    /// Availability as reported by the service.
    pub availability: String,
    /// Platform version.
    pub version: String,
    /// Number of qubits.
    pub num_qubits: u32,
    /// Free-form metadata.
    pub metadata: Option<String>,
}

impl From<PlatformRecord> for BackendInfo {
    fn from(record: PlatformRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            availability: record.availability,
            version: record.version,
            num_qubits: record.max_qubit_count,
            metadata: record.metadata,
        }
    }
}

/// A runnable remote backend.
pub struct QaasBackend {
    info: BackendInfo,
    variant: Arc<dyn BackendVariant>,
    client: Arc<dyn QaasClient>,
    options: OptionSet,
    sessions: SessionManager,
    names: Arc<dyn NameGenerator>,
    poll_interval: Duration,
}

impl QaasBackend {
    /// Create a backend for `info`, with the variant's option defaults.
    pub fn new(
        info: BackendInfo,
        variant: Arc<dyn BackendVariant>,
        client: Arc<dyn QaasClient>,
    ) -> Self {
        Self {
            options: variant.default_options(),
            sessions: SessionManager::new(client.clone()),
            info,
            variant,
            client,
            names: Arc::new(RandomNameGenerator::new()),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Replace the job name generator.
    pub fn with_name_generator(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    /// Delay between status polls of the jobs this backend creates.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Platform ID.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Platform name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Platform description.
    pub fn info(&self) -> &BackendInfo {
        &self.info
    }

    /// Number of qubits.
    pub fn num_qubits(&self) -> u32 {
        self.info.num_qubits
    }

    /// Maximum circuits per job.
    pub fn max_circuits(&self) -> usize {
        self.variant.max_circuits()
    }

    /// Current option defaults.
    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    /// Compiler-facing description, if the variant has one.
    pub fn target(&self) -> Option<Target> {
        self.variant.target(self.info.num_qubits)
    }

    /// Session manager bound to this backend's client.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Capability summary.
    pub fn capabilities(&self) -> Capabilities {
        let max_shots = self
            .options
            .entry("shots")
            .and_then(|entry| match &entry.validator {
                Some(Validator::Range { max, .. }) if max.is_finite() && *max >= 0.0 => {
                    Some(*max as u64)
                }
                Some(Validator::IntRange { max, .. }) => u64::try_from(*max).ok(),
                _ => None,
            });
        Capabilities {
            name: self.info.name.clone(),
            num_qubits: self.info.num_qubits,
            max_circuits: self.max_circuits(),
            max_shots,
            is_simulator: true,
            target: self.target(),
        }
    }

    /// Change option defaults for later runs.
    ///
    /// Values are validated the same way per-call overrides are; unknown
    /// keys are ignored and returned as warnings.
    pub fn set_options(&mut self, overrides: &Overrides) -> HalResult<Vec<OptionWarning>> {
        let merged = merge(&self.options, overrides)?;
        let mut options = self.options.clone();
        for (key, value) in overrides.iter() {
            if options.contains(key) {
                options = options.with(key, value.clone());
            }
        }
        self.options = options;
        Ok(merged.warnings)
    }

    /// Submit `circuits` with per-call `overrides`.
    ///
    /// Capacity and option validation happen before any remote call. The
    /// returned handle is already `Submitted`.
    #[instrument(skip(self, circuits, overrides), fields(backend = %self.info.name))]
    pub async fn run(
        &self,
        circuits: impl Into<CircuitBatch>,
        overrides: &Overrides,
    ) -> HalResult<JobHandle> {
        let batch = circuits.into();
        batch.ensure_within(self.max_circuits())?;

        let merged = merge(&self.options, overrides)?;
        let session_id = self.sessions.resolve(&merged.session, &self.info.id).await?;

        let name = self.names.job_name(self.variant.kind());
        let mut job = JobHandle::new(
            self.client.clone(),
            self.info.name.clone(),
            self.info.id.clone(),
            batch,
            merged.job_config,
            name,
        )
        .with_warnings(merged.warnings)
        .with_poll_interval(self.poll_interval);

        job.submit(&session_id).await?;
        Ok(job)
    }

    /// Session parameters this backend uses by default.
    pub fn session_spec(&self) -> HalResult<SessionSpec> {
        let request = merge(&self.options, &Overrides::new())?.session;
        if request.name.is_empty() {
            return Err(HalError::Configuration(format!(
                "backend {} has no default session name",
                self.info.name
            )));
        }
        Ok(SessionSpec {
            name: request.name,
            deduplication_id: request.deduplication_id,
            max_duration: request.max_duration,
            max_idle_duration: request.max_idle_duration,
        })
    }

    /// Start (or reuse, by deduplication key) a session on this backend.
    #[instrument(skip(self, spec), fields(backend = %self.info.name))]
    pub async fn start_session(&self, spec: &SessionSpec) -> HalResult<Session> {
        let session = self.sessions.start(&self.info.id, spec).await?;
        info!("Session {} ready on {}", session.id, self.info.name);
        Ok(session)
    }

    /// Stop a session. Already stopped or expired sessions are a no-op.
    pub async fn stop_session(&self, session_id: &str) -> HalResult<()> {
        self.sessions.stop(session_id).await
    }
}

impl fmt::Debug for QaasBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QaasBackend")
            .field("info", &self.info)
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for QaasBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}(name={},num_qubits={},platform_id={})>",
            self.variant.type_name(),
            self.info.name,
            self.info.num_qubits,
            self.info.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryService;
    use crate::options::OptionValue;

    #[derive(Debug)]
    struct TestVariant;

    impl BackendVariant for TestVariant {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn type_name(&self) -> &'static str {
            "TestBackend"
        }

        fn default_options(&self) -> OptionSet {
            OptionSet::new()
                .with_session_defaults("test-session-from-rust")
                .with("shots", 1000)
                .with("memory", false)
                .with_validator("shots", Validator::int_range(1, 1_000_000))
        }

        fn max_circuits(&self) -> usize {
            2
        }
    }

    fn info() -> BackendInfo {
        BackendInfo {
            id: "p-1".into(),
            name: "test_simulation_local".into(),
            availability: "available".into(),
            version: "1.0".into(),
            num_qubits: 12,
            metadata: None,
        }
    }

    fn backend(service: &Arc<InMemoryService>) -> QaasBackend {
        QaasBackend::new(info(), Arc::new(TestVariant), service.clone())
            .with_name_generator(Arc::new(RandomNameGenerator::seeded(3)))
            .with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_display_form() {
        let service = Arc::new(InMemoryService::new());
        assert_eq!(
            backend(&service).to_string(),
            "<TestBackend(name=test_simulation_local,num_qubits=12,platform_id=p-1)>"
        );
    }

    #[test]
    fn test_capabilities() {
        let service = Arc::new(InMemoryService::new());
        let caps = backend(&service).capabilities();
        assert_eq!(caps.max_circuits, 2);
        assert_eq!(caps.max_shots, Some(1_000_000));
        assert!(caps.target.is_none());
    }

    #[test]
    fn test_session_spec_defaults() {
        let service = Arc::new(InMemoryService::new());
        let spec = backend(&service).session_spec().unwrap();
        assert_eq!(spec.name, "test-session-from-rust");
        assert_eq!(spec.deduplication_id.as_deref(), Some("test-session-from-rust"));
        assert_eq!(spec.max_duration, Some(Duration::from_secs(1200)));
    }

    #[test]
    fn test_set_options_validates() {
        let service = Arc::new(InMemoryService::new());
        let mut backend = backend(&service);
        let warnings = backend
            .set_options(&Overrides::new().shots(10).set("unknown", 1))
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            backend.options().default_value("shots"),
            Some(&OptionValue::Int(10))
        );
        assert!(backend.set_options(&Overrides::new().shots(0)).is_err());
        assert!(!backend.options().contains("unknown"));
    }

    #[tokio::test]
    async fn test_run_names_job_after_variant() {
        let service = Arc::new(InMemoryService::new());
        let job = backend(&service)
            .run(crate::job::Program::qasm2("x"), &Overrides::new())
            .await
            .unwrap();
        assert!(job.name().starts_with("qj-test-"));
        assert_eq!(job.platform_id(), "p-1");
        assert_eq!(job.config().shots(), Some(1000));
    }
}
