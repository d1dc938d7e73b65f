//! QaaS orchestration core.
//!
//! This crate drives circuits through a remote quantum execution service:
//! it merges per-call options onto backend defaults, resolves the session a
//! job runs in, submits the job, tracks it to a terminal state and renders
//! the result in the format the caller asks for.
//!
//! # Overview
//!
//! - [`OptionSet`] / [`Overrides`] and [`merge`] for validated configuration
//! - [`SessionManager`] for create-or-reuse session resolution
//! - [`JobHandle`] for submission, polling and result rendering
//! - [`ResultEnvelope`] with [`ExecutionResult`] and [`HistogramResult`] renderings
//! - [`QaasBackend`] and the [`BackendVariant`] trait tying it together
//! - [`QaasClient`], the seam to the remote service, with
//!   [`InMemoryService`] as an in-process implementation
//!
//! # Supported Services
//!
//! | Service | Crate | Authentication |
//! |---------|-------|----------------|
//! | In-process | `qaas-hal` ([`InMemoryService`]) | None |
//! | Scaleway QaaS | `qaas-adapter-scaleway` | `SCALEWAY_SECRET_KEY` env var |
//!
//! # Example: Running a Circuit
//!
//! ```ignore
//! use qaas_hal::{Overrides, Program, SessionSpec};
//! use qaas_adapter_scaleway::ScalewayProvider;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = ScalewayProvider::from_env()?;
//!     let backend = provider.get_backend("aer_simulation_pop_c16m128").await?;
//!
//!     let session = backend
//!         .start_session(
//!             &backend
//!                 .session_spec()?
//!                 .with_deduplication_id("my-workshop")
//!                 .with_max_duration(Duration::from_secs(2 * 3600)),
//!         )
//!         .await?;
//!
//!     let bell = Program::qasm2(include_str!("bell.qasm"));
//!     let mut job = backend
//!         .run(bell, &Overrides::new().shots(1000).session_id(&session.id))
//!         .await?;
//!
//!     let native = job.result("").await?;
//!     let histogram = job.result("cirq").await?;
//!     println!("{native:?}\n{histogram:?}");
//!
//!     backend.stop_session(&session.id).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod capability;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod naming;
pub mod options;
pub mod result;
pub mod session;

pub use backend::{BackendInfo, BackendVariant, QaasBackend};
pub use capability::{Capabilities, Target};
pub use client::{
    ClientError, ClientResult, CreateJobRequest, CreateSessionRequest, JobRecord,
    JobResultRecord, PlatformFilter, PlatformRecord, QaasClient, RemoteJobStatus, SessionRecord,
};
pub use config::{JobConfig, MergedConfig, OptionWarning, merge};
pub use error::{HalError, HalResult};
pub use job::{CircuitBatch, JobHandle, JobId, JobState, Program, SerializationFormat};
pub use memory::{CallCounts, InMemoryService, ScriptedOutcome};
pub use naming::{NameGenerator, RandomNameGenerator};
pub use options::{OptionKind, OptionSet, OptionValue, Overrides, Validator};
pub use result::{
    Counts, DecodedResult, ExecutionResult, Histogram, HistogramResult, ResultEnvelope,
    ResultFormat,
};
pub use session::{
    Session, SessionManager, SessionPolicy, SessionRequest, SessionSpec, SessionState,
    format_duration, parse_duration,
};
