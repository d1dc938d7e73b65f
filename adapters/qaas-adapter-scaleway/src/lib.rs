//! Scaleway Quantum-as-a-Service adapter for `qaas-hal`.
//!
//! This crate connects the orchestration core to Scaleway's QaaS platform
//! and exposes its two simulator engines as backends.
//!
//! # Supported Engines
//!
//! | Engine | Backend | Circuits per job | Shots |
//! |--------|---------|------------------|-------|
//! | Qiskit Aer | `AerBackend` | 1024 | 1 to 1,000,000 |
//! | Qsim | `QsimBackend` | 1 | 1 to 100,000,000 |
//!
//! # Architecture
//!
//! Scaleway QaaS uses a session-based execution model:
//!
//! 1. A **session** reserves a platform (created on demand or reused by
//!    deduplication key)
//! 2. **Jobs** run inside a session; their circuits are uploaded as a
//!    compressed computation model
//! 3. **Results** are returned inline or published at a download URL
//!
//! # Authentication
//!
//! ```bash
//! export SCALEWAY_PROJECT_ID="your-project-id"
//! export SCALEWAY_SECRET_KEY="your-secret-key"
//! export SCALEWAY_API_URL="http://localhost:5044/qaas/v1alpha1"  # optional
//! ```
//!
//! # Example
//!
//! ```ignore
//! use qaas_adapter_scaleway::ScalewayProvider;
//! use qaas_hal::{Overrides, PlatformFilter, Program};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = ScalewayProvider::from_env()?;
//!     for backend in provider.backends(&PlatformFilter::default()).await? {
//!         println!("{backend}");
//!     }
//!
//!     let backend = provider.get_backend("aer_simulation_local").await?;
//!     let mut job = backend
//!         .run(Program::qasm2(include_str!("ghz.qasm")), &Overrides::new().shots(1000))
//!         .await?;
//!     if let Some(result) = job.result("qiskit").await?.into_native() {
//!         println!("{:?}", result.get_counts(0));
//!     }
//!     Ok(())
//! }
//! ```

mod aer;
mod api;
mod config;
mod error;
mod provider;
mod qsim;

pub use aer::{AER_SESSION_NAME, AerVariant};
pub use api::{
    DEFAULT_API_URL, ScalewayClient, build_computation_model, build_computation_parameters,
    compress_program,
};
pub use config::ProviderConfig;
pub use error::{ScalewayError, ScalewayResult};
pub use provider::ScalewayProvider;
pub use qsim::{QSIM_SESSION_NAME, QsimVariant};

// Re-export common types
pub use qaas_hal::{BackendVariant, PlatformFilter, QaasBackend, QaasClient};
