//! Qsim simulator variant.

use qaas_hal::{BackendVariant, OptionSet, Validator};

/// Default session name (and deduplication key) of Qsim backends.
pub const QSIM_SESSION_NAME: &str = "qsim-session-from-qiskit";

/// Qsim runs one circuit per job and has no target description.
#[derive(Debug, Clone, Copy, Default)]
pub struct QsimVariant;

impl BackendVariant for QsimVariant {
    fn kind(&self) -> &'static str {
        "qsim"
    }

    fn type_name(&self) -> &'static str {
        "QsimBackend"
    }

    fn default_options(&self) -> OptionSet {
        OptionSet::new()
            .with_session_defaults(QSIM_SESSION_NAME)
            .with("shots", 1000)
            .with("circuit_memoization_size", 0)
            .with("max_fused_gate_size", 2)
            .with("ev_noisy_repetitions", 1)
            .with("denormals_are_zeros", false)
            .with_validator("shots", Validator::int_range(1, 100_000_000))
    }

    fn max_circuits(&self) -> usize {
        1
    }
}
