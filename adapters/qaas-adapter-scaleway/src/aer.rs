//! Aer simulator variant.
//!
//! Option names and defaults follow the Qiskit Aer simulator, plus the five
//! session-control keys shared by every variant.

use qaas_hal::options::OptionKind;
use qaas_hal::{BackendVariant, OptionSet, OptionValue, Target, Validator};

/// Default session name (and deduplication key) of Aer backends.
pub const AER_SESSION_NAME: &str = "aer-session-from-qiskit";

/// Simulation methods accepted by `method`.
const METHODS: &[&str] = &[
    "automatic",
    "statevector",
    "density_matrix",
    "stabilizer",
    "extended_stabilizer",
    "matrix_product_state",
    "unitary",
    "superop",
    "tensor_network",
];

/// Basis gates of the Aer simulator.
const BASIS_GATES: &[&str] = &[
    "ccx", "ccz", "cp", "crx", "cry", "crz", "cswap", "csx", "cu", "cu1", "cu2", "cu3", "cx", "cy",
    "cz", "delay", "diagonal", "ecr", "h", "id", "initialize", "mcp", "mcphase", "mcr", "mcrx",
    "mcry", "mcrz", "mcswap", "mcsx", "mcu", "mcu1", "mcu2", "mcu3", "mcx", "mcy", "mcz",
    "multiplexer", "p", "pauli", "r", "rx", "rxx", "ry", "ryy", "rz", "rzx", "rzz", "s", "sdg",
    "swap", "sx", "sxdg", "t", "tdg", "u", "u1", "u2", "u3", "unitary", "x", "y", "z",
];

/// Aer runs up to 1024 circuits per job.
#[derive(Debug, Clone, Copy, Default)]
pub struct AerVariant;

impl BackendVariant for AerVariant {
    fn kind(&self) -> &'static str {
        "aer"
    }

    fn type_name(&self) -> &'static str {
        "AerBackend"
    }

    fn default_options(&self) -> OptionSet {
        OptionSet::new()
            .with_session_defaults(AER_SESSION_NAME)
            .with("shots", 1000)
            .with("memory", false)
            .with("seed_simulator", OptionValue::Null)
            .with("method", "automatic")
            .with("precision", "double")
            .with("max_shot_size", OptionValue::Null)
            .with("enable_truncation", true)
            .with("max_parallel_experiments", 1)
            .with("zero_threshold", 1e-10)
            .with("validation_threshold", 1e-8)
            .with("accept_distributed_results", OptionValue::Null)
            .with("runtime_parameter_bind_enable", false)
            .with("statevector_parallel_threshold", 14)
            .with("statevector_sample_measure_opt", 10)
            .with("stabilizer_max_snapshot_probabilities", 32)
            .with("extended_stabilizer_sampling_method", "resampled_metropolis")
            .with("extended_stabilizer_metropolis_mixing_time", 5000)
            .with("extended_stabilizer_approximation_error", 0.05)
            .with("extended_stabilizer_norm_estimation_samples", 100)
            .with("extended_stabilizer_norm_estimation_repetitions", 3)
            .with("extended_stabilizer_parallel_threshold", 100)
            .with("extended_stabilizer_probabilities_snapshot_samples", 3000)
            .with("matrix_product_state_max_bond_dimension", OptionValue::Null)
            .with("matrix_product_state_truncation_threshold", 1e-16)
            .with("mps_sample_measure_algorithm", "mps_apply_measure")
            .with("mps_log_data", false)
            .with("mps_swap_direction", "mps_swap_left")
            .with("chop_threshold", 1e-8)
            .with("mps_parallel_threshold", 14)
            .with("mps_omp_threads", 1)
            .with("tensor_network_num_sampling_qubits", 10)
            .with("use_cuTensorNet_autotuning", false)
            .with("fusion_enable", true)
            .with("fusion_verbose", false)
            .with("fusion_max_qubit", OptionValue::Null)
            .with("fusion_threshold", OptionValue::Null)
            .with_validator("shots", Validator::int_range(1, 1_000_000))
            .with_validator("memory", Validator::Kind(OptionKind::Bool))
            .with_validator("method", Validator::one_of(METHODS.iter().copied()))
            .with_validator("precision", Validator::one_of(["single", "double"]))
            .with_validator(
                "extended_stabilizer_sampling_method",
                Validator::one_of(["resampled_metropolis", "metropolis", "norm_estimation"]),
            )
            .with_validator(
                "mps_sample_measure_algorithm",
                Validator::one_of(["mps_apply_measure", "mps_probabilities"]),
            )
            .with_validator(
                "mps_swap_direction",
                Validator::one_of(["mps_swap_left", "mps_swap_right"]),
            )
    }

    fn max_circuits(&self) -> usize {
        1024
    }

    fn target(&self, num_qubits: u32) -> Option<Target> {
        Some(
            Target::new(num_qubits, BASIS_GATES.iter().copied()).with_features([
                "statevector",
                "density_matrix",
                "mid_circuit_measurement",
            ]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qaas_hal::options::SESSION_KEYS;
    use qaas_hal::{HalError, Overrides, merge};

    #[test]
    fn test_option_table() {
        let options = AerVariant.default_options();
        assert_eq!(options.len(), 41);
        for key in SESSION_KEYS {
            assert!(options.contains(key));
        }
        assert_eq!(options.default_str("session_name"), Some(AER_SESSION_NAME));
        assert_eq!(options.default_value("shots"), Some(&OptionValue::Int(1000)));
    }

    #[test]
    fn test_validators() {
        let options = AerVariant.default_options();
        assert!(merge(&options, &Overrides::new().shots(1_000_000)).is_ok());
        assert!(matches!(
            merge(&options, &Overrides::new().shots(2_000_000)),
            Err(HalError::Validation { ref key, .. }) if key == "shots"
        ));
        assert!(merge(&options, &Overrides::new().set("shots", 1500.5)).is_err());
        assert!(merge(&options, &Overrides::new().set("memory", "yes")).is_err());
        assert!(merge(&options, &Overrides::new().set("method", "quantum_magic")).is_err());
        assert!(merge(&options, &Overrides::new().set("method", "statevector")).is_ok());
    }

    #[test]
    fn test_limits_and_target() {
        assert_eq!(AerVariant.max_circuits(), 1024);
        let target = AerVariant.target(30).unwrap();
        assert_eq!(target.num_qubits, 30);
        assert!(target.supports("cx"));
        assert!(target.supports("u3"));
    }
}
