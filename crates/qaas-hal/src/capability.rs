//! Backend capability introspection.
//!
//! [`Capabilities`] summarizes what a remote backend accepts: qubit count,
//! batch size and shot limits. [`Target`] is the optional compiler-facing
//! description (basis gates and feature flags); variants without one
//! cannot be used for target-aware transpilation.

use serde::{Deserialize, Serialize};

/// What a backend accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Name of the backend.
    pub name: String,
    /// Number of qubits available.
    pub num_qubits: u32,
    /// Maximum circuits per job.
    pub max_circuits: usize,
    /// Maximum shots per job, taken from the `shots` validator when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_shots: Option<u64>,
    /// Whether this is a simulator (`true`) or hardware (`false`).
    pub is_simulator: bool,
    /// Compiler-facing description, when the variant provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
}

impl Capabilities {
    /// Whether a target description is available.
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }
}

/// Basis gates and feature flags of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Number of qubits.
    pub num_qubits: u32,
    /// Supported gates (OpenQASM naming).
    pub basis_gates: Vec<String>,
    /// Additional flags: `"statevector"`, `"mid_circuit_measurement"`, ...
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl Target {
    /// Target over `basis_gates` with all-to-all connectivity.
    pub fn new<I, S>(num_qubits: u32, basis_gates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            num_qubits,
            basis_gates: basis_gates.into_iter().map(Into::into).collect(),
            features: Vec::new(),
        }
    }

    /// Add feature flags.
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    /// Check if a gate is supported.
    pub fn supports(&self, gate: &str) -> bool {
        self.basis_gates.iter().any(|g| g == gate)
    }
}
