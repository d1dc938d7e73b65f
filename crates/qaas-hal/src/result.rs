//! Result decoding.
//!
//! A finished job publishes one envelope in the Qiskit result layout:
//!
//! ```json
//! {
//!   "backend_name": "aer_simulation_pop_c16m128",
//!   "job_id": "…",
//!   "success": true,
//!   "results": [
//!     { "shots": 1000, "success": true,
//!       "data": { "counts": { "0x0": 493, "0x3": 507 } },
//!       "header": { "name": "bell", "memory_slots": 2 } }
//!   ]
//! }
//! ```
//!
//! The envelope is fetched once per job and rendered on demand into any
//! [`ResultFormat`]. Renderings are pure projections of the cached envelope.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::client::QaasClient;
use crate::error::{HalError, HalResult};

/// Measurement key used for histogram renderings.
pub const MEASUREMENT_KEY: &str = "m";

/// Caller-facing rendering of a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// Bitstring counts per circuit.
    Native,
    /// Integer-outcome histograms per measurement key.
    Histogram,
    /// The envelope as JSON.
    Json,
}

impl FromStr for ResultFormat {
    type Err = HalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "native" | "qiskit" => Ok(ResultFormat::Native),
            "cirq" | "histogram" => Ok(ResultFormat::Histogram),
            "json" | "raw" => Ok(ResultFormat::Json),
            _ => Err(HalError::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultFormat::Native => write!(f, "native"),
            ResultFormat::Histogram => write!(f, "histogram"),
            ResultFormat::Json => write!(f, "json"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Terminal payload of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    /// Platform that executed the job.
    #[serde(default)]
    pub backend_name: Option<String>,
    /// Remote job id.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Overall success flag.
    #[serde(default = "default_true")]
    pub success: bool,
    /// Free-form status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// One entry per circuit, in submission order.
    #[serde(default)]
    pub results: Vec<ExperimentResult>,
    /// Error detail when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one circuit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Shots executed.
    #[serde(default)]
    pub shots: Option<u64>,
    /// Per-circuit success flag.
    #[serde(default = "default_true")]
    pub success: bool,
    /// Measurement data.
    #[serde(default)]
    pub data: ExperimentData,
    /// Circuit metadata.
    #[serde(default)]
    pub header: ExperimentHeader,
    /// Free-form status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Measurement data of one circuit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentData {
    /// Counts keyed by hex (`"0x3"`) or bitstring (`"011"`).
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    /// Per-shot outcomes, when the job asked for memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Vec<String>>,
}

/// Circuit metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentHeader {
    /// Circuit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Number of classical bits; fixes the bitstring width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_slots: Option<u32>,
}

impl ResultEnvelope {
    /// Parse an envelope delivered either as a JSON document or as a
    /// JSON-encoded string.
    pub fn from_value(value: serde_json::Value) -> HalResult<Self> {
        match value {
            serde_json::Value::String(text) => Self::from_json_str(&text),
            other => serde_json::from_value(other)
                .map_err(|e| HalError::Decode(format!("invalid result envelope: {e}"))),
        }
    }

    /// Parse an envelope from JSON text.
    pub fn from_json_str(text: &str) -> HalResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| HalError::Decode(format!("invalid result envelope: {e}")))
    }

    /// Build a successful envelope from bitstring counts, one per circuit.
    pub fn from_counts(job_id: impl Into<String>, counts: &[Counts]) -> Self {
        let results = counts
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let width = c.0.keys().map(String::len).max().unwrap_or(0);
                ExperimentResult {
                    shots: Some(c.total_shots()),
                    success: true,
                    data: ExperimentData {
                        counts: c.0.iter().map(|(k, v)| (encode_key(k), *v)).collect(),
                        memory: None,
                    },
                    header: ExperimentHeader {
                        name: Some(format!("circuit-{i}")),
                        memory_slots: u32::try_from(width).ok(),
                    },
                    status: None,
                }
            })
            .collect();
        Self {
            backend_name: None,
            job_id: Some(job_id.into()),
            success: true,
            status: Some("COMPLETED".into()),
            results,
            error: None,
        }
    }

    /// A failed envelope carrying `detail`.
    pub fn failure(job_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            backend_name: None,
            job_id: Some(job_id.into()),
            success: false,
            status: Some("ERROR".into()),
            results: Vec::new(),
            error: Some(detail.into()),
        }
    }

    /// Append the circuits of another envelope of the same job.
    fn absorb(&mut self, other: ResultEnvelope) {
        self.success &= other.success;
        if self.error.is_none() {
            self.error = other.error;
        }
        self.results.extend(other.results);
    }

    /// Render into `format`.
    pub fn render(&self, format: ResultFormat) -> HalResult<DecodedResult> {
        match format {
            ResultFormat::Native => self.to_execution_result().map(DecodedResult::Native),
            ResultFormat::Histogram => self.to_histograms().map(DecodedResult::Histogram),
            ResultFormat::Json => serde_json::to_value(self)
                .map(DecodedResult::Json)
                .map_err(|e| HalError::Decode(e.to_string())),
        }
    }

    fn to_execution_result(&self) -> HalResult<ExecutionResult> {
        let experiments = self
            .results
            .iter()
            .enumerate()
            .map(|(i, experiment)| {
                let width = experiment.header.memory_slots;
                let mut counts = Counts::new();
                for (key, count) in &experiment.data.counts {
                    counts.insert(decode_key(key, width)?, *count);
                }
                Ok(ExperimentCounts {
                    name: experiment
                        .header
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("circuit-{i}")),
                    shots: experiment.shots.unwrap_or_else(|| counts.total_shots()),
                    counts,
                })
            })
            .collect::<HalResult<Vec<_>>>()?;

        Ok(ExecutionResult {
            job_id: self.job_id.clone(),
            backend_name: self.backend_name.clone(),
            experiments,
        })
    }

    fn to_histograms(&self) -> HalResult<HistogramResult> {
        let native = self.to_execution_result()?;
        let histograms = native
            .experiments
            .into_iter()
            .map(|experiment| {
                let mut outcomes = BTreeMap::new();
                for (bits, count) in experiment.counts.iter() {
                    let value = u64::from_str_radix(bits, 2).map_err(|_| {
                        HalError::Decode(format!(
                            "outcome '{bits}' does not fit a 64-bit histogram key"
                        ))
                    })?;
                    *outcomes.entry(value).or_insert(0) += count;
                }
                Ok(Histogram {
                    name: experiment.name,
                    key: MEASUREMENT_KEY.to_string(),
                    repetitions: experiment.shots,
                    outcomes,
                })
            })
            .collect::<HalResult<Vec<_>>>()?;

        Ok(HistogramResult {
            job_id: native.job_id,
            histograms,
        })
    }
}

/// `"0x3"` with width 4 → `"0011"`; bitstrings pass through with spaces removed.
fn decode_key(key: &str, width: Option<u32>) -> HalResult<String> {
    let invalid = || HalError::Decode(format!("invalid count key '{key}'"));
    let trimmed = key.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        let value = u128::from_str_radix(hex, 16).map_err(|_| invalid())?;
        let width = width.map_or(1, |w| w.max(1) as usize);
        return Ok(format!("{value:0>width$b}"));
    }
    if !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, '0' | '1' | ' ')) {
        return Ok(trimmed.replace(' ', ""));
    }
    Err(invalid())
}

fn encode_key(bits: &str) -> String {
    u128::from_str_radix(bits, 2).map_or_else(|_| bits.to_string(), |v| format!("0x{v:x}"))
}

/// Bitstring counts of one circuit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Counts(BTreeMap<String, u64>);

impl Counts {
    /// Empty counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` to `bitstring`.
    pub fn insert(&mut self, bitstring: impl Into<String>, count: u64) {
        *self.0.entry(bitstring.into()).or_insert(0) += count;
    }

    /// Count for `bitstring`.
    pub fn get(&self, bitstring: &str) -> Option<u64> {
        self.0.get(bitstring).copied()
    }

    /// Sum of all counts.
    pub fn total_shots(&self) -> u64 {
        self.0.values().sum()
    }

    /// The most frequent outcome.
    pub fn most_frequent(&self) -> Option<(&str, u64)> {
        self.0
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(bits, count)| (bits.as_str(), *count))
    }

    /// Iterate over `(bitstring, count)` in bitstring order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of distinct outcomes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no outcome was recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Counts {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut counts = Counts::new();
        for (k, v) in iter {
            counts.insert(k, v);
        }
        counts
    }
}

/// Counts of one circuit in the native rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentCounts {
    /// Circuit name.
    pub name: String,
    /// Shots executed.
    pub shots: u64,
    /// Bitstring counts.
    pub counts: Counts,
}

/// Native rendering: bitstring counts per circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Remote job id.
    pub job_id: Option<String>,
    /// Executing platform.
    pub backend_name: Option<String>,
    /// One entry per circuit.
    pub experiments: Vec<ExperimentCounts>,
}

impl ExecutionResult {
    /// Counts of circuit `index`.
    pub fn get_counts(&self, index: usize) -> Option<&Counts> {
        self.experiments.get(index).map(|e| &e.counts)
    }
}

/// Integer-outcome histogram of one circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Histogram {
    /// Circuit name.
    pub name: String,
    /// Measurement key.
    pub key: String,
    /// Number of repetitions.
    pub repetitions: u64,
    /// Outcome value → occurrences.
    pub outcomes: BTreeMap<u64, u64>,
}

/// Histogram rendering, one histogram per circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramResult {
    /// Remote job id.
    pub job_id: Option<String>,
    /// One entry per circuit.
    pub histograms: Vec<Histogram>,
}

/// A result rendered into one [`ResultFormat`].
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResult {
    /// Native bitstring counts.
    Native(ExecutionResult),
    /// Integer-outcome histograms.
    Histogram(HistogramResult),
    /// The envelope as JSON.
    Json(serde_json::Value),
}

impl DecodedResult {
    /// Format of this rendering.
    pub fn format(&self) -> ResultFormat {
        match self {
            DecodedResult::Native(_) => ResultFormat::Native,
            DecodedResult::Histogram(_) => ResultFormat::Histogram,
            DecodedResult::Json(_) => ResultFormat::Json,
        }
    }

    /// The native rendering, if this is one.
    pub fn into_native(self) -> Option<ExecutionResult> {
        match self {
            DecodedResult::Native(r) => Some(r),
            _ => None,
        }
    }

    /// The histogram rendering, if this is one.
    pub fn into_histogram(self) -> Option<HistogramResult> {
        match self {
            DecodedResult::Histogram(r) => Some(r),
            _ => None,
        }
    }

    /// The JSON rendering, if this is one.
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            DecodedResult::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// Fetch the envelope of a completed job.
///
/// Inline payloads are parsed directly; payloads published by URL are
/// downloaded. Multiple entries are concatenated in listing order.
#[instrument(skip(client))]
pub(crate) async fn fetch_envelope(
    client: &dyn QaasClient,
    job_id: &str,
) -> HalResult<ResultEnvelope> {
    let entries = client.list_job_results(job_id).await?;
    let mut envelope: Option<ResultEnvelope> = None;

    for entry in entries {
        let part = match (entry.result, entry.url) {
            (Some(payload), _) => ResultEnvelope::from_value(payload)?,
            (None, Some(url)) => {
                debug!("Downloading result of job {} from {}", job_id, url);
                ResultEnvelope::from_json_str(&client.download_result(&url).await?)?
            }
            (None, None) => continue,
        };
        match envelope.as_mut() {
            Some(existing) => existing.absorb(part),
            None => envelope = Some(part),
        }
    }

    envelope.ok_or_else(|| HalError::Decode(format!("job {job_id} completed without a result")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bell_envelope() -> ResultEnvelope {
        ResultEnvelope::from_value(json!({
            "backend_name": "aer_simulation_pop_c16m128",
            "job_id": "j-1",
            "success": true,
            "results": [{
                "shots": 1000,
                "data": { "counts": { "0x0": 493, "0x3": 507 } },
                "header": { "name": "bell", "memory_slots": 2 }
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_format_names() {
        assert_eq!("".parse::<ResultFormat>().unwrap(), ResultFormat::Native);
        assert_eq!("qiskit".parse::<ResultFormat>().unwrap(), ResultFormat::Native);
        assert_eq!("cirq".parse::<ResultFormat>().unwrap(), ResultFormat::Histogram);
        assert_eq!("JSON".parse::<ResultFormat>().unwrap(), ResultFormat::Json);
        assert!(matches!(
            "pennylane".parse::<ResultFormat>(),
            Err(HalError::UnsupportedFormat(f)) if f == "pennylane"
        ));
    }

    #[test]
    fn test_native_rendering_pads_hex_keys() {
        let native = bell_envelope()
            .render(ResultFormat::Native)
            .unwrap()
            .into_native()
            .unwrap();
        let counts = native.get_counts(0).unwrap();
        assert_eq!(counts.get("00"), Some(493));
        assert_eq!(counts.get("11"), Some(507));
        assert_eq!(counts.most_frequent(), Some(("11", 507)));
        assert_eq!(native.experiments[0].name, "bell");
    }

    #[test]
    fn test_histogram_rendering_is_equivalent() {
        let envelope = bell_envelope();
        let histogram = envelope
            .render(ResultFormat::Histogram)
            .unwrap()
            .into_histogram()
            .unwrap();
        let h = &histogram.histograms[0];
        assert_eq!(h.key, MEASUREMENT_KEY);
        assert_eq!(h.repetitions, 1000);
        assert_eq!(h.outcomes.get(&0), Some(&493));
        assert_eq!(h.outcomes.get(&3), Some(&507));
    }

    #[test]
    fn test_envelope_as_json_string() {
        let text = serde_json::to_string(&bell_envelope()).unwrap();
        let envelope = ResultEnvelope::from_value(serde_json::Value::String(text)).unwrap();
        assert_eq!(envelope, bell_envelope());
    }

    #[test]
    fn test_bitstring_keys_are_tolerated() {
        let envelope = ResultEnvelope::from_value(json!({
            "results": [{ "data": { "counts": { "01 1": 7 } } }]
        }))
        .unwrap();
        let native = envelope.render(ResultFormat::Native).unwrap().into_native().unwrap();
        assert_eq!(native.get_counts(0).unwrap().get("011"), Some(7));
        assert_eq!(native.experiments[0].shots, 7);
    }

    #[test]
    fn test_wide_outcomes_fail_histogram_rendering() {
        let key = "1".repeat(70);
        let envelope = ResultEnvelope::from_value(json!({
            "results": [{ "data": { "counts": { key: 1 } } }]
        }))
        .unwrap();
        assert!(envelope.render(ResultFormat::Native).is_ok());
        assert!(matches!(
            envelope.render(ResultFormat::Histogram),
            Err(HalError::Decode(_))
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(
            ResultEnvelope::from_value(json!("not json")),
            Err(HalError::Decode(_))
        ));
        assert!(matches!(
            ResultEnvelope::from_value(json!({
                "results": [{ "data": { "counts": { "0xZZ": 1 } } }]
            }))
            .unwrap()
            .render(ResultFormat::Native),
            Err(HalError::Decode(_))
        ));
    }

    #[test]
    fn test_from_counts_round_trips() {
        let counts: Counts = [("000", 10_u64), ("101", 5)].into_iter().collect();
        let envelope = ResultEnvelope::from_counts("j-2", &[counts.clone()]);
        assert_eq!(envelope.results[0].data.counts.get("0x5"), Some(&5));
        assert_eq!(envelope.results[0].header.memory_slots, Some(3));
        let native = envelope.render(ResultFormat::Native).unwrap().into_native().unwrap();
        assert_eq!(native.get_counts(0), Some(&counts));
    }
}
