//! Merging per-call overrides onto a backend's option defaults.
//!
//! The merge produces three things:
//!
//! - a [`JobConfig`] holding only job-level options (the remote job schema
//!   rejects unknown fields, so session-control keys are removed),
//! - a [`SessionRequest`] built from the popped session-control keys,
//! - a list of [`OptionWarning`]s for override keys the backend does not know.
//!
//! Validation runs after overwriting and before any remote call is made.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::error::{HalError, HalResult};
use crate::options::{
    OptionSet, OptionValue, Overrides, SESSION_DEDUPLICATION_ID, SESSION_ID, SESSION_KEYS,
    SESSION_MAX_DURATION, SESSION_MAX_IDLE_DURATION, SESSION_NAME,
};
use crate::session::{SessionPolicy, SessionRequest, parse_duration};

/// Job-level configuration sent along with the circuits.
///
/// Immutable once built; never contains session-control keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct JobConfig(BTreeMap<String, OptionValue>);

impl JobConfig {
    /// Value for `key`.
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Shot count, if configured as an integer.
    pub fn shots(&self) -> Option<i64> {
        self.get("shots").and_then(OptionValue::as_i64)
    }

    /// Iterate over `(key, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the configuration is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object form of the configuration.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), option_to_json(v)))
                .collect(),
        )
    }
}

fn option_to_json(value: &OptionValue) -> serde_json::Value {
    match value {
        OptionValue::Null => serde_json::Value::Null,
        OptionValue::Bool(b) => serde_json::Value::Bool(*b),
        OptionValue::Int(i) => serde_json::Value::from(*i),
        OptionValue::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        OptionValue::Str(s) => serde_json::Value::String(s.clone()),
    }
}

/// Non-fatal notice about an override the backend ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionWarning {
    /// The unknown key.
    pub key: String,
}

impl fmt::Display for OptionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Option {} is not used by this backend", self.key)
    }
}

/// Output of [`merge`].
#[derive(Debug, Clone)]
pub struct MergedConfig {
    /// Job-level options.
    pub job_config: JobConfig,
    /// Session resolution request.
    pub session: SessionRequest,
    /// Ignored override keys.
    pub warnings: Vec<OptionWarning>,
}

/// Merge `overrides` onto `defaults`.
///
/// # Errors
///
/// Returns [`HalError::Validation`] when an overridden value fails its
/// validator, or when a session-control value cannot be interpreted.
pub fn merge(defaults: &OptionSet, overrides: &Overrides) -> HalResult<MergedConfig> {
    let mut merged: BTreeMap<String, OptionValue> = defaults
        .iter()
        .map(|(key, entry)| (key.to_string(), entry.default.clone()))
        .collect();
    let mut warnings = Vec::new();

    for (key, value) in overrides.iter() {
        let Some(entry) = defaults.entry(key) else {
            debug!("Ignoring unknown option '{}'", key);
            warnings.push(OptionWarning {
                key: key.to_string(),
            });
            continue;
        };

        if let Some(validator) = &entry.validator {
            validator
                .check(value)
                .map_err(|expected| HalError::validation(key, value, expected))?;
        }
        merged.insert(key.to_string(), value.clone());
    }

    let session = take_session_request(&mut merged)?;

    Ok(MergedConfig {
        job_config: JobConfig(merged),
        session,
        warnings,
    })
}

/// Pop every session-control key out of `merged`.
fn take_session_request(merged: &mut BTreeMap<String, OptionValue>) -> HalResult<SessionRequest> {
    let mut popped: BTreeMap<&'static str, OptionValue> = BTreeMap::new();
    for key in SESSION_KEYS {
        if let Some(value) = merged.remove(key) {
            popped.insert(key, value);
        }
    }

    let policy = SessionPolicy::parse(popped.get(SESSION_ID).unwrap_or(&OptionValue::Null))?;
    let name = optional_string(&popped, SESSION_NAME)?.unwrap_or_default();
    let deduplication_id = optional_string(&popped, SESSION_DEDUPLICATION_ID)?;
    let max_duration = optional_duration(&popped, SESSION_MAX_DURATION)?;
    let max_idle_duration = optional_duration(&popped, SESSION_MAX_IDLE_DURATION)?;

    Ok(SessionRequest {
        policy,
        name,
        deduplication_id,
        max_duration,
        max_idle_duration,
    })
}

fn optional_string(
    popped: &BTreeMap<&'static str, OptionValue>,
    key: &str,
) -> HalResult<Option<String>> {
    match popped.get(key) {
        None | Some(OptionValue::Null) => Ok(None),
        Some(OptionValue::Str(s)) if s.is_empty() => Ok(None),
        Some(OptionValue::Str(s)) => Ok(Some(s.clone())),
        Some(other) => Err(HalError::validation(key, other, "a string")),
    }
}

fn optional_duration(
    popped: &BTreeMap<&'static str, OptionValue>,
    key: &str,
) -> HalResult<Option<std::time::Duration>> {
    match optional_string(popped, key)? {
        None => Ok(None),
        Some(s) => parse_duration(&s)
            .map(Some)
            .map_err(|_| HalError::validation(key, format!("\"{s}\""), "a duration")),
    }
}
