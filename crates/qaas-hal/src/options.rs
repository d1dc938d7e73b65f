//! Backend option tables.
//!
//! Each backend variant owns an [`OptionSet`]: the full list of options it
//! understands, their defaults, and an optional validator per key. The set is
//! built once at backend construction and never mutated afterwards; callers
//! adjust individual runs through [`Overrides`].
//!
//! ```ignore
//! let options = OptionSet::new()
//!     .with_session_defaults("qsim-session")
//!     .with("shots", 1000)
//!     .with_validator("shots", Validator::int_range(1, 100_000_000));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::parse_duration;

/// Session identifier or policy (`"auto"` to resolve automatically).
pub const SESSION_ID: &str = "session_id";
/// Display name used when a session is created.
pub const SESSION_NAME: &str = "session_name";
/// Deduplication key handed to the remote service.
pub const SESSION_DEDUPLICATION_ID: &str = "session_deduplication_id";
/// Hard upper bound on session lifetime.
pub const SESSION_MAX_DURATION: &str = "session_max_duration";
/// Idle timeout after which the session expires.
pub const SESSION_MAX_IDLE_DURATION: &str = "session_max_idle_duration";

/// Reserved session-control keys. These never reach the job payload.
pub const SESSION_KEYS: [&str; 5] = [
    SESSION_ID,
    SESSION_NAME,
    SESSION_DEDUPLICATION_ID,
    SESSION_MAX_DURATION,
    SESSION_MAX_IDLE_DURATION,
];

/// Default lifetime and idle timeout for sessions.
pub const DEFAULT_SESSION_DURATION: &str = "20m";

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Unset / `None`.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    Str(String),
}

impl OptionValue {
    /// Kind of this value.
    pub fn kind(&self) -> Option<OptionKind> {
        match self {
            OptionValue::Null => None,
            OptionValue::Bool(_) => Some(OptionKind::Bool),
            OptionValue::Int(_) => Some(OptionKind::Int),
            OptionValue::Float(_) => Some(OptionKind::Float),
            OptionValue::Str(_) => Some(OptionKind::Str),
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            OptionValue::Int(i) => Some(*i as f64),
            OptionValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of the value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// String view of the value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of the value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, OptionValue::Null)
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Null => write!(f, "null"),
            OptionValue::Bool(b) => write!(f, "{b}"),
            OptionValue::Int(i) => write!(f, "{i}"),
            OptionValue::Float(x) => write!(f, "{x}"),
            OptionValue::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

impl From<i32> for OptionValue {
    fn from(i: i32) -> Self {
        OptionValue::Int(i64::from(i))
    }
}

impl From<u32> for OptionValue {
    fn from(i: u32) -> Self {
        OptionValue::Int(i64::from(i))
    }
}

impl From<f64> for OptionValue {
    fn from(x: f64) -> Self {
        OptionValue::Float(x)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Str(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Str(s)
    }
}

impl<T: Into<OptionValue>> From<Option<T>> for OptionValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(OptionValue::Null, Into::into)
    }
}

/// Type of an option value, for [`Validator::Kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Boolean.
    Bool,
    /// Integer.
    Int,
    /// Any number (integers are accepted).
    Float,
    /// String.
    Str,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Bool => write!(f, "a boolean"),
            OptionKind::Int => write!(f, "an integer"),
            OptionKind::Float => write!(f, "a number"),
            OptionKind::Str => write!(f, "a string"),
        }
    }
}

/// Constraint attached to an option key.
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    /// Inclusive numeric range.
    Range {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Inclusive integer range. Floats are rejected, even integral ones.
    IntRange {
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },
    /// Value must have this type.
    Kind(OptionKind),
    /// Value must be one of these strings.
    OneOf(Vec<String>),
    /// Value must be a parsable duration string (`"20m"`, `"2h"`, `"1h30m"`).
    Duration,
}

impl Validator {
    /// Inclusive numeric range.
    pub fn range(min: f64, max: f64) -> Self {
        Validator::Range { min, max }
    }

    /// Inclusive integer range.
    pub fn int_range(min: i64, max: i64) -> Self {
        Validator::IntRange { min, max }
    }

    /// Fixed set of accepted strings.
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Validator::OneOf(values.into_iter().map(Into::into).collect())
    }

    /// Check `value`, returning the expected constraint on failure.
    pub fn check(&self, value: &OptionValue) -> Result<(), String> {
        match self {
            Validator::Range { min, max } => match value.as_f64() {
                Some(x) if x >= *min && x <= *max => Ok(()),
                _ => Err(format!("a number in [{min}, {max}]")),
            },
            Validator::IntRange { min, max } => match value.as_i64() {
                Some(n) if (*min..=*max).contains(&n) => Ok(()),
                _ => Err(format!("an integer in [{min}, {max}]")),
            },
            Validator::Kind(kind) => {
                let matches = match (kind, value) {
                    (OptionKind::Float, OptionValue::Int(_)) => true,
                    (kind, value) => value.kind() == Some(*kind),
                };
                if matches {
                    Ok(())
                } else {
                    Err(kind.to_string())
                }
            }
            Validator::OneOf(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| a == s) => Ok(()),
                _ => Err(format!("one of [{}]", allowed.join(", "))),
            },
            Validator::Duration => match value.as_str().map(parse_duration) {
                Some(Ok(_)) => Ok(()),
                _ => Err("a duration such as \"30s\", \"20m\" or \"2h\"".to_string()),
            },
        }
    }
}

/// Default value and validator for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct OptionEntry {
    /// Default value.
    pub default: OptionValue,
    /// Optional constraint.
    pub validator: Option<Validator>,
}

/// Named, validated option defaults of a backend variant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionSet {
    entries: BTreeMap<String, OptionEntry>,
}

impl OptionSet {
    /// Create an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a key with its default value.
    pub fn with(mut self, key: impl Into<String>, default: impl Into<OptionValue>) -> Self {
        let key = key.into();
        let default = default.into();
        match self.entries.get_mut(&key) {
            Some(entry) => entry.default = default,
            None => {
                self.entries.insert(
                    key,
                    OptionEntry {
                        default,
                        validator: None,
                    },
                );
            }
        }
        self
    }

    /// Attach a validator to a key. Keys are created with a `Null` default
    /// if they were not declared yet.
    pub fn with_validator(mut self, key: impl Into<String>, validator: Validator) -> Self {
        self.entries
            .entry(key.into())
            .or_insert(OptionEntry {
                default: OptionValue::Null,
                validator: None,
            })
            .validator = Some(validator);
        self
    }

    /// Install the five reserved session-control keys.
    ///
    /// `name` is used both as the session display name and as the default
    /// deduplication key.
    pub fn with_session_defaults(self, name: &str) -> Self {
        self.with(SESSION_ID, "auto")
            .with(SESSION_NAME, name)
            .with(SESSION_DEDUPLICATION_ID, name)
            .with(SESSION_MAX_DURATION, DEFAULT_SESSION_DURATION)
            .with(SESSION_MAX_IDLE_DURATION, DEFAULT_SESSION_DURATION)
            .with_validator(SESSION_NAME, Validator::Kind(OptionKind::Str))
            .with_validator(SESSION_MAX_DURATION, Validator::Duration)
            .with_validator(SESSION_MAX_IDLE_DURATION, Validator::Duration)
    }

    /// Whether `key` is a known option.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Entry for `key`.
    pub fn entry(&self, key: &str) -> Option<&OptionEntry> {
        self.entries.get(key)
    }

    /// Default value for `key`.
    pub fn default_value(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(key).map(|e| &e.default)
    }

    /// Default string value for `key`, if it is a string.
    pub fn default_str(&self, key: &str) -> Option<&str> {
        self.default_value(key).and_then(OptionValue::as_str)
    }

    /// Iterate over `(key, entry)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-call option overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    values: BTreeMap<String, OptionValue>,
}

impl Overrides {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `key` with `value`.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Override the shot count.
    pub fn shots(self, shots: i64) -> Self {
        self.set("shots", shots)
    }

    /// Run inside an explicit session, or `"auto"`.
    pub fn session_id(self, session_id: impl Into<String>) -> Self {
        self.set(SESSION_ID, session_id.into())
    }

    /// Iterate over overrides in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether no override was given.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for Overrides {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
