//! Property-based tests for option merging.
//!
//! Whatever the caller passes, session-control keys never reach the job
//! configuration, unknown keys never fail the merge, and out-of-range values
//! always do.

use proptest::prelude::*;
use qaas_hal::options::SESSION_KEYS;
use qaas_hal::{HalError, OptionSet, OptionValue, Overrides, Validator, merge};

fn defaults() -> OptionSet {
    OptionSet::new()
        .with_session_defaults("prop-session")
        .with("shots", 1000)
        .with("memory", false)
        .with("method", "automatic")
        .with_validator("shots", Validator::int_range(1, 1_000_000))
        .with_validator(
            "method",
            Validator::one_of(["automatic", "statevector", "density_matrix"]),
        )
}

/// Overrides that pass validation: known keys with valid values, session
/// keys with well-formed values, and arbitrary unknown keys.
fn arb_valid_override() -> impl Strategy<Value = (String, OptionValue)> {
    prop_oneof![
        (1_i64..=1_000_000).prop_map(|n| ("shots".to_string(), OptionValue::Int(n))),
        any::<bool>().prop_map(|b| ("memory".to_string(), OptionValue::Bool(b))),
        prop::sample::select(vec!["automatic", "statevector", "density_matrix"])
            .prop_map(|m| ("method".to_string(), OptionValue::from(m))),
        "[a-z0-9-]{0,12}".prop_map(|s| ("session_id".to_string(), OptionValue::from(s))),
        "[a-z]{1,12}".prop_map(|s| ("session_name".to_string(), OptionValue::from(s))),
        "[a-z]{1,12}"
            .prop_map(|s| ("session_deduplication_id".to_string(), OptionValue::from(s))),
        (1_u32..600).prop_map(|m| ("session_max_duration".to_string(), OptionValue::from(format!("{m}m")))),
        (1_u32..3600).prop_map(|s| {
            (
                "session_max_idle_duration".to_string(),
                OptionValue::from(format!("{s}s")),
            )
        }),
        arb_unknown_key().prop_map(|k| (k, OptionValue::Int(1))),
    ]
}

fn arb_unknown_key() -> impl Strategy<Value = String> {
    "x_[a-z_]{1,16}"
}

proptest! {
    #[test]
    fn session_keys_never_leak(entries in prop::collection::vec(arb_valid_override(), 0..12)) {
        let overrides: Overrides = entries.into_iter().collect();
        let merged = merge(&defaults(), &overrides).unwrap();
        for key in SESSION_KEYS {
            prop_assert!(!merged.job_config.contains_key(key));
        }
    }

    #[test]
    fn unknown_keys_are_dropped_with_a_warning(keys in prop::collection::btree_set(arb_unknown_key(), 1..6)) {
        let overrides: Overrides = keys.iter().map(|k| (k.clone(), "anything")).collect();
        let merged = merge(&defaults(), &overrides).unwrap();
        prop_assert_eq!(merged.warnings.len(), keys.len());
        for key in &keys {
            prop_assert!(!merged.job_config.contains_key(key));
        }
        prop_assert_eq!(merged.job_config.shots(), Some(1000));
    }

    #[test]
    fn out_of_range_shots_always_fail(shots in prop_oneof![i64::MIN..=0_i64, 1_000_001_i64..=i64::MAX]) {
        let err = merge(&defaults(), &Overrides::new().shots(shots)).unwrap_err();
        let is_shots_error = matches!(err, HalError::Validation { ref key, .. } if key == "shots");
        prop_assert!(is_shots_error);
    }

    #[test]
    fn values_outside_enum_always_fail(method in "[A-Z][a-z]{0,10}") {
        let overrides = Overrides::new().set("method", method);
        let is_method_error = matches!(
            merge(&defaults(), &overrides),
            Err(HalError::Validation { ref key, .. }) if key == "method"
        );
        prop_assert!(is_method_error);
    }
}
