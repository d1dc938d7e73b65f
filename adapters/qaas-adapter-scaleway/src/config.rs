//! Provider configuration.
//!
//! Supports loading configuration from:
//! 1. A YAML file
//! 2. Environment variables (`SCALEWAY_` prefix)
//! 3. `.env` files
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables
//! 2. Configuration file
//! 3. Default values

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_URL;
use crate::error::{ScalewayError, ScalewayResult};

/// Credentials and connection settings of a Scaleway provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Scaleway project ID.
    #[serde(default)]
    pub project_id: String,

    /// Scaleway secret key (sent as `X-Auth-Token`).
    #[serde(default)]
    pub secret_key: String,

    /// QaaS API root.
    #[serde(default = "default_url")]
    pub url: String,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Delay between job status polls, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("project_id", &self.project_id)
            .field("secret_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

fn default_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    2000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            secret_key: String::new(),
            url: default_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl ProviderConfig {
    /// Configuration with explicit credentials and default settings.
    pub fn new(project_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            secret_key: secret_key.into(),
            ..Self::default()
        }
    }

    /// Override the API root.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ScalewayResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ScalewayError::Config(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        serde_yaml_ng::from_str(&contents)
            .map_err(|e| ScalewayError::Config(format!("invalid configuration file: {e}")))
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> ScalewayResult<Self> {
        let config = Self::default().merge_env_from(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with the following precedence:
    /// 1. Load `.env` file if it exists
    /// 2. Load from file if provided
    /// 3. Apply environment variable overrides
    pub fn load(config_file: Option<&Path>) -> ScalewayResult<Self> {
        dotenvy::dotenv().ok();

        let config = match config_file {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.merge_env_from(|key| std::env::var(key).ok());

        config.validate()?;
        Ok(config)
    }

    /// Overlay variables returned by `lookup`.
    ///
    /// Only variables that are present override the current values;
    /// unparsable numbers are ignored.
    pub fn merge_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SCALEWAY_PROJECT_ID") {
            self.project_id = v;
        }
        if let Some(v) = lookup("SCALEWAY_SECRET_KEY") {
            self.secret_key = v;
        }
        if let Some(v) = lookup("SCALEWAY_API_URL") {
            self.url = v;
        }
        if let Some(val) = lookup("SCALEWAY_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = val;
        }
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> ScalewayResult<()> {
        if self.project_id.trim().is_empty() {
            return Err(ScalewayError::MissingProjectId);
        }
        if self.secret_key.trim().is_empty() {
            return Err(ScalewayError::MissingToken);
        }
        if self.url.trim().is_empty() {
            return Err(ScalewayError::Config("API url must not be empty".into()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ScalewayError::Config(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Delay between job status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ProviderConfig::default();
        assert_eq!(config.url, "https://api.scaleway.com/qaas/v1alpha1");
        assert_eq!(config.request_timeout_secs, 120);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(matches!(
            config.validate(),
            Err(ScalewayError::MissingProjectId)
        ));
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "project_id: from-file\nsecret_key: file-secret\npoll_interval_ms: 500"
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            ("SCALEWAY_PROJECT_ID", "from-env"),
            ("SCALEWAY_POLL_INTERVAL_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ProviderConfig::from_file(file.path())
            .unwrap()
            .merge_env_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.project_id, "from-env");
        assert_eq!(config.secret_key, "file-secret");
        assert_eq!(config.poll_interval_ms, 500);
        assert_eq!(config.url, DEFAULT_API_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "project_id: [unclosed").unwrap();
        assert!(matches!(
            ProviderConfig::from_file(file.path()),
            Err(ScalewayError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let mut config = ProviderConfig::new("p", "s");
        config.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ScalewayError::Config(_))));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProviderConfig::new("p", "super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
