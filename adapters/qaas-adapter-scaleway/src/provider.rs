//! Backend discovery.
//!
//! [`ScalewayProvider`] lists the platforms of a project and wraps each one
//! whose execution engine it knows in a [`QaasBackend`].

use std::sync::Arc;
use std::time::Duration;

use qaas_hal::{
    BackendInfo, BackendVariant, HalError, HalResult, PlatformFilter, QaasBackend, QaasClient,
};
use rustc_hash::FxHashMap;
use tracing::{debug, instrument};

use crate::aer::AerVariant;
use crate::api::ScalewayClient;
use crate::config::ProviderConfig;
use crate::error::ScalewayResult;
use crate::qsim::QsimVariant;

/// Entry point to the Scaleway QaaS platforms of one project.
pub struct ScalewayProvider {
    client: Arc<dyn QaasClient>,
    variants: FxHashMap<&'static str, Arc<dyn BackendVariant>>,
    poll_interval: Duration,
}

impl std::fmt::Debug for ScalewayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.variants.keys().collect();
        kinds.sort();
        f.debug_struct("ScalewayProvider")
            .field("variants", &kinds)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl ScalewayProvider {
    /// Create a provider talking HTTP to the API described by `config`.
    pub fn new(config: &ProviderConfig) -> ScalewayResult<Self> {
        config.validate()?;
        let client = ScalewayClient::from_config(config)?;
        Ok(Self::from_client(Arc::new(client), config.poll_interval()))
    }

    /// Create a provider from environment variables and `.env`.
    pub fn from_env() -> ScalewayResult<Self> {
        Self::new(&ProviderConfig::load(None)?)
    }

    /// Create a provider over any [`QaasClient`].
    pub fn from_client(client: Arc<dyn QaasClient>, poll_interval: Duration) -> Self {
        let mut variants: FxHashMap<&'static str, Arc<dyn BackendVariant>> =
            FxHashMap::default();
        for variant in [
            Arc::new(AerVariant) as Arc<dyn BackendVariant>,
            Arc::new(QsimVariant),
        ] {
            variants.insert(variant.kind(), variant);
        }
        Self {
            client,
            variants,
            poll_interval,
        }
    }

    /// Backend kinds this provider can wrap.
    pub fn supported_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.variants.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// List the backends matching `filter`.
    ///
    /// Platforms running an unsupported engine are skipped.
    #[instrument(skip(self))]
    pub async fn backends(&self, filter: &PlatformFilter) -> HalResult<Vec<QaasBackend>> {
        let platforms = self.client.list_platforms(filter).await?;

        let mut backends = Vec::with_capacity(platforms.len());
        for platform in platforms {
            let Some(variant) = self.variants.get(platform.backend_name.as_str()) else {
                debug!(
                    "Skipping platform '{}' with unsupported engine '{}'",
                    platform.name, platform.backend_name
                );
                continue;
            };
            let backend = QaasBackend::new(
                BackendInfo::from(platform),
                variant.clone(),
                self.client.clone(),
            )
            .with_poll_interval(self.poll_interval);
            backends.push(backend);
        }
        Ok(backends)
    }

    /// Look up a single backend by platform name.
    ///
    /// Fails with [`HalError::BackendNotFound`] unless exactly one supported
    /// platform carries `name`.
    pub async fn get_backend(&self, name: &str) -> HalResult<QaasBackend> {
        let mut found = self.backends(&PlatformFilter::by_name(name)).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(HalError::BackendNotFound(name.to_string())),
            n => Err(HalError::BackendNotFound(format!(
                "{name} ({n} platforms match, expected exactly one)"
            ))),
        }
    }
}
