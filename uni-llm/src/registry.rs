use crate::adapter::AdapterKind;
use crate::error::{LlmError, Result};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4000;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

static GLOBAL_REGISTRY: OnceLock<ProviderRegistry> = OnceLock::new();

/// Everything needed to talk to one provider endpoint.
///
/// Built with the `with_*` methods and then handed to a [`ProviderRegistry`];
/// the registry only ever hands out shared references.
#[derive(Debug)]
pub struct ConnectionProfile {
    provider_id: String,
    adapter: AdapterKind,
    credential: Option<SecretString>,
    base_endpoint: String,
    model_name: String,
    max_output_tokens: u32,
    temperature: f64,
    timeout: Duration,
}

impl ConnectionProfile {
    pub fn new(
        provider_id: impl Into<String>,
        adapter: AdapterKind,
        base_endpoint: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        let base_endpoint: String = base_endpoint.into();
        Self {
            provider_id: provider_id.into(),
            adapter,
            credential: None,
            base_endpoint: base_endpoint.trim_end_matches('/').to_string(),
            model_name: model_name.into(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        let credential: String = credential.into();
        self.credential = Some(SecretString::from(credential));
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn adapter(&self) -> AdapterKind {
        self.adapter
    }

    /// Empty string when no credential was configured.
    pub fn credential(&self) -> &str {
        self.credential
            .as_ref()
            .map(|c| c.expose_secret())
            .unwrap_or_default()
    }

    pub fn has_credential(&self) -> bool {
        !self.credential().trim().is_empty()
    }

    pub fn base_endpoint(&self) -> &str {
        &self.base_endpoint
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub provider_id: String,
    pub adapter: AdapterKind,
    pub model_name: String,
    pub configured: bool,
    pub is_default: bool,
}

/// Read-only map from provider id to [`ConnectionProfile`].
#[derive(Debug)]
pub struct ProviderRegistry {
    profiles: BTreeMap<String, ConnectionProfile>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            profiles: BTreeMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Adds a profile, replacing any earlier one with the same id.
    pub fn with_profile(mut self, profile: ConnectionProfile) -> Self {
        self.profiles.insert(profile.provider_id.clone(), profile);
        self
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    /// Resolves `provider_id`, or the default provider when `None`.
    ///
    /// A profile without a usable credential is never returned.
    pub fn resolve(&self, provider_id: Option<&str>) -> Result<&ConnectionProfile> {
        let id = provider_id.unwrap_or(&self.default_provider);
        let profile = self
            .profiles
            .get(id)
            .ok_or_else(|| LlmError::UnknownProvider(id.to_string()))?;
        if !profile.has_credential() {
            return Err(LlmError::MissingCredential(id.to_string()));
        }
        Ok(profile)
    }

    pub fn is_configured(&self, provider_id: Option<&str>) -> bool {
        self.resolve(provider_id).is_ok()
    }

    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.profiles
            .values()
            .map(|p| ProviderStatus {
                provider_id: p.provider_id.clone(),
                adapter: p.adapter,
                model_name: p.model_name.clone(),
                configured: p.has_credential(),
                is_default: p.provider_id == self.default_provider,
            })
            .collect()
    }

    /// Installs this registry as the process-wide one. Only the first call succeeds.
    pub fn install(self) -> Result<&'static ProviderRegistry> {
        GLOBAL_REGISTRY.set(self).map_err(|_| {
            LlmError::InvalidInput("provider registry already installed".to_string())
        })?;
        let installed = Self::global().ok_or(LlmError::RegistryUninitialized)?;
        tracing::debug!(
            default_provider = %installed.default_provider,
            providers = installed.profiles.len(),
            "provider registry installed"
        );
        Ok(installed)
    }

    pub fn global() -> Option<&'static ProviderRegistry> {
        GLOBAL_REGISTRY.get()
    }
}
