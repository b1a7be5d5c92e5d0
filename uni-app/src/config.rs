//! unillm configuration loader.
//!
//! Built-in profiles, then `~/.unillm/config.toml`, then environment variables
//! (`<ID>_API_KEY`, `<ID>_BASE_URL`, ... and `DEFAULT_LLM_PROVIDER`).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uni_llm::{AdapterKind, ConnectionProfile, ProviderRegistry};

const DEFAULT_PROVIDER: &str = "gemini";
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

struct BuiltinProvider {
    id: &'static str,
    adapter: AdapterKind,
    base_url: &'static str,
    model: &'static str,
}

const BUILTIN_PROVIDERS: &[BuiltinProvider] = &[
    BuiltinProvider {
        id: "openai",
        adapter: AdapterKind::OpenAi,
        base_url: "https://api.openai.com/v1",
        model: "gpt-3.5-turbo",
    },
    BuiltinProvider {
        id: "claude",
        adapter: AdapterKind::Claude,
        base_url: "https://api.anthropic.com",
        model: "claude-3-sonnet-20240229",
    },
    BuiltinProvider {
        id: "qwen",
        adapter: AdapterKind::Qwen,
        base_url: "https://dashscope.aliyuncs.com/api/v1",
        model: "qwen-turbo",
    },
    BuiltinProvider {
        id: "zhipu",
        adapter: AdapterKind::Zhipu,
        base_url: "https://open.bigmodel.cn/api/paas/v4",
        model: "glm-4",
    },
    BuiltinProvider {
        id: "gemini",
        adapter: AdapterKind::Gemini,
        base_url: "https://generativelanguage.googleapis.com/v1beta",
        model: "gemini-1.5-flash",
    },
];

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UniConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_provider")]
    pub default_provider: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
        }
    }
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

#[derive(Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// Wire format: openai, claude, qwen, zhipu or gemini. Defaults to the id
    /// for built-in providers.
    #[serde(default)]
    pub adapter: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("adapter", &self.adapter)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl UniConfig {
    /// An explicit `path` must exist; the default path is optional.
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let explicit = path.is_some();
        let path = path.unwrap_or_else(default_config_path);

        let mut cfg = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?,
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using built-in profiles");
                Self::default()
            }
            Err(e) => return Err(anyhow::anyhow!("read config {}: {e}", path.display())),
        };

        cfg.fill_builtin_defaults();
        cfg.apply_env_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn fill_builtin_defaults(&mut self) {
        for builtin in BUILTIN_PROVIDERS {
            let entry = self.providers.entry(builtin.id.to_string()).or_default();
            if entry.adapter.is_none() {
                entry.adapter = Some(builtin.adapter.as_str().to_string());
            }
            if entry.base_url.is_none() {
                entry.base_url = Some(builtin.base_url.to_string());
            }
            if entry.model.is_none() {
                entry.model = Some(builtin.model.to_string());
            }
        }
    }

    fn apply_env_overrides<F>(&mut self, env: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = lookup("DEFAULT_LLM_PROVIDER") {
            self.general.default_provider = v.trim().to_string();
        }

        for (id, provider) in self.providers.iter_mut() {
            let prefix = env_prefix(id);
            if let Some(v) = lookup(&format!("{prefix}_API_KEY")) {
                provider.api_key = Some(v);
            }
            if let Some(v) = lookup(&format!("{prefix}_BASE_URL")) {
                provider.base_url = Some(v);
            }
            if let Some(v) = lookup(&format!("{prefix}_MODEL")) {
                provider.model = Some(v);
            }
            if let Some(v) = lookup(&format!("{prefix}_MAX_TOKENS")) {
                provider.max_tokens = Some(parse_env(&prefix, "MAX_TOKENS", &v)?);
            }
            if let Some(v) = lookup(&format!("{prefix}_TEMPERATURE")) {
                provider.temperature = Some(parse_env(&prefix, "TEMPERATURE", &v)?);
            }
            if let Some(v) = lookup(&format!("{prefix}_TIMEOUT")) {
                provider.timeout_secs = Some(parse_env(&prefix, "TIMEOUT", &v)?);
            }
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !self.providers.contains_key(&self.general.default_provider) {
            return Err(anyhow::anyhow!(
                "general.default_provider {:?} is not a configured provider",
                self.general.default_provider
            ));
        }
        for (id, p) in &self.providers {
            let adapter = p.adapter.as_deref().unwrap_or(id);
            adapter
                .parse::<AdapterKind>()
                .map_err(|e| anyhow::anyhow!("providers.{id}: {e}"))?;
            if p.base_url.as_deref().is_none_or(|s| s.trim().is_empty()) {
                return Err(anyhow::anyhow!("providers.{id}.base_url is required"));
            }
            if p.model.as_deref().is_none_or(|s| s.trim().is_empty()) {
                return Err(anyhow::anyhow!("providers.{id}.model is required"));
            }
            if p.temperature.is_some_and(|t| !t.is_finite()) {
                return Err(anyhow::anyhow!("providers.{id}.temperature must be finite"));
            }
            if p.timeout_secs == Some(0) {
                return Err(anyhow::anyhow!("providers.{id}.timeout_secs must be > 0"));
            }
        }
        Ok(())
    }

    /// Builds the read-only registry. Providers without a key are kept so that
    /// resolving them reports the missing credential.
    pub fn build_registry(&self) -> anyhow::Result<ProviderRegistry> {
        let mut registry = ProviderRegistry::new(self.general.default_provider.clone());
        for (id, p) in &self.providers {
            let adapter: AdapterKind = p.adapter.as_deref().unwrap_or(id).parse()?;
            let mut profile = ConnectionProfile::new(
                id.clone(),
                adapter,
                p.base_url.clone().unwrap_or_default(),
                p.model.clone().unwrap_or_default(),
            )
            .with_max_output_tokens(p.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS))
            .with_temperature(p.temperature.unwrap_or(DEFAULT_TEMPERATURE))
            .with_timeout(Duration::from_secs(
                p.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ));
            if let Some(key) = &p.api_key {
                profile = profile.with_credential(key.clone());
            }
            registry = registry.with_profile(profile);
        }
        Ok(registry)
    }
}

fn env_prefix(id: &str) -> String {
    id.to_ascii_uppercase().replace('-', "_")
}

fn parse_env<T>(prefix: &str, suffix: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{prefix}_{suffix}={raw:?}: {e}"))
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".unillm").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn builtin_config() -> UniConfig {
        let mut cfg = UniConfig::default();
        cfg.fill_builtin_defaults();
        cfg
    }

    #[test]
    fn builtins_match_known_defaults() {
        let cfg = builtin_config();
        cfg.validate().expect("builtins validate");
        assert_eq!(cfg.general.default_provider, "gemini");
        let ids: Vec<_> = cfg.providers.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["claude", "gemini", "openai", "qwen", "zhipu"]);

        let registry = cfg.build_registry().expect("registry builds");
        let statuses = registry.statuses();
        assert!(statuses.iter().all(|s| !s.configured));
        let qwen = statuses
            .iter()
            .find(|s| s.provider_id == "qwen")
            .expect("qwen listed");
        assert_eq!(qwen.model_name, "qwen-turbo");
        assert_eq!(qwen.adapter, AdapterKind::Qwen);
    }

    #[test]
    fn env_overrides_fill_credentials_and_defaults() {
        let mut cfg = builtin_config();
        cfg.apply_env_overrides(env(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("OPENAI_MODEL", "gpt-4o-mini"),
            ("OPENAI_MAX_TOKENS", "512"),
            ("OPENAI_TEMPERATURE", "0.25"),
            ("OPENAI_TIMEOUT", "12"),
            ("CLAUDE_API_KEY", "   "),
            ("DEFAULT_LLM_PROVIDER", "openai"),
        ]))
        .expect("overrides apply");
        cfg.validate().expect("valid");

        let registry = cfg.build_registry().expect("registry builds");
        let p = registry.resolve(None).expect("default resolves");
        assert_eq!(p.provider_id(), "openai");
        assert_eq!(p.credential(), "sk-env");
        assert_eq!(p.model_name(), "gpt-4o-mini");
        assert_eq!(p.max_output_tokens(), 512);
        assert_eq!(p.temperature(), 0.25);
        assert_eq!(p.timeout(), Duration::from_secs(12));

        assert!(!registry.is_configured(Some("claude")));
    }

    #[test]
    fn unparseable_env_number_is_an_error() {
        let mut cfg = builtin_config();
        let err = cfg
            .apply_env_overrides(env(&[("GEMINI_MAX_TOKENS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("GEMINI_MAX_TOKENS"));
    }

    #[test]
    fn custom_provider_reuses_an_adapter_family() {
        let mut cfg = UniConfig::parse(
            r#"
            [general]
            default_provider = "deepseek"

            [providers.deepseek]
            adapter = "openai"
            base_url = "https://api.deepseek.com/v1"
            model = "deepseek-chat"
            "#,
        )
        .expect("parses");
        cfg.fill_builtin_defaults();
        cfg.apply_env_overrides(env(&[("DEEPSEEK_API_KEY", "ds-key")]))
            .expect("overrides apply");
        cfg.validate().expect("valid");

        let registry = cfg.build_registry().expect("registry builds");
        let p = registry.resolve(None).expect("resolves");
        assert_eq!(p.adapter(), AdapterKind::OpenAi);
        assert_eq!(p.base_endpoint(), "https://api.deepseek.com/v1");
        assert_eq!(p.max_output_tokens(), DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn unknown_adapter_family_is_rejected() {
        let mut cfg = UniConfig::parse(
            r#"
            [providers.mistral]
            base_url = "https://api.mistral.ai/v1"
            model = "mistral-small"
            "#,
        )
        .expect("parses");
        cfg.fill_builtin_defaults();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("mistral"));
    }

    #[test]
    fn default_provider_must_exist() {
        let mut cfg = builtin_config();
        cfg.general.default_provider = "nope".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_api_keys() {
        let cfg = UniConfig::parse(
            r#"
            [providers.openai]
            api_key = "sk-secret"
            "#,
        )
        .expect("parses");
        assert!(!format!("{cfg:?}").contains("sk-secret"));
    }

    #[tokio::test]
    async fn load_reads_explicit_file_and_fails_when_missing() {
        let dir = std::env::temp_dir().join(format!("unillm-config-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
            [general]
            default_provider = "zhipu"

            [providers.zhipu]
            model = "glm-4-flash"
            max_tokens = 1024
            "#,
        )
        .expect("write config");

        let cfg = UniConfig::load(Some(path.clone())).await.expect("loads");
        let zhipu = cfg.providers.get("zhipu").expect("zhipu present");
        assert_eq!(zhipu.model.as_deref(), Some("glm-4-flash"));
        assert_eq!(zhipu.max_tokens, Some(1024));
        assert_eq!(
            zhipu.base_url.as_deref(),
            Some("https://open.bigmodel.cn/api/paas/v4")
        );

        let missing = UniConfig::load(Some(dir.join("absent.toml"))).await;
        assert!(missing.is_err());

        let _ = std::fs::remove_dir_all(dir);
    }
}
