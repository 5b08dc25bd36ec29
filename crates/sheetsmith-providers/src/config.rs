//! Provider configuration and factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use sheetsmith_core::pipeline::PipelineConfig;
use sheetsmith_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::gemini::GeminiProvider;
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single LLM provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Gemini {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Canned responses; used for offline runs and tests.
    Mock {
        #[serde(default)]
        response: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Gemini {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Gemini")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock { response } => f
                .debug_struct("Mock")
                .field("response", response)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level sheetsmith configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetsmithConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sampling temperature for every stage.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Max tokens per LLM reply.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Upper bound on a single stage call, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Max retries on transient provider errors.
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_timeout() -> u64 {
    60
}
fn default_retry_delay() -> u64 {
    1000
}

impl Default for SheetsmithConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl SheetsmithConfig {
    /// Pipeline settings for `model`, falling back to `default_model`.
    pub fn pipeline_config(&self, model: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            model: model.unwrap_or(&self.default_model).to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            system_prompt_override: None,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    // Substituted values are not rescanned.
    let mut pos = 0;
    while let Some(offset) = result[pos..].find("${") {
        let start = pos + offset;
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
            pos = start + value.len();
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    let opt = |v: &Option<String>| v.as_deref().map(resolve_env_vars);
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: opt(base_url),
            org_id: opt(org_id),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: opt(base_url),
        },
        ProviderConfig::Gemini { api_key, base_url } => ProviderConfig::Gemini {
            api_key: resolve_env_vars(api_key),
            base_url: opt(base_url),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { response } => ProviderConfig::Mock {
            response: response.clone(),
        },
    }
}

/// Overwrite (or insert) provider API keys from environment-style lookups.
///
/// `SHEETSMITH_GEMINI_KEY` wins over `GEMINI_API_KEY` when both are set.
fn apply_key_overrides(config: &mut SheetsmithConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(key) = lookup("SHEETSMITH_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Some(key) = lookup("SHEETSMITH_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Some(key) = lookup("SHEETSMITH_GEMINI_KEY").or_else(|| lookup("GEMINI_API_KEY")) {
        let entry = config
            .providers
            .entry("gemini".into())
            .or_insert(ProviderConfig::Gemini {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Gemini { api_key, .. } = entry {
            *api_key = key;
        }
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `sheetsmith.toml` in the current directory
/// 2. `~/.config/sheetsmith/config.toml`
///
/// Environment variable overrides: `SHEETSMITH_ANTHROPIC_KEY`,
/// `SHEETSMITH_OPENAI_KEY`, `SHEETSMITH_GEMINI_KEY` (or `GEMINI_API_KEY`).
pub fn load_config() -> Result<SheetsmithConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<SheetsmithConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("sheetsmith.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<SheetsmithConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => SheetsmithConfig::default(),
    };

    apply_key_overrides(&mut config, |name| std::env::var(name).ok());

    // Resolve env vars in all provider configs
    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("sheetsmith"))
}

/// Create a provider instance from its configuration.
///
/// `timeout_secs` bounds each HTTP request made by the provider.
pub fn create_provider(
    name: &str,
    config: &ProviderConfig,
    timeout_secs: u64,
) -> Result<Box<dyn LlmProvider>> {
    let require_key = |api_key: &str| -> Result<()> {
        if api_key.trim().is_empty() {
            anyhow::bail!("provider '{name}' has no API key configured");
        }
        Ok(())
    };

    match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            require_key(api_key)?;
            Ok(Box::new(AnthropicProvider::new(
                api_key,
                base_url.clone(),
                timeout_secs,
            )?))
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => {
            require_key(api_key)?;
            Ok(Box::new(OpenAiProvider::new(
                api_key,
                base_url.clone(),
                org_id.clone(),
                timeout_secs,
            )?))
        }
        ProviderConfig::Gemini { api_key, base_url } => {
            require_key(api_key)?;
            Ok(Box::new(GeminiProvider::new(
                api_key,
                base_url.clone(),
                timeout_secs,
            )?))
        }
        ProviderConfig::Ollama { base_url } => {
            Ok(Box::new(OllamaProvider::new(base_url, timeout_secs)?))
        }
        ProviderConfig::Mock { response } => Ok(Box::new(MockProvider::with_fixed_response(
            response.as_deref().unwrap_or("{}"),
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_SHEETSMITH_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_SHEETSMITH_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_SHEETSMITH_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env_vars("unterminated ${"), "unterminated ${");
        std::env::remove_var("_SHEETSMITH_TEST_VAR");
    }

    #[test]
    fn resolve_env_vars_keeps_placeholders_inside_values() {
        std::env::set_var("_SHEETSMITH_SELF_REF", "${_SHEETSMITH_SELF_REF}");
        std::env::set_var("_SHEETSMITH_OTHER_REF", "a${b");
        assert_eq!(
            resolve_env_vars("key=${_SHEETSMITH_SELF_REF}"),
            "key=${_SHEETSMITH_SELF_REF}"
        );
        assert_eq!(
            resolve_env_vars("${_SHEETSMITH_OTHER_REF}}-${_SHEETSMITH_OTHER_REF}"),
            "a${b}-a${b"
        );
        std::env::remove_var("_SHEETSMITH_SELF_REF");
        std::env::remove_var("_SHEETSMITH_OTHER_REF");
    }

    #[test]
    fn default_config() {
        let config = SheetsmithConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.default_model, "gemini-2.0-flash");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_retries, 0);
    }

    #[test]
    fn parse_provider_config() {
        let toml_str = r#"
default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
max_retries = 2

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.gemini]
type = "gemini"
api_key = "g-test"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"
"#;
        let config: SheetsmithConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.timeout_secs, 60);
        assert!(matches!(
            config.providers.get("gemini"),
            Some(ProviderConfig::Gemini { .. })
        ));
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::Gemini {
            api_key: "super-secret".into(),
            base_url: None,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("***"));
    }

    #[test]
    fn key_overrides_prefer_sheetsmith_variable() {
        let mut config = SheetsmithConfig::default();
        let env: HashMap<&str, &str> = [
            ("SHEETSMITH_GEMINI_KEY", "from-sheetsmith"),
            ("GEMINI_API_KEY", "from-gemini"),
            ("SHEETSMITH_OPENAI_KEY", "sk-openai"),
        ]
        .into_iter()
        .collect();

        apply_key_overrides(&mut config, |name| env.get(name).map(|v| v.to_string()));

        match config.providers.get("gemini") {
            Some(ProviderConfig::Gemini { api_key, .. }) => assert_eq!(api_key, "from-sheetsmith"),
            other => panic!("unexpected gemini config: {other:?}"),
        }
        assert!(config.providers.contains_key("openai"));
        assert!(!config.providers.contains_key("anthropic"));
    }

    #[test]
    fn gemini_api_key_fallback() {
        let mut config = SheetsmithConfig::default();
        apply_key_overrides(&mut config, |name| {
            (name == "GEMINI_API_KEY").then(|| "legacy".to_string())
        });
        assert!(matches!(
            config.providers.get("gemini"),
            Some(ProviderConfig::Gemini { api_key, .. }) if api_key == "legacy"
        ));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheetsmith.toml");
        std::fs::write(
            &path,
            "default_provider = \"mock\"\ntimeout_secs = 5\n\n[providers.mock]\ntype = \"mock\"\n",
        )
        .unwrap();

        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_provider, "mock");
        assert_eq!(config.timeout_secs, 5);

        let pipeline = config.pipeline_config(Some("other-model"));
        assert_eq!(pipeline.model, "other-model");
        assert_eq!(pipeline.timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/sheetsmith.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn create_provider_requires_api_key() {
        let config = ProviderConfig::Anthropic {
            api_key: "  ".into(),
            base_url: None,
        };
        let err = create_provider("anthropic", &config, 30).err().unwrap();
        assert!(err.to_string().contains("no API key"));

        let mock = create_provider("mock", &ProviderConfig::Mock { response: None }, 30).unwrap();
        assert_eq!(mock.name(), "mock");
    }
}
