//! Completion provider registry.
//!
//! The set of providers is closed: [`Provider`] is an enum, and every
//! variant has a built-in entry (credential variable, endpoint, model).
//! `[providers.<id>]` config sections may override the model or endpoint.
//!
//! | id | credential | base URL | model |
//! |----|------------|----------|-------|
//! | `openai` | `OPENAI_API_KEY` | `https://api.openai.com/v1` | `gpt-4.1-mini` |
//! | `groq` | `GROQ_API_KEY` | `https://api.groq.com/openai/v1` | `llama-3.3-70b-versatile` |
//! | `deepseek` | `DEEPSEEK_API_KEY` | `https://api.deepseek.com/v1` | `deepseek-chat` |

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ProviderOverride;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Groq,
    DeepSeek,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::Groq, Provider::DeepSeek];

    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Groq => "groq",
            Provider::DeepSeek => "deepseek",
        }
    }

    fn defaults(self) -> ProviderEntry {
        match self {
            Provider::OpenAi => ProviderEntry {
                api_key_env: "OPENAI_API_KEY",
                base_url: "https://api.openai.com/v1",
                model: "gpt-4.1-mini",
            },
            Provider::Groq => ProviderEntry {
                api_key_env: "GROQ_API_KEY",
                base_url: "https://api.groq.com/openai/v1",
                model: "llama-3.3-70b-versatile",
            },
            Provider::DeepSeek => ProviderEntry {
                api_key_env: "DEEPSEEK_API_KEY",
                base_url: "https://api.deepseek.com/v1",
                model: "deepseek-chat",
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "groq" => Ok(Provider::Groq),
            "deepseek" => Ok(Provider::DeepSeek),
            other => Err(Error::validation(format!(
                "unknown provider '{}'; expected one of openai, groq, deepseek",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ProviderEntry {
    api_key_env: &'static str,
    base_url: &'static str,
    model: &'static str,
}

/// Everything needed to call one provider.
#[derive(Clone)]
pub struct ClientConfig {
    pub provider: Provider,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// Resolves a [`Provider`] to a [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    overrides: HashMap<Provider, ProviderOverride>,
    api_keys: HashMap<Provider, String>,
}

impl ProviderRegistry {
    /// Build from `[providers.<id>]` sections. Unknown ids are rejected.
    pub fn from_overrides(overrides: &HashMap<String, ProviderOverride>) -> Result<Self> {
        let mut parsed = HashMap::new();
        for (name, value) in overrides {
            let provider: Provider = name
                .parse()
                .map_err(|_| Error::config(format!("unknown completion provider: '{}'", name)))?;
            parsed.insert(provider, value.clone());
        }
        Ok(Self {
            overrides: parsed,
            api_keys: HashMap::new(),
        })
    }

    /// Use `api_key` for `provider` instead of reading its environment variable.
    #[must_use]
    pub fn with_api_key(mut self, provider: Provider, api_key: impl Into<String>) -> Self {
        self.api_keys.insert(provider, api_key.into());
        self
    }

    /// Endpoint and model for `provider`, without touching credentials.
    pub fn endpoint(&self, provider: Provider) -> (String, String) {
        let entry = provider.defaults();
        let overrides = self.overrides.get(&provider);
        let base_url = overrides
            .and_then(|o| o.base_url.clone())
            .unwrap_or_else(|| entry.base_url.to_string());
        let model = overrides
            .and_then(|o| o.model.clone())
            .unwrap_or_else(|| entry.model.to_string());
        (base_url, model)
    }

    /// Full client configuration. Fails if the credential is unset or empty.
    pub fn resolve(&self, provider: Provider) -> Result<ClientConfig> {
        self.resolve_with(provider, |name| std::env::var(name).ok())
    }

    fn resolve_with(
        &self,
        provider: Provider,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ClientConfig> {
        let env = provider.defaults().api_key_env;
        let api_key = self
            .api_keys
            .get(&provider)
            .cloned()
            .or_else(|| lookup(env))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::config(format!("missing API key: {} is not set", env)))?;
        let (base_url, model) = self.endpoint(provider);
        Ok(ClientConfig {
            provider,
            api_key,
            base_url,
            model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for provider in Provider::ALL {
            assert_eq!(provider.to_string().parse::<Provider>().unwrap(), provider);
        }
        assert_eq!("GROQ".parse::<Provider>().unwrap(), Provider::Groq);
        assert!("anthropic".parse::<Provider>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let p: Provider = serde_json::from_str("\"deepseek\"").unwrap();
        assert_eq!(p, Provider::DeepSeek);
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"openai\"");
    }

    #[test]
    fn test_missing_credential_is_configuration_error() {
        let registry = ProviderRegistry::default();
        let err = registry.resolve_with(Provider::Groq, |_| None).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("GROQ_API_KEY"));

        let err = registry
            .resolve_with(Provider::Groq, |_| Some("  ".into()))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_defaults_and_overrides() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "deepseek".to_string(),
            ProviderOverride {
                model: Some("deepseek-reasoner".into()),
                base_url: None,
            },
        );
        let registry = ProviderRegistry::from_overrides(&overrides).unwrap();
        let lookup = |name: &str| Some(format!("key-for-{}", name));

        let groq = registry.resolve_with(Provider::Groq, lookup).unwrap();
        assert_eq!(groq.base_url, "https://api.groq.com/openai/v1");
        assert_eq!(groq.model, "llama-3.3-70b-versatile");
        assert_eq!(groq.api_key, "key-for-GROQ_API_KEY");

        let deepseek = registry.resolve_with(Provider::DeepSeek, lookup).unwrap();
        assert_eq!(deepseek.model, "deepseek-reasoner");
        assert_eq!(deepseek.base_url, "https://api.deepseek.com/v1");
        assert!(!format!("{:?}", deepseek).contains("key-for"));
    }

    #[test]
    fn test_explicit_key_wins() {
        let registry = ProviderRegistry::default().with_api_key(Provider::OpenAi, "explicit");
        let client = registry.resolve_with(Provider::OpenAi, |_| None).unwrap();
        assert_eq!(client.api_key, "explicit");
        assert_eq!(client.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_unknown_override_rejected() {
        let mut overrides = HashMap::new();
        overrides.insert("mistral".to_string(), ProviderOverride::default());
        assert!(ProviderRegistry::from_overrides(&overrides).is_err());
    }
}
