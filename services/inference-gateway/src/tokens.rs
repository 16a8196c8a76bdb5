//! Per-call token resolution
//!
//! The executor re-parses the credential list on every call, so resolution
//! must be fresh too: the `<PROVIDER>_TOKENS` env var is read at call time
//! and wins over the TOML value. Rotating a token in the environment takes
//! effect on the next request, no restart.

use std::collections::HashMap;

use common::Secret;

use crate::config::ProvidersConfig;

/// Resolves the raw comma-separated token list for a provider key.
pub struct TokenSource {
    from_config: HashMap<String, Secret<String>>,
}

impl TokenSource {
    /// Build from the providers section of the config file.
    pub fn from_config(providers: &ProvidersConfig) -> Self {
        let entries = [
            ("pollinations", &providers.pollinations.tokens),
            ("siliconflow", &providers.siliconflow.tokens),
            ("modelscope", &providers.modelscope.tokens),
        ];
        Self {
            from_config: entries
                .into_iter()
                .filter_map(|(key, tokens)| {
                    tokens.as_ref().map(|t| (key.to_string(), t.clone()))
                })
                .collect(),
        }
    }

    /// Build from explicit key/value pairs (tests, embedding).
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            from_config: pairs
                .into_iter()
                .map(|(key, value)| (key, Secret::new(value)))
                .collect(),
        }
    }

    /// The raw token list for a provider, or `None` when nothing is
    /// configured anywhere.
    pub fn resolve(&self, provider_key: &str) -> Option<String> {
        let env_key = format!(
            "{}_TOKENS",
            provider_key.to_uppercase().replace('-', "_")
        );
        if let Ok(value) = std::env::var(&env_key)
            && !value.trim().is_empty()
        {
            return Some(value);
        }
        self.from_config
            .get(provider_key)
            .map(|tokens| tokens.expose().clone())
    }
}
