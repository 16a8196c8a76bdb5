//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Provider token lists may live in the TOML, but the per-provider
//! `<PROVIDER>_TOKENS` env var always wins and is re-read on every call
//! (see `tokens.rs`), so the TOML value is just the fallback.

use common::Secret;
use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// HTTP gateway settings
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// Directory holding the per-provider exhaustion records.
    pub state_dir: PathBuf,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Per-provider settings. Everything is optional: an unset provider simply
/// has no tokens and no base URL override.
#[derive(Debug, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub pollinations: ProviderSettings,
    #[serde(default)]
    pub siliconflow: ProviderSettings,
    #[serde(default)]
    pub modelscope: ProviderSettings,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderSettings {
    /// Comma-separated token list. Wrapped in `Secret` at parse time so an
    /// accidental debug print of the config cannot leak credentials.
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub tokens: Option<Secret<String>>,
    /// Override the provider's default API base URL (tests, regional
    /// endpoints).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(Secret::new))
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        if config.gateway.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.gateway.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        for (name, settings) in [
            ("pollinations", &config.providers.pollinations),
            ("siliconflow", &config.providers.siliconflow),
            ("modelscope", &config.providers.modelscope),
        ] {
            if let Some(base_url) = &settings.base_url
                && !base_url.starts_with("http://")
                && !base_url.starts_with("https://")
            {
                return Err(common::Error::Config(format!(
                    "providers.{name}.base_url must start with http:// or https://, got: {base_url}"
                )));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("inference-gateway.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn valid_toml() -> &'static str {
        r#"
[gateway]
listen_addr = "127.0.0.1:8080"
state_dir = "/var/lib/inference-gateway"

[providers.siliconflow]
tokens = "sk-one,sk-two"

[providers.modelscope]
base_url = "https://api-inference.modelscope.cn"
"#
    }

    #[test]
    fn load_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.gateway.timeout_secs, 60);
        assert_eq!(config.gateway.max_connections, 1000);
        assert_eq!(
            config
                .providers
                .siliconflow
                .tokens
                .as_ref()
                .unwrap()
                .expose(),
            "sk-one,sk-two"
        );
        assert!(config.providers.pollinations.tokens.is_none());
        assert_eq!(
            config.providers.modelscope.base_url.as_deref(),
            Some("https://api-inference.modelscope.cn")
        );
    }

    #[test]
    fn tokens_are_redacted_in_debug_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, valid_toml()).unwrap();

        let config = Config::load(&path).unwrap();
        let debug = format!("{config:?}");
        assert!(
            !debug.contains("sk-one"),
            "token values must never appear in Debug output"
        );
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(Config::load(Path::new("/nonexistent/config.toml")).is_err());
    }

    #[test]
    fn load_invalid_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{{{ toml").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[gateway]
listen_addr = "127.0.0.1:8080"
state_dir = "/tmp"
timeout_secs = 0
"#,
        )
        .unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn zero_max_connections_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[gateway]
listen_addr = "127.0.0.1:8080"
state_dir = "/tmp"
max_connections = 0
"#,
        )
        .unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn schemeless_base_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[gateway]
listen_addr = "127.0.0.1:8080"
state_dir = "/tmp"

[providers.siliconflow]
base_url = "api.siliconflow.cn"
"#,
        )
        .unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(
            err.to_string().contains("base_url must start with http"),
            "got: {err}"
        );
    }

    #[test]
    fn resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(path, PathBuf::from("/cli/wins.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        assert_eq!(
            Config::resolve_path(None),
            PathBuf::from("inference-gateway.toml")
        );
    }
}
