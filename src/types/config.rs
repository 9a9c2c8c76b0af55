//! Configuration structures.
//!
//! Configuration is loaded from JSON config files and environment variables.
//! Every section has a usable `Default`, so an empty document is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use super::errors::{Error, Result};

/// Environment variable overriding [`DispatchConfig::remote_timeout`] (milliseconds).
pub const ENV_REMOTE_TIMEOUT_MS: &str = "TOOLDOCK_REMOTE_TIMEOUT_MS";
/// Environment variable overriding [`DispatchConfig::local_timeout`] (milliseconds).
pub const ENV_LOCAL_TIMEOUT_MS: &str = "TOOLDOCK_LOCAL_TIMEOUT_MS";
/// Environment variable overriding [`RegistryConfig::duplicate_policy`] (`reject`|`replace`).
pub const ENV_DUPLICATE_POLICY: &str = "TOOLDOCK_DUPLICATE_POLICY";
/// Environment variable overriding [`CredentialCacheConfig::ttl`] (seconds).
pub const ENV_CREDENTIAL_TTL_SECS: &str = "TOOLDOCK_CREDENTIAL_TTL_SECS";

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Dispatcher configuration.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Credential cache configuration.
    #[serde(default)]
    pub credentials: CredentialCacheConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Parse a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Apply `TOOLDOCK_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_REMOTE_TIMEOUT_MS) {
            self.dispatch.remote_timeout = Duration::from_millis(parse_u64(ENV_REMOTE_TIMEOUT_MS, &raw)?);
        }
        if let Some(raw) = lookup(ENV_LOCAL_TIMEOUT_MS) {
            self.dispatch.local_timeout =
                Some(Duration::from_millis(parse_u64(ENV_LOCAL_TIMEOUT_MS, &raw)?));
        }
        if let Some(raw) = lookup(ENV_DUPLICATE_POLICY) {
            self.registry.duplicate_policy = match raw.trim().to_ascii_lowercase().as_str() {
                "reject" => DuplicatePolicy::Reject,
                "replace" => DuplicatePolicy::Replace,
                other => {
                    return Err(Error::config(format!(
                        "{}: expected 'reject' or 'replace', got '{}'",
                        ENV_DUPLICATE_POLICY, other
                    )))
                }
            };
        }
        if let Some(raw) = lookup(ENV_CREDENTIAL_TTL_SECS) {
            self.credentials.ttl = Duration::from_secs(parse_u64(ENV_CREDENTIAL_TTL_SECS, &raw)?);
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the dispatcher cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.remote_timeout.is_zero() {
            return Err(Error::config("dispatch.remote_timeout must be positive"));
        }
        if matches!(self.dispatch.local_timeout, Some(t) if t.is_zero()) {
            return Err(Error::config("dispatch.local_timeout must be positive when set"));
        }
        if self.dispatch.max_error_message_len == 0 {
            return Err(Error::config("dispatch.max_error_message_len must be positive"));
        }
        Ok(())
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| Error::config(format!("{}: invalid integer '{}': {}", key, raw, e)))
}

/// Dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on every remote-proxy call.
    #[serde(with = "humantime_serde")]
    pub remote_timeout: Duration,

    /// Optional bound on waiting for a local handler. Handlers are not
    /// force-killed when it elapses; the dispatcher stops waiting.
    #[serde(with = "humantime_serde")]
    pub local_timeout: Option<Duration>,

    /// Maximum length of `error.message` in returned envelopes.
    pub max_error_message_len: usize,

    /// User-Agent sent on remote-proxy calls.
    pub user_agent: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(30),
            local_timeout: None,
            max_error_message_len: 512,
            user_agent: concat!("tooldock/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// What `register` does when the tool id is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with a duplicate-tool error; the existing descriptor stays.
    #[default]
    Reject,
    /// Swap in the new descriptor atomically, keeping its listing position.
    Replace,
}

/// Registry configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub duplicate_policy: DuplicatePolicy,
}

/// Credential cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialCacheConfig {
    /// Wrap the resolver in a single-flight cache.
    pub enabled: bool,

    /// How long a resolved credential is reused (capped by its own expiry).
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_json_str("{}").unwrap();
        assert_eq!(config.dispatch.remote_timeout, Duration::from_secs(30));
        assert_eq!(config.registry.duplicate_policy, DuplicatePolicy::Reject);
        assert!(config.credentials.enabled);
    }

    #[test]
    fn test_humantime_durations() {
        let config = Config::from_json_str(
            r#"{"dispatch": {"remote_timeout": "1s 500ms", "local_timeout": "2m"},
                "registry": {"duplicate_policy": "replace"}}"#,
        )
        .unwrap();
        assert_eq!(config.dispatch.remote_timeout, Duration::from_millis(1500));
        assert_eq!(config.dispatch.local_timeout, Some(Duration::from_secs(120)));
        assert_eq!(config.registry.duplicate_policy, DuplicatePolicy::Replace);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = Config::from_json_str(r#"{"dispatch": {"remote_timeout": "0s"}}"#).unwrap_err();
        assert!(err.to_string().contains("remote_timeout"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_REMOTE_TIMEOUT_MS, "250"),
            (ENV_DUPLICATE_POLICY, "Replace"),
            (ENV_CREDENTIAL_TTL_SECS, "5"),
        ]
        .into_iter()
        .collect();

        let config = Config::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.dispatch.remote_timeout, Duration::from_millis(250));
        assert_eq!(config.registry.duplicate_policy, DuplicatePolicy::Replace);
        assert_eq!(config.credentials.ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let result = Config::default().with_overrides(|k| {
            (k == ENV_DUPLICATE_POLICY).then(|| "sometimes".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"observability": {{"json_logs": true}}}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.observability.json_logs);
        assert_eq!(config.observability.log_level, "info");
    }
}
