//! Client configuration.
//!
//! Configuration is captured once by [`Client::new`](crate::Client::new) and
//! never consulted again from global state.

use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transcoder::ValueType;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11211;
pub const DEFAULT_POOL_SIZE: usize = 10;
pub const DEFAULT_POOL_MAX_OVERFLOW: usize = 10;
/// Per-call socket read/write timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_CHECKOUT_TIMEOUT_MS: u64 = 5000;

const CONFIG_FILE: &str = "cinder.toml";
const ENV_PREFIX: &str = "CINDER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    None,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub auth_method: AuthMethod,
    pub username: String,
    pub password: String,
    pub pool_size: usize,
    /// Transient connections allowed beyond `pool_size` under load.
    pub pool_max_overflow: usize,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// How long a call waits for a free connection.
    pub checkout_timeout_ms: u64,
    /// Prefix applied to every key as `<namespace>:<key>`.
    pub namespace: Option<String>,
    pub value_type: ValueType,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            auth_method: AuthMethod::None,
            username: String::new(),
            password: String::new(),
            pool_size: DEFAULT_POOL_SIZE,
            pool_max_overflow: DEFAULT_POOL_MAX_OVERFLOW,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            checkout_timeout_ms: DEFAULT_CHECKOUT_TIMEOUT_MS,
            namespace: None,
            value_type: ValueType::Json,
        }
    }
}

impl Config {
    /// Defaults, then `cinder.toml` in the working directory, then `CINDER_*`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be at least 1".into()));
        }
        if self.auth_method == AuthMethod::Plain && self.username.is_empty() {
            return Err(ConfigError::Invalid(
                "auth_method = plain requires a username".into(),
            ));
        }
        Ok(())
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempdir::TempDir;

    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();

        assert_eq!(config.address(), "127.0.0.1:11211");
        assert_eq!(config.timeout(), Duration::from_millis(5000));
        assert_eq!(config.auth_method, AuthMethod::None);
        assert_eq!(config.value_type, ValueType::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_toml_file() {
        let temp = TempDir::new("config").unwrap();
        let path = temp.path().join("cinder.toml");
        fs::write(
            &path,
            r#"
            host = "cache.internal"
            port = 22122
            auth_method = "plain"
            username = "app"
            password = "secret"
            pool_size = 2
            namespace = "svc"
            value_type = "native"
            "#,
        )
        .unwrap();

        let config = Config::load_from(path.to_str().unwrap()).unwrap();

        assert_eq!(config.address(), "cache.internal:22122");
        assert_eq!(config.auth_method, AuthMethod::Plain);
        assert_eq!(config.username, "app");
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.pool_max_overflow, DEFAULT_POOL_MAX_OVERFLOW);
        assert_eq!(config.namespace.as_deref(), Some("svc"));
        assert_eq!(config.value_type, ValueType::Native);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let temp = TempDir::new("config").unwrap();
        let path = temp.path().join("absent.toml");

        let config = Config::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn plain_auth_requires_username() {
        let config = Config {
            auth_method: AuthMethod::Plain,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_pool_is_invalid() {
        let config = Config {
            pool_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
