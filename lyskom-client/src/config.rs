//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via LYSKOM_CONFIG or --config)
//! 3. Environment variables

use crate::connection::{ConnectionConfig, DEFAULT_READ_BUFFER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server connection.
    pub server: ServerConfig,
    /// Automatic login.
    pub login: LoginConfig,
    /// Entity caches.
    pub cache: CacheConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("LYSKOM_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides read through `lookup`, keyed by environment
    /// variable name.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.server.apply_overrides(&lookup);
        self.login.apply_overrides(&lookup);
        self.cache.apply_overrides(&lookup);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.addr.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "server address is empty".to_string(),
            ));
        }
        if self.server.connect_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_secs must be positive".to_string(),
            ));
        }
        if self.login.password.is_some() && self.login.person.is_none() {
            return Err(ConfigError::ValidationError(
                "login password set but person not set".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }

    /// Builds the connection settings for [`Client`](crate::Client) and
    /// [`Session`](crate::Session).
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.server.address())
            .with_user(self.server.user.clone())
            .with_connect_timeout(self.server.connect_timeout())
            .with_read_buffer_size(self.server.read_buffer_size)
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.to_lowercase() == "true"
}

/// Server connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host` or `host:port`.
    pub addr: String,
    /// User identification sent in the handshake.
    pub user: String,
    /// Connect and handshake timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Socket read buffer size in bytes.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("localhost:{}", lyskom_protocol::DEFAULT_PORT),
            user: "lyskom".to_string(),
            connect_timeout_secs: 10,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup("LYSKOM_SERVER") {
            if !addr.is_empty() {
                self.addr = addr;
            }
        }

        if let Some(user) = lookup("LYSKOM_USER") {
            self.user = user;
        }

        if let Some(timeout) = lookup("LYSKOM_CONNECT_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.connect_timeout_secs = secs;
            }
        }
    }

    /// The address with the default port added when none is given.
    pub fn address(&self) -> String {
        if self.addr.rsplit_once(':').is_some() {
            self.addr.clone()
        } else {
            format!("{}:{}", self.addr, lyskom_protocol::DEFAULT_PORT)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Credentials for logging in after connecting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Person number to log in as.
    pub person: Option<u32>,
    pub password: Option<String>,
    /// Log in without showing up in who-is-on.
    pub invisible: bool,
}

impl LoginConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(person) = lookup("LYSKOM_PERSON") {
            if let Ok(n) = person.parse() {
                self.person = Some(n);
            }
        }

        if let Some(password) = lookup("LYSKOM_PASSWORD") {
            self.password = Some(password);
        }
    }

    /// Person and password, when both are configured.
    pub fn credentials(&self) -> Option<(u32, &str)> {
        Some((self.person?, self.password.as_deref()?))
    }
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache entities invalidated through async messages.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl CacheConfig {
    fn apply_overrides(&mut self, lookup: &impl Fn(&str) -> Option<String>) {
        if let Some(enabled) = lookup("LYSKOM_CACHE_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.addr, "localhost:4894");
        assert_eq!(config.server.connect_timeout(), Duration::from_secs(10));
        assert!(config.cache.enabled);
        assert_eq!(config.login.credentials(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let mut config = Config::default();
        config.login.person = Some(6);
        config.login.password = Some("gazonk".to_string());
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: Config = serde_yaml::from_str("server:\n  addr: kom.lysator.liu.se\n").unwrap();
        assert_eq!(parsed.server.addr, "kom.lysator.liu.se");
        assert_eq!(parsed.server.address(), "kom.lysator.liu.se:4894");
        assert_eq!(parsed.server.user, "lyskom");
        assert!(parsed.cache.enabled);
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lyskom.yaml");

        let mut config = Config::default();
        config.server.addr = "kom.example.org:4894".to_string();
        config.cache.enabled = false;
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/lyskom.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(..)));
        assert!(err.to_string().contains("/nonexistent/lyskom.yaml"));
    }

    #[test]
    fn test_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "server: [1, 2").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError(..))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[
            ("LYSKOM_SERVER", "kom.example.org"),
            ("LYSKOM_USER", "alice%example.org"),
            ("LYSKOM_PERSON", "6"),
            ("LYSKOM_PASSWORD", "gazonk"),
            ("LYSKOM_CACHE_ENABLED", "false"),
            ("LYSKOM_CONNECT_TIMEOUT", "3"),
        ]));

        assert_eq!(config.server.addr, "kom.example.org");
        assert_eq!(config.server.user, "alice%example.org");
        assert_eq!(config.server.connect_timeout_secs, 3);
        assert_eq!(config.login.credentials(), Some((6, "gazonk")));
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_invalid_overrides_ignored() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[
            ("LYSKOM_PERSON", "six"),
            ("LYSKOM_CONNECT_TIMEOUT", "soon"),
        ]));
        assert_eq!(config.login.person, None);
        assert_eq!(config.server.connect_timeout_secs, 10);
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.login.password = Some("gazonk".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.server.addr = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_config() {
        let mut config = Config::default();
        config.server.addr = "kom.example.org".to_string();
        config.server.connect_timeout_secs = 2;
        let conn = config.connection_config();
        assert_eq!(conn.addr, "kom.example.org:4894");
        assert_eq!(conn.connect_timeout, Duration::from_secs(2));
        assert_eq!(conn.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
    }
}
