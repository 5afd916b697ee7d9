use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "CTRL_AGENT_CONFIG";

/// Environment variable overriding `server.listen`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub pid_file: Option<PathBuf>,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` or `http://host:port`
    pub listen: String,
    /// Zero or negative disables the request timeout.
    pub request_timeout_ms: i64,
    pub read_buffer_size: usize,
    pub drain_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pid_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            request_timeout_ms: 10_000,
            read_buffer_size: 4096,
            drain_timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Loads the config file named by `CTRL_AGENT_CONFIG` (defaults when unset),
    /// then applies the `LISTEN` override.
    pub fn load() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var(LISTEN_ENV) {
            cfg.server.listen = listen;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.listen_addr()?;
        self.log_level()?;
        if self.server.read_buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize);
        }
        Ok(())
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }
}

impl ServerConfig {
    /// Resolves `listen` into a `host:port` string suitable for binding.
    pub fn listen_addr(&self) -> Result<String, ConfigError> {
        let invalid = || ConfigError::InvalidListen(self.listen.clone());

        if !self.listen.contains("://") {
            if self.listen.rsplit_once(':').is_none() {
                return Err(invalid());
            }
            return Ok(self.listen.clone());
        }

        let url = url::Url::parse(&self.listen).map_err(|_| invalid())?;
        if url.scheme() != "http" {
            return Err(invalid());
        }
        let host = url.host_str().ok_or_else(invalid)?;
        let port = url.port_or_known_default().ok_or_else(invalid)?;

        Ok(format!("{}:{}", host, port))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        u64::try_from(self.request_timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
