//! Server configuration
//!
//! Defaults reproduce the fixed constants the classifier was deployed with.
//! Values can be layered from a TOML file and then from CLI flags.

use std::fs;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{Error, Result, ResultExt};

/// Default model record location
pub const DEFAULT_MODEL_PATH: &str = "best_model.mpk";

/// Default upload limit (10 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// How request-time errors map to HTTP status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorStatusPolicy {
    /// Every response is 200, errors are only visible in the body
    #[default]
    Compat,
    /// 400 for bad uploads, 422 for unusable images, 500 for inference faults
    Semantic,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Path to the trained model record
    pub model_path: PathBuf,
    /// Optional JSON architecture config for the model
    pub model_config_path: Option<PathBuf>,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Status-code policy for error responses
    pub error_status: ErrorStatusPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            model_config_path: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            error_status: ErrorStatusPolicy::Compat,
        }
    }
}

impl ServerConfig {
    /// Read a TOML file; missing keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::PathNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be greater than 0".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than 0".into()));
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(Error::Config("model_path must not be empty".into()));
        }
        self.socket_addr().map(|_| ())
    }

    /// Address to bind
    ///
    /// IP literals (including bare or bracketed IPv6) are used as is; other
    /// hosts such as `localhost` are resolved and the first address wins.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, self.port));
        }

        (host, self.port)
            .to_socket_addrs()
            .with_context(|| format!("Invalid listen address '{}'", self.host))?
            .next()
            .ok_or_else(|| Error::Config(format!("'{}' resolved to no addresses", self.host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_deployment() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.model_path, PathBuf::from("best_model.mpk"));
        assert_eq!(config.error_status, ErrorStatusPolicy::Compat);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml_str(
            r#"
            port = 9090
            error_status = "semantic"
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.error_status, ErrorStatusPolicy::Semantic);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn test_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "model_path = \"models/leaf.mpk\"\n").unwrap();

        let config = ServerConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.model_path, PathBuf::from("models/leaf.mpk"));

        std::fs::write(&path, "port = \"not a number\"\n").unwrap();
        assert!(matches!(
            ServerConfig::from_toml_file(&path),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.host = String::new();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_addr_hosts() {
        let mut config = ServerConfig::default();
        assert_eq!(config.socket_addr().unwrap(), "0.0.0.0:8000".parse().unwrap());

        config.host = "::".into();
        assert_eq!(config.socket_addr().unwrap(), "[::]:8000".parse().unwrap());

        config.host = "[::1]".into();
        config.port = 9000;
        assert_eq!(config.socket_addr().unwrap(), "[::1]:9000".parse().unwrap());

        config.host = "localhost".into();
        let addr = config.socket_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9000);
    }
}
