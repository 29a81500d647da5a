//! Server configuration
//!
//! The binary fills [`ServerConfig`] from command-line flags and environment
//! variables; the library only sees the validated form.

use std::net::SocketAddr;

use thiserror::Error;

use crate::engine::{EngineConfig, IceServer};

/// STUN servers used when none are configured
pub const DEFAULT_STUN_URLS: &[&str] = &[
    "stun:stun.l.google.com:19302",
    "stun:global.stun.twilio.com:3478",
];

/// Default WebSocket upgrade path
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Default listen port
pub const DEFAULT_PORT: u16 = 3000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("WebSocket path must start with '/': {0}")]
    InvalidWsPath(String),

    #[error("Invalid listen address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),
}

/// Signaling server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Path accepted for WebSocket upgrades
    pub ws_path: String,
    /// STUN URLs handed to every peer connection
    pub stun_urls: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            stun_urls: default_stun_urls(),
        }
    }
}

impl ServerConfig {
    /// Build a configuration, checking the WebSocket path and listen address
    pub fn new(
        host: impl Into<String>,
        port: u16,
        ws_path: impl Into<String>,
        stun_urls: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            host: host.into(),
            port,
            ws_path: ws_path.into(),
            stun_urls,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::InvalidWsPath(self.ws_path.clone()));
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        Ok(format!("{}:{}", host, self.port).parse()?)
    }

    /// All STUN URLs as a single ICE server entry, or none at all
    pub fn ice_servers(&self) -> Vec<IceServer> {
        if self.stun_urls.is_empty() {
            Vec::new()
        } else {
            vec![IceServer {
                urls: self.stun_urls.clone(),
            }]
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            ice_servers: self.ice_servers(),
        }
    }
}

pub fn default_stun_urls() -> Vec<String> {
    DEFAULT_STUN_URLS.iter().map(|url| url.to_string()).collect()
}

/// Split a comma separated list, trimming entries and dropping blanks
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// STUN URLs from a raw `STUN_URLS` value; unset or blank means the defaults
pub fn parse_stun_urls(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(raw) if !raw.trim().is_empty() => parse_list(raw),
        _ => default_stun_urls(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.stun_urls.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_stun_urls() {
        assert_eq!(parse_stun_urls(None), default_stun_urls());
        assert_eq!(parse_stun_urls(Some("  ")), default_stun_urls());
        assert_eq!(
            parse_stun_urls(Some(" stun:a.example:3478, ,stun:b.example:19302 ")),
            vec!["stun:a.example:3478", "stun:b.example:19302"]
        );
    }

    #[test]
    fn test_ice_servers_grouping() {
        let mut config = ServerConfig::default();
        let servers = config.ice_servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].urls, default_stun_urls());

        config.stun_urls.clear();
        assert!(config.ice_servers().is_empty());
        assert!(config.engine_config().ice_servers.is_empty());
    }

    #[test]
    fn test_invalid_ws_path() {
        let result = ServerConfig::new("0.0.0.0", 3000, "ws", vec![]);
        assert!(matches!(result, Err(ConfigError::InvalidWsPath(_))));
    }

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig::new("::1", 8080, "/ws", vec![]).unwrap();
        assert_eq!(config.bind_addr().unwrap(), "[::1]:8080".parse().unwrap());

        let bad = ServerConfig::new("not a host", 8080, "/ws", vec![]);
        assert!(matches!(bad, Err(ConfigError::InvalidAddress(_))));
    }
}
