//! Configuration file support for the reliable UDP tools

use rudp::{Endpoint, GoBackN, StopAndWait, Transport, TransportConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// ARQ engine selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// One frame in flight, alternating bit
    #[default]
    StopAndWait,
    /// Sliding window with cumulative ACKs
    GoBackN,
}

impl EngineKind {
    /// Wrap an endpoint in the selected engine
    pub fn open(self, endpoint: Endpoint) -> rudp::Result<Box<dyn Transport>> {
        Ok(match self {
            EngineKind::StopAndWait => Box::new(StopAndWait::new(endpoint)),
            EngineKind::GoBackN => Box::new(GoBackN::new(endpoint)?),
        })
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_server_addr")]
    pub bind: SocketAddr,
    /// ARQ engine
    #[serde(default)]
    pub engine: EngineKind,
}

fn default_server_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_client_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn default_proxy_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_buffer_size() -> usize {
    4096
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_server_addr(),
            engine: EngineKind::default(),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server address
    #[serde(default = "default_server_addr")]
    pub server: SocketAddr,
    /// Local bind address
    #[serde(default = "default_client_bind")]
    pub bind: SocketAddr,
    /// ARQ engine
    #[serde(default)]
    pub engine: EngineKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server: default_server_addr(),
            bind: default_client_bind(),
            engine: EngineKind::default(),
        }
    }
}

/// TCP bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// TCP listen address
    #[serde(default = "default_proxy_addr")]
    pub listen: SocketAddr,
    /// Reliable UDP server to relay to
    #[serde(default = "default_server_addr")]
    pub server: SocketAddr,
    /// Local bind address for each relay endpoint
    #[serde(default = "default_client_bind")]
    pub bind: SocketAddr,
    /// ARQ engine
    #[serde(default)]
    pub engine: EngineKind,
    /// Largest request read from a TCP connection
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            listen: default_proxy_addr(),
            server: default_server_addr(),
            bind: default_client_bind(),
            engine: EngineKind::default(),
            buffer_size: default_buffer_size(),
        }
    }
}

/// Combined configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transport settings shared by every tool
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Check the transport settings and proxy limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.proxy.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "proxy buffer_size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
