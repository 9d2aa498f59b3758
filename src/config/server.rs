//! Server configuration module.
//!
//! This module defines configuration related to the RPC server itself,
//! including which transport it binds and basic server settings.

use super::ConfigResult;
use super::Validate;
use crate::error::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Transport type the server binds on startup.
///
/// `WebSocket` and `Stdio` are recognized so that a configuration naming them
/// produces a clear "not implemented" error rather than an unknown-variant
/// deserialization failure — see the endpoint dial scheme in the external
/// interfaces section of the design document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Unix domain socket stream transport.
    Unix,
    /// HTTP/1.1 request-response transport.
    Http,
    /// WebSocket transport (reserved, not implemented).
    WebSocket,
    /// Standard I/O transport (reserved, not implemented).
    Stdio,
}

impl Default for TransportType {
    fn default() -> Self {
        Self::Unix
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name of the server (used in logs)
    pub name: String,

    /// Transport to bind on startup
    pub transport: TransportType,

    /// Address to bind to for the HTTP transport
    pub http_address: SocketAddr,

    /// Filesystem path to bind to for the Unix socket transport
    pub socket_path: PathBuf,

    /// Number of worker threads for request processing
    pub worker_threads: usize,

    /// Maximum number of concurrent requests
    pub max_concurrent_requests: usize,

    /// Whether the debug error chain should be included in responses
    pub debug_errors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "kahiko-rpc".to_string(),
            transport: TransportType::default(),
            http_address: "127.0.0.1:8765".parse().unwrap(),
            socket_path: PathBuf::from("/var/run/kahiko-rpc.sock"),
            worker_threads: num_cpus::get(),
            max_concurrent_requests: 1000,
            debug_errors: false,
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Server name cannot be empty".to_string(),
            ));
        }

        if self.worker_threads == 0 {
            return Err(ConfigError::ValidationError(
                "worker_threads must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::ValidationError(
                "max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_worker_threads_is_invalid() {
        let mut config = ServerConfig::default();
        config.worker_threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let mut config = ServerConfig::default();
        config.name = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
