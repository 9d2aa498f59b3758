//! HTTP transport configuration module.
//!
//! This module defines configuration for the HTTP binding of the JSON-RPC
//! transport: the maximum request body size and the outbound client's
//! request timeout. It intentionally does not carry connection-pool,
//! rate-limiter, or circuit-breaker settings — those concerns have no
//! counterpart in a request/response RPC transport with no fixed upstream.

use super::{ConfigResult, Validate};
use crate::error::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Maximum JSON-RPC HTTP body size, per the external interfaces section: 5 MiB.
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,

    /// Outbound HTTP client request timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// User agent string sent by the outbound HTTP client.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            request_timeout_ms: 30_000,
            user_agent: "kahiko-rpc/0.1".to_string(),
        }
    }
}

impl Validate for HttpConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_body_bytes must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "user_agent cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
