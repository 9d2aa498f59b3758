//! Resource limits configuration module.
//!
//! This module defines the concurrency caps actually exercised by the RPC
//! core: how many connections the server accepts concurrently and how large
//! a single batch request may be. Memory/CPU/request-rate governors are
//! deliberately absent here — they'd target a long-running host process's
//! resource budget, which this crate has no visibility into.

use super::{ConfigResult, Validate};
use crate::error::config::ConfigError;
use serde::{Deserialize, Serialize};

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrently accepted connections.
    pub max_connections: usize,

    /// Maximum number of elements accepted in a single batch request.
    pub max_batch_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_batch_size: 256,
        }
    }
}

impl Validate for LimitsConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        if self.max_batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_batch_size must be greater than 0".to_string(),
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
        assert!(LimitsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_max_batch_size_is_invalid() {
        let mut config = LimitsConfig::default();
        config.max_batch_size = 0;
        assert!(config.validate().is_err());
    }
}
