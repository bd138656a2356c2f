//! Runtime configuration for the dispatcher.
//!
//! # Example
//! ```rust,ignore
//! use rpc_core::{BatchConfig, RpcConfig};
//!
//! let config = RpcConfig::new()
//!     .with_max_input_size(512 * 1024)
//!     .with_request_timeout_ms(5_000)
//!     .with_batch_config(BatchConfig::new().with_max_batch_size(20));
//! config.validate()?;
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::BatchConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigValidationError {
    /// max_input_size must be greater than 0
    InvalidMaxInputSize,
    /// request_timeout_ms, when set, must be greater than 0
    InvalidRequestTimeout,
    /// BatchConfig validation failed
    InvalidBatchConfig(String),
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMaxInputSize => write!(f, "max_input_size must be greater than 0"),
            Self::InvalidRequestTimeout => {
                write!(f, "request_timeout_ms must be greater than 0 when set")
            }
            Self::InvalidBatchConfig(msg) => write!(f, "invalid batch config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Dispatcher configuration.
///
/// * `max_input_size` - Maximum serialized input size in bytes. Larger inputs
///   are rejected with `PAYLOAD_TOO_LARGE` before any middleware runs.
///   Default: 1MB.
/// * `request_timeout_ms` - Upper bound for one chain execution. A chain that
///   exceeds it yields `TIMEOUT` and its late result is dropped. Default: none.
/// * `debug_logging` - Log every envelope at debug level. Default: false.
/// * `batch_config` - Limits for batch dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Maximum input JSON size in bytes (default: 1MB)
    pub max_input_size: usize,
    /// Optional per-request deadline in milliseconds
    pub request_timeout_ms: Option<u64>,
    /// Enable debug logging (default: false)
    pub debug_logging: bool,
    /// Batch request configuration
    pub batch_config: BatchConfig,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            max_input_size: 1024 * 1024,
            request_timeout_ms: None,
            debug_logging: false,
            batch_config: BatchConfig::default(),
        }
    }
}

impl RpcConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_input_size` is 0, if `request_timeout_ms` is
    /// `Some(0)`, or if the batch configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.max_input_size == 0 {
            return Err(ConfigValidationError::InvalidMaxInputSize);
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigValidationError::InvalidRequestTimeout);
        }
        self.batch_config
            .validate()
            .map_err(ConfigValidationError::InvalidBatchConfig)?;
        Ok(())
    }

    /// The request deadline as a [`Duration`], if one is configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Set the maximum input size in bytes.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Set the per-request deadline in milliseconds.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = Some(timeout_ms);
        self
    }

    /// Enable or disable debug logging.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Set the batch configuration.
    #[must_use = "This method returns a new RpcConfig and does not modify self"]
    pub fn with_batch_config(mut self, config: BatchConfig) -> Self {
        self.batch_config = config;
        self
    }
}
