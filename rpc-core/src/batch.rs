//! Batch request types.
//!
//! A batch carries several call envelopes that share one initial context.
//! Results come back in request order, each as its own [`ResultEnvelope`],
//! so one failing call never affects its siblings.
//!
//! # Example
//! ```rust,ignore
//! let batch = BatchRequest::new()
//!     .add("1", CallEnvelope::query("health", json!(null)))
//!     .add("2", CallEnvelope::query("users.get", json!({"id": 1})));
//! let response = dispatcher.dispatch_batch(batch, ctx).await?;
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::dispatcher::{CallEnvelope, ResultEnvelope};
use crate::error::RpcError;

/// Limits for batch dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of calls in one batch (default: 100)
    pub max_batch_size: usize,
    /// Run calls concurrently instead of one after another (default: true)
    pub parallel_execution: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            parallel_execution: true,
        }
    }
}

impl BatchConfig {
    /// Create a new batch configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum batch size.
    #[must_use = "This method returns a new BatchConfig and does not modify self"]
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        trace!(max_batch_size = size, "Setting batch max size");
        self.max_batch_size = size;
        self
    }

    /// Set whether to execute calls concurrently.
    #[must_use = "This method returns a new BatchConfig and does not modify self"]
    pub fn with_parallel_execution(mut self, parallel: bool) -> Self {
        trace!(parallel_execution = parallel, "Setting batch parallel execution");
        self.parallel_execution = parallel;
        self
    }

    /// Validate the batch configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// One call within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleRequest {
    /// Correlates the result with the request.
    pub id: String,
    /// The call itself.
    #[serde(flatten)]
    pub call: CallEnvelope,
}

/// A batch of calls processed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub requests: Vec<SingleRequest>,
}

impl BatchRequest {
    /// Create a new empty batch request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a call to the batch.
    #[must_use]
    pub fn add(mut self, id: impl Into<String>, call: CallEnvelope) -> Self {
        let id = id.into();
        trace!(batch_id = %id, route = %call.route, "Adding call to batch");
        self.requests.push(SingleRequest { id, call });
        self
    }

    /// Number of calls in the batch.
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Validate the batch against configuration limits.
    pub fn validate(&self, config: &BatchConfig) -> Result<(), RpcError> {
        if self.requests.is_empty() {
            warn!("Batch validation failed: batch request cannot be empty");
            return Err(RpcError::bad_request("Batch request cannot be empty"));
        }
        if self.requests.len() > config.max_batch_size {
            warn!(
                batch_size = self.requests.len(),
                max_size = config.max_batch_size,
                "Batch validation failed: size exceeds maximum"
            );
            return Err(RpcError::payload_too_large(format!(
                "Batch size {} exceeds maximum allowed size {}",
                self.requests.len(),
                config.max_batch_size
            )));
        }
        debug!(batch_size = self.requests.len(), "Batch request validated");
        Ok(())
    }
}

/// Result of one call within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub id: String,
    pub result: ResultEnvelope,
}

/// Results of a batch, in request order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchResult>,
}

impl BatchResponse {
    /// Number of successful calls.
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.result.is_ok()).count()
    }

    /// Number of failed calls.
    pub fn error_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// Look up a result by request id.
    pub fn get(&self, id: &str) -> Option<&ResultEnvelope> {
        self.results.iter().find(|r| r.id == id).map(|r| &r.result)
    }
}
