//! Error types for RPC operations
//!
//! Per-request failures are [`RpcError`] values flowing through
//! [`RpcResult`]. Build-time failures (bad procedure trees, invalid
//! configuration) are [`ConfigurationError`] values and surface at startup.
//!
//! # Error Codes
//!
//! [`RpcErrorCode`] is a closed enumeration. Each code carries the canonical
//! transport status an adapter should emit; the core itself never speaks HTTP.
//! When serialized, codes are SCREAMING_SNAKE_CASE strings.
//!
//! # Example
//! ```rust,ignore
//! use rpc_core::{RpcError, RpcErrorCode};
//!
//! let error = RpcError::new(RpcErrorCode::NotFound, "User not found");
//! let error = RpcError::not_found("User not found"); // Convenience method
//! assert_eq!(error.code.http_status(), 404);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::config::ConfigValidationError;
use crate::validation::FieldError;

/// Message used in place of server error messages outside development mode.
pub const GENERIC_SERVER_ERROR_MESSAGE: &str = "An internal error occurred";

/// Closed set of error codes understood by every client and adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorCode {
    /// The request was malformed or its input failed validation
    BadRequest,
    /// Authentication is required
    Unauthorized,
    /// The authenticated caller lacks permission
    Forbidden,
    /// The route (or a resource) does not exist
    NotFound,
    /// The route exists but not for the requested procedure type
    MethodNotSupported,
    /// The request did not complete in time
    Timeout,
    /// The request conflicts with current state
    Conflict,
    /// A precondition of the request was not met
    PreconditionFailed,
    /// The input exceeds the configured size limit
    PayloadTooLarge,
    /// The input is well-formed but semantically unusable
    UnprocessableContent,
    /// Rate limit exceeded
    TooManyRequests,
    /// The caller went away before a result was produced
    ClientClosedRequest,
    /// An unexpected server-side failure
    InternalServerError,
}

impl RpcErrorCode {
    /// Every code, in status order.
    pub const ALL: [RpcErrorCode; 13] = [
        Self::BadRequest,
        Self::Unauthorized,
        Self::Forbidden,
        Self::NotFound,
        Self::MethodNotSupported,
        Self::Timeout,
        Self::Conflict,
        Self::PreconditionFailed,
        Self::PayloadTooLarge,
        Self::UnprocessableContent,
        Self::TooManyRequests,
        Self::ClientClosedRequest,
        Self::InternalServerError,
    ];

    /// Returns the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::MethodNotSupported => "METHOD_NOT_SUPPORTED",
            Self::Timeout => "TIMEOUT",
            Self::Conflict => "CONFLICT",
            Self::PreconditionFailed => "PRECONDITION_FAILED",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::UnprocessableContent => "UNPROCESSABLE_CONTENT",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::ClientClosedRequest => "CLIENT_CLOSED_REQUEST",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Canonical transport status for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::NotFound => 404,
            Self::MethodNotSupported => 405,
            Self::Timeout => 408,
            Self::Conflict => 409,
            Self::PreconditionFailed => 412,
            Self::PayloadTooLarge => 413,
            Self::UnprocessableContent => 422,
            Self::TooManyRequests => 429,
            Self::ClientClosedRequest => 499,
            Self::InternalServerError => 500,
        }
    }

    /// Returns true if this is a client error (4xx equivalent).
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }

    /// Returns true if this is a server error (5xx equivalent).
    pub fn is_server_error(&self) -> bool {
        self.http_status() >= 500
    }
}

impl fmt::Display for RpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RPC error with type-safe code and message.
///
/// `cause` is kept for logging only: it is never serialized, so it cannot
/// leak to a caller through an envelope.
///
/// # Example
/// ```rust,ignore
/// use rpc_core::{RpcError, RpcErrorCode};
///
/// let error = RpcError::new(RpcErrorCode::NotFound, "User not found")
///     .with_details(serde_json::json!({"user_id": 123}))
///     .with_cause("Database query returned empty result");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct RpcError {
    /// Type-safe error code
    pub code: RpcErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (JSON value)
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    /// Optional cause for logging
    #[serde(skip)]
    pub cause: Option<String>,
}

impl RpcError {
    /// Create a new error with code and message.
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            cause: None,
        }
    }

    /// Add details to the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Serialize) -> Self {
        self.details = serde_json::to_value(details).ok();
        self
    }

    /// Add a cause string for logging.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Apply error configuration to prepare the error for a caller.
    ///
    /// Outside development mode, server errors lose their message and
    /// details. The configured transformer runs last.
    pub fn apply_config(mut self, config: &ErrorConfig) -> Self {
        trace!(
            code = %self.code,
            development_mode = config.development_mode,
            has_transformer = config.transformer.is_some(),
            "Applying error configuration"
        );

        if !config.development_mode && self.code.is_server_error() {
            debug!(
                original_code = %self.code,
                original_message = %self.message,
                "Sanitizing server error for production"
            );
            self.message = GENERIC_SERVER_ERROR_MESSAGE.to_string();
            self.details = None;
        }

        if let Some(transformer) = &config.transformer {
            self = transformer.transform(self);
        }

        self
    }

    // Convenience constructors

    /// Create a BAD_REQUEST error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::BadRequest, message)
    }

    /// Create a BAD_REQUEST error from aggregated field errors.
    ///
    /// The message names every failing field; `details.errors` carries the
    /// structured list.
    pub fn validation(errors: Vec<FieldError>) -> Self {
        Self::from_field_errors("Input validation failed", errors)
    }

    /// Create a BAD_REQUEST error for input that validated but could not be
    /// transformed.
    pub fn transformation(errors: Vec<FieldError>) -> Self {
        Self::from_field_errors("Input transformation failed", errors)
    }

    fn from_field_errors(prefix: &str, errors: Vec<FieldError>) -> Self {
        let summary = errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self::bad_request(format!("{prefix}: {summary}"))
            .with_details(serde_json::json!({ "errors": errors }))
    }

    /// Create an UNAUTHORIZED error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Unauthorized, message)
    }

    /// Create a FORBIDDEN error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Forbidden, message)
    }

    /// Create a NOT_FOUND error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::NotFound, message)
    }

    /// Create a NOT_FOUND error for a route that does not resolve to a procedure.
    pub fn route_not_found(path: &str) -> Self {
        Self::not_found(format!("No procedure found at '{path}'"))
            .with_details(serde_json::json!({ "path": path }))
    }

    /// Create a METHOD_NOT_SUPPORTED error.
    pub fn method_not_supported(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::MethodNotSupported, message)
    }

    /// Create a TIMEOUT error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Timeout, message)
    }

    /// Create a CONFLICT error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::Conflict, message)
    }

    /// Create a PRECONDITION_FAILED error.
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::PreconditionFailed, message)
    }

    /// Create a PAYLOAD_TOO_LARGE error.
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::PayloadTooLarge, message)
    }

    /// Create an UNPROCESSABLE_CONTENT error.
    pub fn unprocessable_content(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::UnprocessableContent, message)
    }

    /// Create a TOO_MANY_REQUESTS error.
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::TooManyRequests, message)
    }

    /// Create a CLIENT_CLOSED_REQUEST error.
    pub fn client_closed_request(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::ClientClosedRequest, message)
    }

    /// Create an INTERNAL_SERVER_ERROR error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RpcErrorCode::InternalServerError, message)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal("JSON serialization failed").with_cause(err.to_string())
    }
}

impl Serialize for RpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let len = if self.details.is_some() { 3 } else { 2 };
        let mut state = serializer.serialize_struct("RpcError", len)?;
        state.serialize_field("code", &self.code)?;
        state.serialize_field("message", &self.message)?;
        if let Some(ref details) = self.details {
            state.serialize_field("details", details)?;
        }
        state.end()
    }
}

/// Result type alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

// =============================================================================
// Configuration Errors
// =============================================================================

/// Build-time failures. These never occur while serving a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// Two children of one router share a name.
    #[error("duplicate name '{name}' in router '{router}'")]
    DuplicateName { router: String, name: String },

    /// A child name is empty or contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A procedure's input or output schema cannot be compiled.
    #[error("invalid schema on '{route}': {reason}")]
    InvalidSchema { route: String, reason: String },

    /// Runtime configuration did not validate.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// A middleware broke the continuation contract.
    #[error("middleware #{step} on '{route}' {reason}")]
    MiddlewareContract {
        route: String,
        step: usize,
        reason: String,
    },
}

// =============================================================================
// Error Configuration
// =============================================================================

/// Controls how errors are prepared before they reach an envelope.
///
/// # Example
/// ```rust,ignore
/// use rpc_core::error::{ErrorCodeMapper, ErrorConfig, RpcErrorCode};
///
/// let config = ErrorConfig::production()
///     .with_transformer(ErrorCodeMapper::new().map(RpcErrorCode::Forbidden, RpcErrorCode::NotFound));
/// ```
#[derive(Clone)]
pub struct ErrorConfig {
    /// Keep server error messages and details in envelopes
    pub development_mode: bool,
    /// Custom error transformer
    pub transformer: Option<Arc<dyn ErrorTransformer>>,
}

impl ErrorConfig {
    /// Create a new error configuration; development mode follows `debug_assertions`.
    pub fn new() -> Self {
        Self {
            development_mode: cfg!(debug_assertions),
            transformer: None,
        }
    }

    /// Create a development mode configuration.
    pub fn development() -> Self {
        Self {
            development_mode: true,
            transformer: None,
        }
    }

    /// Create a production mode configuration.
    pub fn production() -> Self {
        Self {
            development_mode: false,
            transformer: None,
        }
    }

    /// Set development mode.
    #[must_use]
    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }

    /// Set a custom error transformer.
    #[must_use]
    pub fn with_transformer<T: ErrorTransformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ErrorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorConfig")
            .field("development_mode", &self.development_mode)
            .field("transformer", &self.transformer.is_some())
            .finish()
    }
}

// =============================================================================
// Error Transformer
// =============================================================================

/// Rewrites errors on their way into an envelope.
pub trait ErrorTransformer: Send + Sync {
    /// Transform an error before it's sent to the caller.
    fn transform(&self, error: RpcError) -> RpcError;
}

/// Logs errors, including their cause, and passes them through.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTransformer;

impl ErrorTransformer for LoggingTransformer {
    fn transform(&self, error: RpcError) -> RpcError {
        tracing::error!(
            code = %error.code,
            message = %error.message,
            cause = ?error.cause,
            "RPC error occurred"
        );
        error
    }
}

/// Maps specific error codes to different codes.
#[derive(Debug, Clone, Default)]
pub struct ErrorCodeMapper {
    mappings: HashMap<RpcErrorCode, RpcErrorCode>,
}

impl ErrorCodeMapper {
    /// Create an empty mapper.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping from one error code to another.
    #[must_use]
    pub fn map(mut self, from: RpcErrorCode, to: RpcErrorCode) -> Self {
        self.mappings.insert(from, to);
        self
    }
}

impl ErrorTransformer for ErrorCodeMapper {
    fn transform(&self, mut error: RpcError) -> RpcError {
        if let Some(&new_code) = self.mappings.get(&error.code) {
            debug!(from_code = %error.code, to_code = %new_code, "Mapping error code");
            error.code = new_code;
        }
        error
    }
}
