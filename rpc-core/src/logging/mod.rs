//! Request logging.
//!
//! Every dispatch already runs inside a `tracing` span tagged with a
//! [`RequestId`]. This module adds an opt-in middleware that logs request
//! lifecycles with timing, slow-request warnings and redacted payloads.
//!
//! # Example
//! ```rust,ignore
//! use rpc_core::logging::{LogConfig, LogLevel, logging_middleware};
//!
//! let router = Router::builder()
//!     .use_middleware_fn(logging_middleware(
//!         LogConfig::new()
//!             .with_level(LogLevel::Debug)
//!             .with_input_logging(true)
//!             .exclude_path("health"),
//!     ))
//!     .procedure("users.create", create_user)
//!     .build()?;
//! ```

mod config;
mod middleware;
mod redaction;
mod types;

pub use config::LogConfig;
pub use middleware::{LoggingMiddleware, logging_middleware, should_log_slow_request};
pub use redaction::{RedactionEngine, redact_value};
pub use types::{LogLevel, RequestId};
