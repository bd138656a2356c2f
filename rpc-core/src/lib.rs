//! # rpc-core
//!
//! Transport-independent core of a typed RPC server.
//!
//! ## Overview
//!
//! - **Router tree** of named queries and mutations, checked once at build time
//! - **Onion middleware** that can enrich the context, short-circuit or rewrite results
//! - **Schema validation** and input transforms applied right before the handler
//! - **Typed error taxonomy** mapped onto transport status codes
//! - **Introspection** of the whole tree as a JSON document
//!
//! ## Architecture
//!
//! ```text
//!  transport (HTTP, IPC, ...)
//!        │  route, type, raw input, initial context
//!        ▼
//! ┌──────────────┐   resolve    ┌──────────────┐
//! │  Dispatcher  │─────────────▶│    Router    │
//! └──────┬───────┘              └──────────────┘
//!        │ run chain
//!        ▼
//! ┌──────────────────────────────────────────────┐
//! │ schema → transform → router mw → procedure mw │
//! │                    → handler → output schema  │
//! └──────────────────────────────────────────────┘
//!        │
//!        ▼
//!  ResultEnvelope { ok, data | error }
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rpc_core::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct GreetInput { first_name: String }
//!
//! let greetings = Procedure::builder()
//!     .input(TypeSchema::object()
//!         .with_required_property("firstName", TypeSchema::string().with_min_length(4)))
//!     .output(TypeSchema::string())
//!     .query(|_ctx: Context<EmptyContext>, input: GreetInput| async move {
//!         Ok(format!("Hello, {}", input.first_name))
//!     });
//!
//! let router = Router::builder().procedure("greetings", greetings).build()?;
//! let dispatcher = Dispatcher::new(router);
//!
//! let envelope = dispatcher
//!     .dispatch("greetings", ProcedureType::Query, json!({"firstName": "John"}), Context::default())
//!     .await;
//! assert_eq!(envelope.data(), Some(&json!("Hello, John")));
//! ```

pub mod batch;
mod config;
pub mod context;
pub mod dispatcher;
mod error;
mod handler;
pub mod introspection;
pub mod logging;
pub mod middleware;
pub mod procedure;
pub mod router;
pub mod schema;
pub mod transform;
pub mod validation;

#[cfg(test)]
mod tests;

pub use batch::{BatchConfig, BatchRequest, BatchResponse, BatchResult, SingleRequest};
pub use config::{ConfigValidationError, RpcConfig};
pub use context::{
    Context, ContextBuilder, ContextPatch, ContextTransform, ContextValues, EmptyContext,
    apply_transforms,
};
pub use dispatcher::{CallEnvelope, Dispatcher, ResultEnvelope};
pub use error::{
    ConfigurationError, ErrorCodeMapper, ErrorConfig, ErrorTransformer,
    GENERIC_SERVER_ERROR_MESSAGE, LoggingTransformer, RpcError, RpcErrorCode, RpcResult,
};
pub use handler::Handler;
pub use introspection::{IntrospectionNode, introspect};
pub use logging::{LogConfig, LogLevel, LoggingMiddleware, RequestId, logging_middleware};
pub use middleware::{Middleware, MiddlewareFn, Next, ProcedureType, Request, Response, from_fn};
pub use procedure::{Procedure, ProcedureBuilder};
pub use router::{Node, Router, RouterBuilder};
pub use schema::{PreparedSchema, SchemaParser, SchemaType, TypeSchema, TypeSchemaParser};
pub use transform::{InputTransform, TransformFn, transformer};
pub use validation::{FieldError, Validate, ValidationResult, ValidationRules};

/// Everything needed to declare and serve a router.
///
/// ```rust,ignore
/// use rpc_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Batch
        BatchConfig,
        BatchRequest,
        BatchResponse,
        // Dispatch
        CallEnvelope,
        // Errors
        ConfigurationError,
        // Context
        Context,
        ContextBuilder,
        ContextPatch,
        Dispatcher,
        EmptyContext,
        ErrorConfig,
        FieldError,
        Handler,
        IntrospectionNode,
        LogConfig,
        // Middleware
        Middleware,
        MiddlewareFn,
        Next,
        // Routing
        Procedure,
        ProcedureBuilder,
        ProcedureType,
        Request,
        Response,
        ResultEnvelope,
        Router,
        RouterBuilder,
        RpcConfig,
        RpcError,
        RpcErrorCode,
        RpcResult,
        // Schema
        TypeSchema,
        // Validation
        Validate,
        ValidationResult,
        ValidationRules,
        // Functions
        from_fn,
        introspect,
        logging_middleware,
        transformer,
    };
    pub use serde_json::json;
}
