//! Request dispatch.
//!
//! The [`Dispatcher`] is what a transport adapter talks to. It takes an
//! already-parsed route, procedure type and raw input, resolves the route
//! against the router tree, runs the procedure's chain and turns the outcome
//! into a [`ResultEnvelope`]. It never panics and never returns a bare error:
//! panics inside middleware or handlers become `INTERNAL_SERVER_ERROR`.
//!
//! # Example
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(router).with_config(RpcConfig::new().with_request_timeout_ms(5_000))?;
//!
//! let envelope = dispatcher
//!     .dispatch("greetings", ProcedureType::Query, json!({"firstName": "John"}), Context::default())
//!     .await;
//! assert_eq!(envelope.status(), 200);
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{Instrument, debug, debug_span, error, warn};

use crate::batch::{BatchRequest, BatchResponse, BatchResult};
use crate::config::RpcConfig;
use crate::context::{Context, ContextBuilder};
use crate::error::{ConfigurationError, ErrorConfig, RpcError, RpcResult};
use crate::introspection::{IntrospectionNode, introspect};
use crate::logging::RequestId;
use crate::middleware::{ProcedureType, Response};
use crate::router::Router;
use crate::router::chain::{self, Execution};
use crate::schema::{SchemaParser, TypeSchemaParser};
use crate::validation::validate_input_size;

// =============================================================================
// Envelopes
// =============================================================================

/// A call as it arrives from a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Dot-separated route, e.g. `users.get`.
    pub route: String,
    #[serde(rename = "type")]
    pub kind: ProcedureType,
    #[serde(default)]
    pub input: Value,
}

impl CallEnvelope {
    pub fn new(route: impl Into<String>, kind: ProcedureType, input: Value) -> Self {
        Self {
            route: route.into(),
            kind,
            input,
        }
    }

    pub fn query(route: impl Into<String>, input: Value) -> Self {
        Self::new(route, ProcedureType::Query, input)
    }

    pub fn mutation(route: impl Into<String>, input: Value) -> Self {
        Self::new(route, ProcedureType::Mutation, input)
    }
}

/// The uniform result handed back to a transport.
///
/// Serializes as `{"ok": true, "data": ...}` or
/// `{"ok": false, "error": {"code": ..., "message": ..., "details"?: ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireEnvelope", try_from = "WireEnvelope")]
pub enum ResultEnvelope {
    Ok { data: Value },
    Err { error: RpcError },
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl From<ResultEnvelope> for WireEnvelope {
    fn from(envelope: ResultEnvelope) -> Self {
        match envelope {
            ResultEnvelope::Ok { data } => Self {
                ok: true,
                data: Some(data),
                error: None,
            },
            ResultEnvelope::Err { error } => Self {
                ok: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<WireEnvelope> for ResultEnvelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        match (wire.ok, wire.error) {
            (true, _) => Ok(Self::Ok {
                data: wire.data.unwrap_or(Value::Null),
            }),
            (false, Some(error)) => Ok(Self::Err { error }),
            (false, None) => Err("error envelope without an error".to_string()),
        }
    }
}

impl ResultEnvelope {
    pub fn success(data: Value) -> Self {
        Self::Ok { data }
    }

    pub fn failure(error: RpcError) -> Self {
        Self::Err { error }
    }

    /// Wrap a result, preparing any error with `config`.
    pub fn from_result(result: RpcResult<Value>, config: &ErrorConfig) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(error.apply_config(config)),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    /// Transport status: 200 on success, otherwise the error code's status.
    pub fn status(&self) -> u16 {
        match self {
            Self::Ok { .. } => 200,
            Self::Err { error } => error.code.http_status(),
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Ok { data } => Some(data),
            Self::Err { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&RpcError> {
        match self {
            Self::Ok { .. } => None,
            Self::Err { error } => Some(error),
        }
    }

    pub fn into_result(self) -> RpcResult<Value> {
        match self {
            Self::Ok { data } => Ok(data),
            Self::Err { error } => Err(error),
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Resolves routes and drives procedure chains.
pub struct Dispatcher<Ctx> {
    router: Arc<Router<Ctx>>,
    parser: Arc<dyn SchemaParser>,
    config: RpcConfig,
    error_config: ErrorConfig,
}

impl<Ctx> Clone for Dispatcher<Ctx> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
            parser: Arc::clone(&self.parser),
            config: self.config.clone(),
            error_config: self.error_config.clone(),
        }
    }
}

impl<Ctx> Dispatcher<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    /// A dispatcher with the built-in schema parser and default configuration.
    pub fn new(router: Router<Ctx>) -> Self {
        Self::from_shared(Arc::new(router))
    }

    /// A dispatcher over an already shared router.
    pub fn from_shared(router: Arc<Router<Ctx>>) -> Self {
        Self {
            router,
            parser: Arc::new(TypeSchemaParser::new()),
            config: RpcConfig::default(),
            error_config: ErrorConfig::default(),
        }
    }

    /// Replace the schema parser.
    #[must_use]
    pub fn with_parser(self, parser: impl SchemaParser + 'static) -> Self {
        self.with_shared_parser(Arc::new(parser))
    }

    #[must_use]
    pub fn with_shared_parser(mut self, parser: Arc<dyn SchemaParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Apply runtime configuration after validating it.
    ///
    /// A request timeout uses `tokio::time`, so timed calls must run inside
    /// a tokio runtime. Outside one, every timed call fails with
    /// `INTERNAL_SERVER_ERROR`.
    pub fn with_config(mut self, config: RpcConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    #[must_use]
    pub fn with_error_config(mut self, error_config: ErrorConfig) -> Self {
        self.error_config = error_config;
        self
    }

    pub fn router(&self) -> &Router<Ctx> {
        &self.router
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Describe the router tree.
    pub fn introspect(&self) -> IntrospectionNode {
        introspect(&self.router)
    }

    /// Run a call and return its raw result, errors not yet prepared for a caller.
    pub async fn call(
        &self,
        route: &str,
        kind: ProcedureType,
        input: Value,
        ctx: Context<Ctx>,
    ) -> RpcResult<Value> {
        let request_id = RequestId::new();
        let span = debug_span!("rpc.dispatch", route = %route, kind = %kind, request_id = %request_id);
        self.run(route, kind, input, ctx, request_id)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        route: &str,
        kind: ProcedureType,
        input: Value,
        ctx: Context<Ctx>,
        request_id: RequestId,
    ) -> RpcResult<Value> {
        let Some(procedure) = self.router.procedure(route) else {
            debug!("Route does not resolve to a procedure");
            return Err(RpcError::route_not_found(route));
        };
        if procedure.kind() != kind {
            debug!(expected = %procedure.kind(), "Procedure type mismatch");
            return Err(RpcError::method_not_supported(format!(
                "'{route}' is a {}, not a {kind}",
                procedure.kind()
            )));
        }
        validate_input_size(&input, &self.config)?;

        let exec = Arc::new(Execution {
            procedure: Arc::clone(procedure),
            parser: Arc::clone(&self.parser),
        });
        let chain = chain::execute(exec, ctx, route.to_string(), kind, input, request_id);
        let timeout = self.config.request_timeout();
        let bounded = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, chain).await.unwrap_or_else(|_| {
                    warn!(timeout_ms = limit.as_millis() as u64, "Request timed out");
                    Err(RpcError::timeout(format!(
                        "Request exceeded {} ms",
                        limit.as_millis()
                    )))
                }),
                None => chain.await,
            }
        };

        // Backstop for panics outside any step, e.g. in input transforms or
        // a timer created without a tokio runtime.
        let result = AssertUnwindSafe(bounded)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(chain::panic_error(panic)));
        result.map(Response::into_data)
    }

    /// Run a call and wrap the outcome in an envelope.
    pub async fn dispatch(
        &self,
        route: &str,
        kind: ProcedureType,
        input: Value,
        ctx: Context<Ctx>,
    ) -> ResultEnvelope {
        let result = self.call(route, kind, input, ctx).await;
        self.envelope(route, result)
    }

    /// Dispatch a call envelope.
    pub async fn handle(&self, call: CallEnvelope, ctx: Context<Ctx>) -> ResultEnvelope {
        self.dispatch(&call.route, call.kind, call.input, ctx).await
    }

    /// Build the initial context with `builder`, then dispatch.
    ///
    /// A failing context builder fails the request with its error.
    pub async fn serve<Raw, B>(&self, builder: &B, raw: Raw, call: CallEnvelope) -> ResultEnvelope
    where
        Raw: Send + 'static,
        B: ContextBuilder<Raw, Ctx> + ?Sized,
    {
        match builder.build(raw).await {
            Ok(ctx) => self.handle(call, ctx).await,
            Err(e) => {
                debug!(route = %call.route, error_code = %e.code, "Context builder rejected request");
                self.envelope(&call.route, Err(e))
            }
        }
    }

    /// Dispatch every call of a batch with the same initial context.
    ///
    /// Only batch-level problems (empty, too large) fail the whole batch.
    pub async fn dispatch_batch(
        &self,
        batch: BatchRequest,
        ctx: Context<Ctx>,
    ) -> RpcResult<BatchResponse> {
        batch.validate(&self.config.batch_config)?;

        let results = if self.config.batch_config.parallel_execution {
            join_all(batch.requests.into_iter().map(|request| {
                let ctx = ctx.clone();
                async move {
                    BatchResult {
                        id: request.id,
                        result: self.handle(request.call, ctx).await,
                    }
                }
            }))
            .await
        } else {
            let mut results = Vec::with_capacity(batch.requests.len());
            for request in batch.requests {
                results.push(BatchResult {
                    id: request.id,
                    result: self.handle(request.call, ctx.clone()).await,
                });
            }
            results
        };

        Ok(BatchResponse { results })
    }

    fn envelope(&self, route: &str, result: RpcResult<Value>) -> ResultEnvelope {
        if let Err(e) = &result {
            if e.code.is_server_error() {
                error!(route = %route, error_code = %e.code, error_message = %e.message, cause = ?e.cause, "RPC call failed");
            } else {
                debug!(route = %route, error_code = %e.code, error_message = %e.message, "RPC call rejected");
            }
        }
        let envelope = ResultEnvelope::from_result(result, &self.error_config);
        if self.config.debug_logging {
            debug!(route = %route, status = envelope.status(), envelope = ?envelope, "RPC call finished");
        }
        envelope
    }
}
