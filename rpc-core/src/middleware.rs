//! Middleware support
//!
//! Middleware wraps a procedure in onion order: each step receives the
//! current [`Context`], the [`Request`] metadata and a [`Next`] continuation.
//! A step either calls `next` (optionally with a [`ContextPatch`]) or returns
//! without calling it, which short-circuits the chain.
//!
//! `Next` is consumed when run, so a step can continue the chain at most once.
//! Input validation happens before the first step, so a request with
//! invalid input never reaches any middleware.
//!
//! # Example
//! ```rust,ignore
//! use rpc_core::prelude::*;
//!
//! let auth = from_fn(|ctx: Context<AppState>, _req: Request, next: Next<AppState>| async move {
//!     match ctx.get("token").and_then(|t| t.as_str()) {
//!         Some("secret") => next.run_with(ContextPatch::new().set("userId", 1)).await,
//!         _ => Err(RpcError::unauthorized("Missing or invalid token")),
//!     }
//! });
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{Context, ContextPatch};
use crate::error::RpcResult;
use crate::logging::RequestId;
use crate::router::chain::{self, Execution};

/// Procedure type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureType {
    Query,
    Mutation,
}

impl ProcedureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

impl fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request metadata passed to every middleware.
///
/// The input is decoded and transformed before the first step runs, so
/// every middleware and the handler see the same `input`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// The dotted route that was called.
    pub path: String,
    pub procedure_type: ProcedureType,
    /// The validated, transformed input.
    pub input: Value,
    /// The input as the caller sent it.
    pub raw_input: Value,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Downstream,
    Middleware,
}

/// The value a chain step resolves to.
///
/// A response either came back from `next` or was created by a middleware
/// that short-circuited. Mapping a downstream response keeps it downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    data: Value,
    origin: Origin,
}

impl Response {
    /// A short-circuit response created by a middleware.
    pub fn new(data: Value) -> Self {
        Self {
            data,
            origin: Origin::Middleware,
        }
    }

    /// A short-circuit response from any serializable value.
    pub fn json(data: &impl Serialize) -> RpcResult<Self> {
        Ok(Self::new(serde_json::to_value(data)?))
    }

    pub(crate) fn downstream(data: Value) -> Self {
        Self {
            data,
            origin: Origin::Downstream,
        }
    }

    fn into_downstream(mut self) -> Self {
        self.origin = Origin::Downstream;
        self
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_data(self) -> Value {
        self.data
    }

    /// Rewrite the payload, keeping where it came from.
    #[must_use]
    pub fn map(self, f: impl FnOnce(Value) -> Value) -> Self {
        Self {
            data: f(self.data),
            origin: self.origin,
        }
    }

    /// Whether this response was produced further down the chain.
    pub fn is_downstream(&self) -> bool {
        self.origin == Origin::Downstream
    }
}

const NOT_CALLED: u8 = 0;
const SUCCEEDED: u8 = 1;
const FAILED: u8 = 2;

/// How a step's continuation ended, shared between the step and the executor.
#[derive(Debug, Clone, Default)]
pub(crate) struct Outcome(Arc<AtomicU8>);

impl Outcome {
    fn record(&self, ok: bool) {
        self.0
            .store(if ok { SUCCEEDED } else { FAILED }, Ordering::SeqCst);
    }

    /// `next` ran and produced a response.
    pub(crate) fn succeeded(&self) -> bool {
        self.0.load(Ordering::SeqCst) == SUCCEEDED
    }

    pub(crate) fn was_called(&self) -> bool {
        self.0.load(Ordering::SeqCst) != NOT_CALLED
    }
}

/// Continuation to the rest of the chain.
pub struct Next<Ctx> {
    exec: Arc<Execution<Ctx>>,
    index: usize,
    ctx: Context<Ctx>,
    request: Request,
    outcome: Outcome,
}

impl<Ctx> Next<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    pub(crate) fn new(
        exec: Arc<Execution<Ctx>>,
        index: usize,
        ctx: Context<Ctx>,
        request: Request,
        outcome: Outcome,
    ) -> Self {
        Self {
            exec,
            index,
            ctx,
            request,
            outcome,
        }
    }

    /// Continue with the context unchanged.
    pub async fn run(self) -> RpcResult<Response> {
        self.run_with(ContextPatch::new()).await
    }

    /// Continue with `patch` merged into the context seen downstream.
    pub async fn run_with(self, patch: ContextPatch) -> RpcResult<Response> {
        let ctx = self.ctx.merge(patch);
        let result = chain::run_from(self.exec, self.index, ctx, self.request).await;
        self.outcome.record(result.is_ok());
        result.map(Response::into_downstream)
    }

    /// The context downstream steps will see before any patch.
    pub fn context(&self) -> &Context<Ctx> {
        &self.ctx
    }
}

/// A chain step.
pub trait Middleware<Ctx>: Send + Sync
where
    Ctx: Send + Sync + 'static,
{
    fn handle(
        &self,
        ctx: Context<Ctx>,
        request: Request,
        next: Next<Ctx>,
    ) -> BoxFuture<'static, RpcResult<Response>>;
}

impl<Ctx, F, Fut> Middleware<Ctx> for F
where
    Ctx: Send + Sync + 'static,
    F: Fn(Context<Ctx>, Request, Next<Ctx>) -> Fut + Send + Sync,
    Fut: Future<Output = RpcResult<Response>> + Send + 'static,
{
    fn handle(
        &self,
        ctx: Context<Ctx>,
        request: Request,
        next: Next<Ctx>,
    ) -> BoxFuture<'static, RpcResult<Response>> {
        Box::pin((self)(ctx, request, next))
    }
}

/// Shared, type-erased middleware.
pub type MiddlewareFn<Ctx> = Arc<dyn Middleware<Ctx>>;

/// Wrap an async closure as shareable middleware.
pub fn from_fn<Ctx, F, Fut>(f: F) -> MiddlewareFn<Ctx>
where
    Ctx: Send + Sync + 'static,
    F: Fn(Context<Ctx>, Request, Next<Ctx>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Response>> + Send + 'static,
{
    Arc::new(f)
}
