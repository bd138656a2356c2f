//! Chain execution.
//!
//! The raw input is decoded and transformed first; a request that fails
//! there never reaches a step. Steps then run strictly in declaration
//! order. A context derivation step is folded into the context in place; a
//! middleware step gets a [`Next`] that resumes execution at the following
//! step. Once the steps are exhausted the handler runs, exactly once.
//!
//! A panic in a middleware or the handler is turned into an
//! `INTERNAL_SERVER_ERROR` right where it happens, so enclosing middleware
//! sees it as an ordinary `Err`.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{error, trace};

use crate::context::{Context, ContextTransform};
use crate::error::{ConfigurationError, RpcError, RpcResult};
use crate::logging::RequestId;
use crate::middleware::{MiddlewareFn, Next, Outcome, ProcedureType, Request, Response};
use crate::procedure::Procedure;
use crate::schema::SchemaParser;

/// One step of a procedure's chain.
pub(crate) enum Step<Ctx> {
    Middleware(MiddlewareFn<Ctx>),
    Derive(ContextTransform<Ctx>),
}

impl<Ctx> Clone for Step<Ctx> {
    fn clone(&self) -> Self {
        match self {
            Self::Middleware(m) => Self::Middleware(Arc::clone(m)),
            Self::Derive(d) => Self::Derive(Arc::clone(d)),
        }
    }
}

/// Everything a running chain needs, shared by all of its `Next` handles.
pub(crate) struct Execution<Ctx> {
    pub(crate) procedure: Arc<Procedure<Ctx>>,
    pub(crate) parser: Arc<dyn SchemaParser>,
}

/// Decode the input, then run a procedure's whole chain.
pub(crate) async fn execute<Ctx>(
    exec: Arc<Execution<Ctx>>,
    ctx: Context<Ctx>,
    path: String,
    procedure_type: ProcedureType,
    raw_input: Value,
    request_id: RequestId,
) -> RpcResult<Response>
where
    Ctx: Send + Sync + 'static,
{
    let input = exec
        .procedure
        .decode_input(&raw_input, exec.parser.as_ref())?;
    let request = Request {
        path,
        procedure_type,
        input,
        raw_input,
        request_id,
    };
    run_from(exec, 0, ctx, request).await
}

/// Run the chain starting at step `start`.
pub(crate) fn run_from<Ctx>(
    exec: Arc<Execution<Ctx>>,
    start: usize,
    ctx: Context<Ctx>,
    request: Request,
) -> BoxFuture<'static, RpcResult<Response>>
where
    Ctx: Send + Sync + 'static,
{
    Box::pin(async move {
        let mut ctx = ctx;
        let mut index = start;

        while let Some(step) = exec.procedure.steps().get(index) {
            match step {
                Step::Derive(derive) => {
                    trace!(step = index, "Deriving context");
                    let patch = std::panic::catch_unwind(AssertUnwindSafe(|| derive(&ctx)))
                        .unwrap_or_else(|panic| Err(panic_error(panic)))?;
                    ctx = ctx.merge(patch);
                    index += 1;
                }
                Step::Middleware(middleware) => {
                    trace!(step = index, "Entering middleware");
                    let outcome = Outcome::default();
                    let route = request.path.clone();
                    let next = Next::new(
                        Arc::clone(&exec),
                        index + 1,
                        ctx.clone(),
                        request.clone(),
                        outcome.clone(),
                    );
                    let result =
                        contain_panic(async move { middleware.handle(ctx, request, next).await })
                            .await;
                    return enforce_contract(result, &outcome, &route, index);
                }
            }
        }

        trace!("Chain complete, invoking procedure");
        contain_panic(async move {
            exec.procedure
                .invoke(ctx, request.input, exec.parser.as_ref())
                .await
                .map(Response::downstream)
        })
        .await
    })
}

async fn contain_panic<F>(step: F) -> RpcResult<Response>
where
    F: Future<Output = RpcResult<Response>>,
{
    AssertUnwindSafe(step)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(panic_error(panic)))
}

/// The error a caught panic becomes. The panic message is kept as the cause.
pub(crate) fn panic_error(panic: Box<dyn Any + Send>) -> RpcError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    error!(panic = %message, "Panic while executing procedure");
    RpcError::internal("Internal server error").with_cause(format!("panic: {message}"))
}

/// A step whose `next` produced a response must return that response (or
/// an error); returning a fresh one would silently discard downstream work.
fn enforce_contract(
    result: RpcResult<Response>,
    outcome: &Outcome,
    route: &str,
    step: usize,
) -> RpcResult<Response> {
    match result {
        Ok(response) if outcome.succeeded() && !response.is_downstream() => {
            let violation = ConfigurationError::MiddlewareContract {
                route: route.to_string(),
                step,
                reason: "called next but returned a different response".to_string(),
            };
            error!(route = %route, step, "{violation}");
            Err(RpcError::internal("Middleware contract violation").with_cause(violation.to_string()))
        }
        Ok(response) => {
            if !outcome.was_called() {
                trace!(route = %route, step, "Middleware short-circuited the chain");
            }
            Ok(response)
        }
        Err(e) => Err(e),
    }
}
