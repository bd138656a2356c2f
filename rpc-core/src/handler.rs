//! Handler traits and utilities
//!
//! A handler is the terminal step of a procedure: an async function from
//! the final [`Context`] and a typed input to a serializable output. Handlers
//! are type-erased into [`BoxedHandler`] when a procedure is built.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{trace, warn};

use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::validation::Validate;

/// Type-erased handler stored in a procedure.
pub(crate) type BoxedHandler<Ctx> =
    Arc<dyn Fn(Context<Ctx>, Value) -> BoxFuture<'static, RpcResult<Value>> + Send + Sync>;

/// Trait for handler functions
///
/// Automatically implemented for async functions with the signature:
/// `async fn(Context<Ctx>, Input) -> RpcResult<Output>`
pub trait Handler<Ctx, Input, Output>: Clone + Send + Sync + 'static
where
    Ctx: Send + Sync + 'static,
    Input: DeserializeOwned + Send + 'static,
    Output: Serialize + Send + 'static,
{
    /// The future type returned by the handler
    type Future: Future<Output = RpcResult<Output>> + Send;

    /// Call the handler with context and input
    fn call(&self, ctx: Context<Ctx>, input: Input) -> Self::Future;
}

impl<Ctx, Input, Output, F, Fut> Handler<Ctx, Input, Output> for F
where
    Ctx: Send + Sync + 'static,
    Input: DeserializeOwned + Send + 'static,
    Output: Serialize + Send + 'static,
    F: Fn(Context<Ctx>, Input) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Output>> + Send + 'static,
{
    type Future = Fut;

    fn call(&self, ctx: Context<Ctx>, input: Input) -> Self::Future {
        (self)(ctx, input)
    }
}

/// Deserialize the (already schema-checked) input into the handler's type.
fn decode_input<Input: DeserializeOwned>(value: Value) -> RpcResult<Input> {
    serde_json::from_value(value).map_err(|e| {
        warn!(error = %e, "Handler input deserialization failed");
        RpcError::bad_request(format!("Invalid input: {e}"))
    })
}

fn encode_output<Output: Serialize>(output: Output) -> RpcResult<Value> {
    serde_json::to_value(output).map_err(|e| {
        warn!(error = %e, "Handler output serialization failed");
        RpcError::internal("Failed to serialize handler output").with_cause(e.to_string())
    })
}

/// Convert a handler into a boxed handler for storage.
pub(crate) fn into_boxed<Ctx, Input, Output, H>(handler: H) -> BoxedHandler<Ctx>
where
    Ctx: Send + Sync + 'static,
    Input: DeserializeOwned + Send + 'static,
    Output: Serialize + Send + 'static,
    H: Handler<Ctx, Input, Output>,
{
    Arc::new(move |ctx, input_value| {
        let handler = handler.clone();
        Box::pin(async move {
            let input: Input = decode_input(input_value)?;
            trace!("Executing handler");
            let output = handler.call(ctx, input).await.inspect_err(|e| {
                warn!(error_code = %e.code, error_message = %e.message, "Handler execution failed");
            })?;
            encode_output(output)
        })
    })
}

/// Convert a handler into a boxed handler that runs [`Validate`] on its
/// input first. Failures are `BAD_REQUEST` with every field error attached.
pub(crate) fn into_boxed_validated<Ctx, Input, Output, H>(handler: H) -> BoxedHandler<Ctx>
where
    Ctx: Send + Sync + 'static,
    Input: DeserializeOwned + Validate + Send + 'static,
    Output: Serialize + Send + 'static,
    H: Handler<Ctx, Input, Output>,
{
    Arc::new(move |ctx, input_value| {
        let handler = handler.clone();
        Box::pin(async move {
            let input: Input = decode_input(input_value)?;
            input.validate().into_result()?;
            let output = handler.call(ctx, input).await.inspect_err(|e| {
                warn!(error_code = %e.code, error_message = %e.message, "Handler execution failed");
            })?;
            encode_output(output)
        })
    })
}
