//! Test module for rpc-core
//!
//! Example-based and property-based tests (proptest) for dispatch,
//! middleware chains, validation, introspection and batching.

mod middleware_tests;
mod validation_tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::{
    Context, Dispatcher, EmptyContext, MiddlewareFn, Next, Request, RouterBuilder, RpcResult,
    from_fn,
};

// =============================================================================
// Shared helpers
// =============================================================================

/// Returns its input unchanged.
pub(crate) async fn echo(_ctx: Context<EmptyContext>, input: Value) -> RpcResult<Value> {
    Ok(input)
}

/// Returns the context values seen by the handler as an object.
pub(crate) async fn context_dump(ctx: Context<EmptyContext>, _input: Value) -> RpcResult<Value> {
    Ok(Value::Object(
        ctx.values()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    ))
}

/// Middleware that counts how often it runs and passes through.
pub(crate) fn counting(counter: Arc<AtomicUsize>) -> MiddlewareFn<EmptyContext> {
    from_fn(
        move |_ctx: Context<EmptyContext>, _req: Request, next: Next<EmptyContext>| {
            counter.fetch_add(1, Ordering::SeqCst);
            next.run()
        },
    )
}

pub(crate) fn dispatcher(router: RouterBuilder<EmptyContext>) -> Dispatcher<EmptyContext> {
    Dispatcher::new(router.build().expect("router should build"))
}
