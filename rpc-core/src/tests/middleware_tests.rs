//! Middleware tests - onion ordering, short-circuits, context patches and
//! the continuation contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use serde_json::{Value, json};

use super::{context_dump, counting, dispatcher, echo};
use crate::transform::tuple_to_object;
use crate::{
    Context, ContextPatch, EmptyContext, LogConfig, MiddlewareFn, Next, Procedure, ProcedureType,
    Request, Response, ResultEnvelope, Router, RpcError, RpcErrorCode, RpcResult, TypeSchema,
    from_fn, logging_middleware,
};

// =============================================================================
// Test Helpers
// =============================================================================

type Log = Arc<Mutex<Vec<String>>>;

/// Middleware that records entry and exit around `next`.
fn recording(name: String, log: Log) -> MiddlewareFn<EmptyContext> {
    from_fn(
        move |_ctx: Context<EmptyContext>, _req: Request, next: Next<EmptyContext>| {
            let name = name.clone();
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("{name}_enter"));
                let result = next.run().await;
                log.lock().unwrap().push(format!("{name}_exit"));
                result
            }
        },
    )
}

/// Middleware that merges `patch` into the downstream context.
fn patching(patch: ContextPatch) -> MiddlewareFn<EmptyContext> {
    from_fn(
        move |_ctx: Context<EmptyContext>, _req: Request, next: Next<EmptyContext>| {
            next.run_with(patch.clone())
        },
    )
}

fn counting_handler(
    counter: Arc<AtomicUsize>,
) -> impl Fn(Context<EmptyContext>, Value) -> futures::future::Ready<RpcResult<Value>>
+ Clone
+ Send
+ Sync
+ 'static {
    move |_ctx: Context<EmptyContext>, input: Value| {
        counter.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(input))
    }
}

async fn run(procedure: Procedure<EmptyContext>, input: Value) -> ResultEnvelope {
    dispatcher(Router::builder().procedure("target", procedure))
        .dispatch("target", ProcedureType::Query, input, Context::default())
        .await
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn middleware_runs_in_onion_order() {
    let log: Log = Arc::default();
    let handler_log = log.clone();

    let procedure = Procedure::builder()
        .use_middleware_fn(recording("inner1".into(), log.clone()))
        .use_middleware_fn(recording("inner2".into(), log.clone()))
        .query(move |_ctx: Context<EmptyContext>, input: Value| {
            let log = handler_log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                Ok::<_, RpcError>(input)
            }
        });
    let router = Router::builder()
        .use_middleware_fn(recording("outer".into(), log.clone()))
        .procedure("target", procedure);

    let envelope = dispatcher(router)
        .dispatch("target", ProcedureType::Query, json!(1), Context::default())
        .await;

    assert!(envelope.is_ok());
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "outer_enter",
            "inner1_enter",
            "inner2_enter",
            "handler",
            "inner2_exit",
            "inner1_exit",
            "outer_exit",
        ]
    );
}

#[tokio::test]
async fn invalid_input_never_reaches_middleware() {
    let seen = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let procedure = Procedure::builder()
        .input(TypeSchema::object().with_required_property("id", TypeSchema::integer()))
        .use_middleware_fn(counting(seen.clone()))
        .query(counting_handler(handled.clone()));
    let router = Router::builder()
        .use_middleware_fn(counting(seen.clone()))
        .procedure("target", procedure);

    let envelope = dispatcher(router)
        .dispatch("target", ProcedureType::Query, json!({"id": "not a number"}), Context::default())
        .await;

    assert_eq!(envelope.error().unwrap().code, RpcErrorCode::BadRequest);
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn middleware_sees_request_metadata() {
    let procedure = Procedure::builder()
        .use_middleware(
            |_ctx: Context<EmptyContext>, req: Request, _next: Next<EmptyContext>| async move {
                Response::json(&json!({
                    "path": req.path,
                    "type": req.procedure_type,
                    "input": req.input,
                    "raw": req.raw_input,
                }))
            },
        )
        .query(echo);

    let envelope = run(procedure, json!({"raw": true})).await;
    assert_eq!(
        envelope.data(),
        Some(&json!({
            "path": "target",
            "type": "query",
            "input": {"raw": true},
            "raw": {"raw": true},
        }))
    );
}

#[tokio::test]
async fn middleware_sees_transformed_input() {
    let procedure = Procedure::builder()
        .input(TypeSchema::array(TypeSchema::any()))
        .transform_input(tuple_to_object(&["name", "age"]))
        .use_middleware(
            |_ctx: Context<EmptyContext>, req: Request, _next: Next<EmptyContext>| async move {
                Response::json(&json!({"input": req.input, "raw": req.raw_input}))
            },
        )
        .query(echo);

    let envelope = run(procedure, json!(["Ada", 36])).await;
    assert_eq!(
        envelope.data(),
        Some(&json!({"input": {"name": "Ada", "age": 36}, "raw": ["Ada", 36]}))
    );
}

// =============================================================================
// Short-circuits and errors
// =============================================================================

#[tokio::test]
async fn short_circuit_skips_the_rest_of_the_chain() {
    let later = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));

    let procedure = Procedure::builder()
        .use_middleware(
            |_ctx: Context<EmptyContext>, _req: Request, _next: Next<EmptyContext>| async move {
                Ok::<_, RpcError>(Response::new(json!("cached")))
            },
        )
        .use_middleware_fn(counting(later.clone()))
        .query(counting_handler(handled.clone()));

    let envelope = run(procedure, Value::Null).await;

    assert_eq!(envelope.data(), Some(&json!("cached")));
    assert_eq!(later.load(Ordering::SeqCst), 0);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn middleware_error_fails_the_request() {
    let handled = Arc::new(AtomicUsize::new(0));

    let procedure = Procedure::builder()
        .use_middleware(
            |_ctx: Context<EmptyContext>, _req: Request, _next: Next<EmptyContext>| async move {
                Err::<Response, _>(RpcError::unauthorized("Missing token"))
            },
        )
        .query(counting_handler(handled.clone()));

    let envelope = run(procedure, Value::Null).await;

    assert_eq!(envelope.error().unwrap().code, RpcErrorCode::Unauthorized);
    assert_eq!(envelope.status(), 401);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn middleware_can_rewrite_downstream_result() {
    let procedure = Procedure::builder()
        .use_middleware(
            |_ctx: Context<EmptyContext>, _req: Request, next: Next<EmptyContext>| async move {
                let response = next.run().await?;
                Ok::<_, RpcError>(response.map(|data| json!({"wrapped": data})))
            },
        )
        .query(echo);

    let envelope = run(procedure, json!(5)).await;
    assert_eq!(envelope.data(), Some(&json!({"wrapped": 5})));
}

#[tokio::test]
async fn middleware_can_recover_from_downstream_error() {
    async fn failing(_ctx: Context<EmptyContext>, _input: Value) -> RpcResult<Value> {
        Err(RpcError::conflict("already exists"))
    }

    let procedure = Procedure::builder()
        .use_middleware(
            |_ctx: Context<EmptyContext>, _req: Request, next: Next<EmptyContext>| async move {
                match next.run().await {
                    Err(e) if e.code == RpcErrorCode::Conflict => {
                        Ok(Response::new(json!("fallback")))
                    }
                    other => other,
                }
            },
        )
        .query(failing);

    let envelope = run(procedure, Value::Null).await;
    assert_eq!(envelope.data(), Some(&json!("fallback")));
}

#[tokio::test]
async fn replacing_a_successful_result_breaks_the_contract() {
    let procedure = Procedure::builder()
        .use_middleware(
            |_ctx: Context<EmptyContext>, _req: Request, next: Next<EmptyContext>| async move {
                let _discarded = next.run().await?;
                Ok::<_, RpcError>(Response::new(json!("something else")))
            },
        )
        .query(echo);
    let dispatcher = dispatcher(Router::builder().procedure("target", procedure));

    let error = dispatcher
        .call("target", ProcedureType::Query, json!(1), Context::default())
        .await
        .unwrap_err();

    assert_eq!(error.code, RpcErrorCode::InternalServerError);
    assert!(error.cause.as_deref().unwrap().contains("middleware #0 on 'target'"));
}

// =============================================================================
// Context patches
// =============================================================================

#[tokio::test]
async fn patches_union_and_later_keys_win() {
    let procedure = Procedure::builder()
        .use_middleware_fn(patching(ContextPatch::new().set("a", 1).set("b", 1)))
        .use_middleware_fn(patching(ContextPatch::new().set("b", 2).set("c", 3)))
        .query(context_dump);

    let envelope = run(procedure, Value::Null).await;
    assert_eq!(envelope.data(), Some(&json!({"a": 1, "b": 2, "c": 3})));
}

#[tokio::test]
async fn patches_are_not_visible_upstream() {
    let observed: Arc<Mutex<Option<bool>>> = Arc::default();
    let observer = observed.clone();

    let procedure = Procedure::builder()
        .use_middleware(
            move |ctx: Context<EmptyContext>, _req: Request, next: Next<EmptyContext>| {
                let observer = observer.clone();
                async move {
                    let result = next.run().await;
                    *observer.lock().unwrap() = Some(ctx.contains("userId"));
                    result
                }
            },
        )
        .use_middleware_fn(patching(ContextPatch::new().set("userId", 7)))
        .query(context_dump);

    let envelope = run(procedure, Value::Null).await;

    assert_eq!(envelope.data(), Some(&json!({"userId": 7})));
    assert_eq!(*observed.lock().unwrap(), Some(false));
}

#[tokio::test]
async fn derive_context_reads_earlier_patches() {
    let procedure = Procedure::builder()
        .use_middleware_fn(patching(ContextPatch::new().set("userId", 42)))
        .derive_context(|ctx: &Context<EmptyContext>| {
            let user_id = ctx
                .get_as::<u64>("userId")?
                .ok_or_else(|| RpcError::unauthorized("No user"))?;
            Ok(ContextPatch::new().set("isAdmin", user_id == 42))
        })
        .query(context_dump);

    let envelope = run(procedure, Value::Null).await;
    assert_eq!(envelope.data(), Some(&json!({"userId": 42, "isAdmin": true})));
}

#[tokio::test]
async fn failing_derivation_aborts_the_chain() {
    let handled = Arc::new(AtomicUsize::new(0));

    let procedure = Procedure::builder()
        .derive_context(|ctx: &Context<EmptyContext>| {
            if ctx.contains("userId") {
                Ok(ContextPatch::new())
            } else {
                Err(RpcError::unauthorized("Sign in first"))
            }
        })
        .query(counting_handler(handled.clone()));

    let envelope = run(procedure, Value::Null).await;
    assert_eq!(envelope.error().unwrap().code, RpcErrorCode::Unauthorized);
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Built-in middleware
// =============================================================================

#[tokio::test]
async fn logging_middleware_is_transparent() {
    let procedure = Procedure::builder()
        .use_middleware_fn(logging_middleware(
            LogConfig::new().redact_field("password"),
        ))
        .query(echo);

    let envelope = run(procedure, json!({"user": "ada", "password": "hunter2"})).await;
    assert_eq!(
        envelope.data(),
        Some(&json!({"user": "ada", "password": "hunter2"}))
    );
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// For any chain length, entry order is declaration order and exit
    /// order is its reverse, with the handler in between.
    #[test]
    fn prop_onion_order(count in 1usize..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let log = rt.block_on(async {
            let log: Log = Arc::default();
            let mut builder = Procedure::builder();
            for i in 0..count {
                builder = builder.use_middleware_fn(recording(format!("m{i}"), log.clone()));
            }
            let envelope = run(builder.query(echo), Value::Null).await;
            assert!(envelope.is_ok());
            let entries = log.lock().unwrap().clone();
            entries
        });

        let mut expected: Vec<String> = (0..count).map(|i| format!("m{i}_enter")).collect();
        expected.extend((0..count).rev().map(|i| format!("m{i}_exit")));
        prop_assert_eq!(log, expected);
    }

    /// A short-circuit at any position stops every later step.
    #[test]
    fn prop_short_circuit_position(total in 1usize..6, position in 0usize..6) {
        let position = position % total;
        let rt = tokio::runtime::Runtime::new().unwrap();
        let (data, ran) = rt.block_on(async {
            let counters: Vec<Arc<AtomicUsize>> =
                (0..total).map(|_| Arc::new(AtomicUsize::new(0))).collect();
            let mut builder = Procedure::builder();
            for (i, counter) in counters.iter().enumerate() {
                if i == position {
                    builder = builder.use_middleware(
                        move |_ctx: Context<EmptyContext>, _req: Request, _next: Next<EmptyContext>| async move {
                            Ok::<_, RpcError>(Response::new(json!({"stoppedAt": i})))
                        },
                    );
                } else {
                    builder = builder.use_middleware_fn(counting(counter.clone()));
                }
            }
            let envelope = run(builder.query(echo), Value::Null).await;
            let ran: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();
            (envelope.data().cloned(), ran)
        });

        prop_assert_eq!(data, Some(json!({"stoppedAt": position})));
        for (i, count) in ran.into_iter().enumerate() {
            let expected = usize::from(i < position);
            prop_assert_eq!(count, expected);
        }
    }

    /// Keys patched along the chain are all visible to the handler, and a
    /// colliding key keeps the value written last.
    #[test]
    fn prop_patches_accumulate(values in prop::collection::vec(0i64..1000, 1..6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let data = rt.block_on(async {
            let mut builder = Procedure::builder();
            for (i, value) in values.iter().enumerate() {
                builder = builder.use_middleware_fn(patching(
                    ContextPatch::new().set(format!("k{i}"), *value).set("last", *value),
                ));
            }
            run(builder.query(context_dump), Value::Null).await.into_result().unwrap()
        });

        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(&data[format!("k{i}")], &json!(value));
        }
        prop_assert_eq!(&data["last"], &json!(values.last().unwrap()));
    }
}
