//! In-process demo: a scripted client talks to the application router
//! through the dispatcher, the way a transport adapter would.

mod rpc;

use std::error::Error;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use rpc::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "rpc_demo=info,rpc_core=info".into()))
        .with(fmt::layer())
        .init();

    let config = RpcConfig::new()
        .with_max_input_size(64 * 1024)
        .with_request_timeout_ms(5_000);
    let dispatcher = Dispatcher::new(create_router()?)
        .with_config(config)?
        .with_error_config(ErrorConfig::production());
    let builder = HeaderContextBuilder::new(Arc::new(AppContext::new()));

    info!(procedures = dispatcher.router().procedures().len(), "Router ready");

    let anonymous = TransportRequest::default;
    let admin = || TransportRequest::default().with_header("Authorization", "Bearer admin-token");

    let script = vec![
        (anonymous(), CallEnvelope::query("health", json!(null))),
        (anonymous(), CallEnvelope::query("greetings", json!({"firstName": "John"}))),
        (anonymous(), CallEnvelope::query("greetings", json!({"firstName": "Jo"}))),
        (anonymous(), CallEnvelope::query("users.list", json!({}))),
        (
            anonymous(),
            CallEnvelope::mutation("users.create", json!({"name": "Carol", "email": "carol@example.com"})),
        ),
        (
            anonymous(),
            CallEnvelope::mutation("users.create", json!({"name": "", "email": "not-an-email"})),
        ),
        (anonymous(), CallEnvelope::query("users.get", json!({"id": 3}))),
        (anonymous(), CallEnvelope::mutation("users.admin.delete", json!({"id": 2}))),
        (admin(), CallEnvelope::mutation("users.admin.delete", json!({"id": 2}))),
        (anonymous(), CallEnvelope::query("users.missing", json!(null))),
        (anonymous(), CallEnvelope::mutation("health", json!(null))),
    ];

    for (request, call) in script {
        let route = call.route.clone();
        let envelope = dispatcher.serve(&builder, request, call).await;
        info!(route = %route, status = envelope.status(), "Call finished");
        println!("{route:<20} {}", serde_json::to_string(&envelope)?);
    }

    let batch = BatchRequest::new()
        .add("a", CallEnvelope::query("users.get", json!({"id": 1})))
        .add("b", CallEnvelope::query("users.get", json!({"id": 99})));
    let results = dispatcher
        .dispatch_batch(batch, Context::new(AppContext::new()))
        .await?;
    info!(
        succeeded = results.success_count(),
        failed = results.error_count(),
        "Batch finished"
    );
    println!("{}", serde_json::to_string_pretty(&results)?);

    println!("{}", dispatcher.introspect().to_json_pretty()?);
    Ok(())
}
