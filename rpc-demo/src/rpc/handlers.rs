//! RPC handlers and router definition

use rpc_core::prelude::*;
use rpc_core::transform::map_string;
use serde_json::Value;
use tracing::info;

use super::context::AppContext;
use super::types::*;

// =============================================================================
// General Handlers
// =============================================================================

async fn health(_ctx: Context<AppContext>, _input: Value) -> RpcResult<HealthResponse> {
    Ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn greet(_ctx: Context<AppContext>, input: GreetInput) -> RpcResult<String> {
    Ok(format!("Hello, {}", input.first_name))
}

// =============================================================================
// User Handlers
// =============================================================================

async fn get_user(ctx: Context<AppContext>, input: UserIdInput) -> RpcResult<User> {
    ctx.db
        .get_user(input.id)
        .await
        .ok_or_else(|| RpcError::not_found(format!("User {} not found", input.id)))
}

async fn list_users(ctx: Context<AppContext>, input: ListUsersInput) -> RpcResult<Vec<User>> {
    Ok(ctx.db.list_users(input.since).await)
}

async fn create_user(ctx: Context<AppContext>, input: CreateUserInput) -> RpcResult<User> {
    let user = ctx.db.create_user(&input.name, &input.email).await?;
    info!(user_id = user.id, "User created");
    Ok(user)
}

async fn update_user(ctx: Context<AppContext>, input: UpdateUserInput) -> RpcResult<User> {
    ctx.db
        .update_user(input.id, input.name.as_deref(), input.email.as_deref())
        .await
        .ok_or_else(|| RpcError::not_found(format!("User {} not found", input.id)))
}

async fn delete_user(ctx: Context<AppContext>, input: UserIdInput) -> RpcResult<bool> {
    let admin = ctx
        .get_as::<u64>("userId")?
        .ok_or_else(|| RpcError::unauthorized("Not signed in"))?;
    if !ctx.db.delete_user(input.id).await {
        return Err(RpcError::not_found(format!("User {} not found", input.id)));
    }
    info!(user_id = input.id, admin, "User deleted");
    Ok(true)
}

// =============================================================================
// Middleware
// =============================================================================

/// Only the `admin-token` bearer gets through; it acts as user 1.
fn require_admin() -> MiddlewareFn<AppContext> {
    from_fn(
        |ctx: Context<AppContext>, _req: Request, next: Next<AppContext>| async move {
            match ctx.get("token").and_then(Value::as_str) {
                Some("admin-token") => next.run_with(ContextPatch::new().set("userId", 1)).await,
                Some(_) => Err(RpcError::forbidden("Admin access required")),
                None => Err(RpcError::unauthorized("Missing bearer token")),
            }
        },
    )
}

// =============================================================================
// Router
// =============================================================================

fn user_id_schema() -> TypeSchema {
    TypeSchema::object()
        .with_required_property("id", TypeSchema::integer().with_minimum(1.0))
}

fn users_router() -> RouterBuilder<AppContext> {
    Router::builder()
        .procedure("get", Procedure::builder().input(user_id_schema()).query(get_user))
        .procedure(
            "list",
            Procedure::builder()
                .input(TypeSchema::object().with_property("since", TypeSchema::string()))
                .transform_field(
                    "since",
                    map_string(|s| {
                        chrono::DateTime::parse_from_rfc3339(s)
                            .map(|at| Value::from(at.timestamp()))
                            .map_err(|e| format!("not an RFC 3339 timestamp ({e})"))
                    }),
                )
                .query(list_users),
        )
        .procedure("create", Procedure::builder().mutation_validated(create_user))
        .procedure(
            "update",
            Procedure::builder()
                .input(
                    TypeSchema::object()
                        .with_required_property("id", TypeSchema::integer().with_minimum(1.0))
                        .with_property("name", TypeSchema::string().with_min_length(1))
                        .with_property("email", TypeSchema::string().with_format("email")),
                )
                .mutation(update_user),
        )
        .router(
            "admin",
            Router::builder()
                .use_middleware_fn(require_admin())
                .procedure("delete", Procedure::builder().input(user_id_schema()).mutation(delete_user)),
        )
}

/// Create the application router
pub fn create_router() -> Result<Router<AppContext>, ConfigurationError> {
    Router::builder()
        .use_middleware_fn(logging_middleware(LogConfig::new().redact_field("token")))
        .query("health", health)
        .procedure(
            "greetings",
            Procedure::builder()
                .input(
                    TypeSchema::object().with_required_property(
                        "firstName",
                        TypeSchema::string().with_min_length(4),
                    ),
                )
                .output(TypeSchema::string())
                .query(greet),
        )
        .router("users", users_router())
        .build()
}
