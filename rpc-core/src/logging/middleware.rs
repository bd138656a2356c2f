use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use tracing::{debug, error, info, warn};

use super::config::LogConfig;
use super::redaction::RedactionEngine;
use super::types::LogLevel;
use crate::context::Context;
use crate::error::RpcResult;
use crate::middleware::{Middleware, MiddlewareFn, Next, Request, Response};

/// Whether `duration` crosses the configured slow-request threshold.
pub fn should_log_slow_request(config: &LogConfig, duration: &Duration) -> bool {
    config
        .slow_request_threshold_ms
        .is_some_and(|threshold| duration.as_millis() > u128::from(threshold))
}

/// Logs each request passing through it. Results are returned untouched.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    config: Arc<LogConfig>,
    engine: Arc<RedactionEngine>,
}

impl LoggingMiddleware {
    pub fn new(config: LogConfig) -> Self {
        let engine = RedactionEngine::new(&config);
        Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
        }
    }
}

impl<Ctx> Middleware<Ctx> for LoggingMiddleware
where
    Ctx: Send + Sync + 'static,
{
    fn handle(
        &self,
        _ctx: Context<Ctx>,
        request: Request,
        next: Next<Ctx>,
    ) -> BoxFuture<'static, RpcResult<Response>> {
        let config = Arc::clone(&self.config);
        let engine = Arc::clone(&self.engine);
        Box::pin(async move {
            if !config.should_log_path(&request.path) {
                return next.run().await;
            }
            let level = config.level;
            let request_id = request.request_id.short();

            if level.should_log(LogLevel::Debug) {
                let input = config.log_input.then(|| engine.redact(&request.input));
                debug!(
                    request_id = %request_id,
                    path = %request.path,
                    procedure_type = %request.procedure_type,
                    input = ?input,
                    "RPC request started"
                );
            }

            let start = Instant::now();
            let result = next.run().await;
            let duration = start.elapsed();
            let duration_ms = duration.as_millis() as u64;

            match &result {
                Ok(response) if level.should_log(LogLevel::Info) => {
                    let output = config.log_output.then(|| engine.redact(response.data()));
                    info!(
                        request_id = %request_id,
                        path = %request.path,
                        duration_ms,
                        output = ?output,
                        "RPC request completed"
                    );
                }
                Err(e) if e.code.is_server_error() && level.should_log(LogLevel::Error) => {
                    error!(
                        request_id = %request_id,
                        path = %request.path,
                        duration_ms,
                        error_code = %e.code,
                        error_message = %e.message,
                        cause = ?e.cause,
                        "RPC request failed"
                    );
                }
                Err(e) if level.should_log(LogLevel::Warn) => {
                    warn!(
                        request_id = %request_id,
                        path = %request.path,
                        duration_ms,
                        error_code = %e.code,
                        error_message = %e.message,
                        "RPC request rejected"
                    );
                }
                _ => {}
            }

            if should_log_slow_request(&config, &duration) && level.should_log(LogLevel::Warn) {
                warn!(
                    request_id = %request_id,
                    path = %request.path,
                    duration_ms,
                    threshold_ms = ?config.slow_request_threshold_ms,
                    "Slow RPC request"
                );
            }

            result
        })
    }
}

/// Creates a logging middleware with the given configuration.
pub fn logging_middleware<Ctx>(config: LogConfig) -> MiddlewareFn<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    Arc::new(LoggingMiddleware::new(config))
}
