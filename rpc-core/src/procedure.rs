//! Procedures: the leaves of a router tree.
//!
//! A procedure is declared on its own and attached to a router later, so
//! the same procedure can live at several routes.
//!
//! # Example
//! ```rust,ignore
//! use rpc_core::prelude::*;
//!
//! #[derive(Deserialize)]
//! struct GreetInput { first_name: String }
//!
//! let greet = Procedure::builder()
//!     .input(TypeSchema::object().with_required_property("firstName", TypeSchema::string().with_min_length(4)))
//!     .output(TypeSchema::string())
//!     .query(|_ctx: Context<EmptyContext>, input: GreetInput| async move {
//!         Ok(format!("Hello, {}", input.first_name))
//!     });
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error};

use crate::context::{Context, ContextPatch};
use crate::error::{RpcError, RpcResult};
use crate::handler::{BoxedHandler, Handler, into_boxed, into_boxed_validated};
use crate::middleware::{MiddlewareFn, Next, ProcedureType, Request, Response};
use crate::router::chain::Step;
use crate::schema::{PreparedSchema, SchemaParser, TypeSchema};
use crate::transform::{InputTransform, TransformFn};
use crate::validation::Validate;

/// A callable query or mutation.
pub struct Procedure<Ctx> {
    kind: ProcedureType,
    input_schema: Option<PreparedSchema>,
    output_schema: Option<PreparedSchema>,
    steps: Vec<Step<Ctx>>,
    input_transform: InputTransform,
    output_map: Vec<TransformFn>,
    handler: BoxedHandler<Ctx>,
}

impl<Ctx> Clone for Procedure<Ctx> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            input_schema: self.input_schema.clone(),
            output_schema: self.output_schema.clone(),
            steps: self.steps.clone(),
            input_transform: self.input_transform.clone(),
            output_map: self.output_map.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<Ctx> std::fmt::Debug for Procedure<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Procedure")
            .field("kind", &self.kind)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .field("steps", &self.steps.len())
            .field("input_transform", &self.input_transform)
            .finish_non_exhaustive()
    }
}

impl<Ctx> Procedure<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    /// Start declaring a procedure.
    pub fn builder() -> ProcedureBuilder<Ctx> {
        ProcedureBuilder::new()
    }

    pub fn kind(&self) -> ProcedureType {
        self.kind
    }

    pub fn input_schema(&self) -> Option<&TypeSchema> {
        self.input_schema.as_ref().map(PreparedSchema::schema)
    }

    pub fn output_schema(&self) -> Option<&TypeSchema> {
        self.output_schema.as_ref().map(PreparedSchema::schema)
    }

    /// Check that both schemas compile.
    pub(crate) fn check_schemas(&self) -> Result<(), String> {
        if let Some(schema) = self.input_schema() {
            schema.check_patterns().map_err(|e| format!("input {e}"))?;
        }
        if let Some(schema) = self.output_schema() {
            schema.check_patterns().map_err(|e| format!("output {e}"))?;
        }
        Ok(())
    }

    /// Number of chain steps (middleware and context derivations) before the handler.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub(crate) fn steps(&self) -> &[Step<Ctx>] {
        &self.steps
    }

    /// Prepend steps inherited from enclosing routers.
    pub(crate) fn with_outer_steps(mut self, outer: &[Step<Ctx>]) -> Self {
        if !outer.is_empty() {
            let mut steps = outer.to_vec();
            steps.append(&mut self.steps);
            self.steps = steps;
        }
        self
    }

    /// Validate the raw input, then apply the input transforms.
    pub(crate) fn decode_input(
        &self,
        raw_input: &Value,
        parser: &dyn SchemaParser,
    ) -> RpcResult<Value> {
        let input = match &self.input_schema {
            Some(schema) => parser.decode_prepared(schema, raw_input).map_err(|errors| {
                debug!(error_count = errors.len(), "Input rejected by schema");
                RpcError::validation(errors)
            })?,
            None => raw_input.clone(),
        };

        if self.input_transform.is_empty() {
            Ok(input)
        } else {
            self.input_transform
                .apply(input)
                .map_err(RpcError::transformation)
        }
    }

    /// Run the handler on decoded input, then check and map its output.
    pub(crate) async fn invoke(
        &self,
        ctx: Context<Ctx>,
        input: Value,
        parser: &dyn SchemaParser,
    ) -> RpcResult<Value> {
        let output = (self.handler)(ctx, input).await?;

        let output = match &self.output_schema {
            Some(schema) => parser.decode_prepared(schema, &output).map_err(|errors| {
                error!(error_count = errors.len(), "Handler output rejected by schema");
                let cause = errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                RpcError::internal("Handler produced an invalid output").with_cause(cause)
            })?,
            None => output,
        };

        self.output_map.iter().try_fold(output, |value, f| {
            f(value).map_err(|reason| {
                error!(reason = %reason, "Output transformation failed");
                RpcError::internal("Output transformation failed").with_cause(reason)
            })
        })
    }
}

/// Declares a [`Procedure`]. Finishing with `query` or `mutation` supplies
/// the handler, so a procedure can never exist without one.
pub struct ProcedureBuilder<Ctx> {
    input_schema: Option<TypeSchema>,
    output_schema: Option<TypeSchema>,
    steps: Vec<Step<Ctx>>,
    input_transform: InputTransform,
    output_map: Vec<TransformFn>,
}

impl<Ctx> Default for ProcedureBuilder<Ctx> {
    fn default() -> Self {
        Self {
            input_schema: None,
            output_schema: None,
            steps: Vec::new(),
            input_transform: InputTransform::default(),
            output_map: Vec::new(),
        }
    }
}

impl<Ctx> ProcedureBuilder<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema the raw input must satisfy before any middleware runs.
    #[must_use]
    pub fn input(mut self, schema: TypeSchema) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Schema the handler's output is checked against.
    #[must_use]
    pub fn output(mut self, schema: TypeSchema) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Transform the whole validated input.
    #[must_use]
    pub fn transform_input(mut self, f: TransformFn) -> Self {
        self.input_transform.add_whole(f);
        self
    }

    /// Transform one field of the validated input.
    #[must_use]
    pub fn transform_field(mut self, name: impl Into<String>, f: TransformFn) -> Self {
        self.input_transform.add_field(name.into(), f);
        self
    }

    /// Transform the handler's checked output.
    #[must_use]
    pub fn map_output(mut self, f: TransformFn) -> Self {
        self.output_map.push(f);
        self
    }

    /// Append a middleware closure.
    #[must_use]
    pub fn use_middleware<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Context<Ctx>, Request, Next<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Response>> + Send + 'static,
    {
        self.use_middleware_fn(Arc::new(f))
    }

    /// Append shared middleware.
    #[must_use]
    pub fn use_middleware_fn(mut self, middleware: MiddlewareFn<Ctx>) -> Self {
        self.steps.push(Step::Middleware(middleware));
        self
    }

    /// Append a pure context derivation step.
    #[must_use]
    pub fn derive_context<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context<Ctx>) -> RpcResult<ContextPatch> + Send + Sync + 'static,
    {
        self.steps.push(Step::Derive(Arc::new(f)));
        self
    }

    fn finish(self, kind: ProcedureType, handler: BoxedHandler<Ctx>) -> Procedure<Ctx> {
        Procedure {
            kind,
            input_schema: self.input_schema.map(PreparedSchema::new),
            output_schema: self.output_schema.map(PreparedSchema::new),
            steps: self.steps,
            input_transform: self.input_transform,
            output_map: self.output_map,
            handler,
        }
    }

    /// Finish as a query.
    pub fn query<Input, Output, H>(self, handler: H) -> Procedure<Ctx>
    where
        Input: DeserializeOwned + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.finish(ProcedureType::Query, into_boxed(handler))
    }

    /// Finish as a mutation.
    pub fn mutation<Input, Output, H>(self, handler: H) -> Procedure<Ctx>
    where
        Input: DeserializeOwned + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.finish(ProcedureType::Mutation, into_boxed(handler))
    }

    /// Finish as a query whose input type is checked with [`Validate`].
    pub fn query_validated<Input, Output, H>(self, handler: H) -> Procedure<Ctx>
    where
        Input: DeserializeOwned + Validate + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.finish(ProcedureType::Query, into_boxed_validated(handler))
    }

    /// Finish as a mutation whose input type is checked with [`Validate`].
    pub fn mutation_validated<Input, Output, H>(self, handler: H) -> Procedure<Ctx>
    where
        Input: DeserializeOwned + Validate + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.finish(ProcedureType::Mutation, into_boxed_validated(handler))
    }
}
