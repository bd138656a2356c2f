use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::chain::Step;
use super::{Node, Router};
use crate::context::{Context, ContextPatch};
use crate::error::{ConfigurationError, RpcResult};
use crate::handler::Handler;
use crate::middleware::{MiddlewareFn, Next, Request, Response};
use crate::procedure::Procedure;
use crate::validation::validate_name;

const ROOT_NAME: &str = "<root>";

enum Entry<Ctx> {
    Procedure(Procedure<Ctx>),
    Router(RouterBuilder<Ctx>),
}

impl<Ctx> Entry<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    fn with_outer_steps(self, outer: &[Step<Ctx>]) -> Self {
        match self {
            Self::Procedure(procedure) => Self::Procedure(procedure.with_outer_steps(outer)),
            Self::Router(mut builder) => {
                let mut steps = outer.to_vec();
                steps.append(&mut builder.middleware);
                builder.middleware = steps;
                Self::Router(builder)
            }
        }
    }
}

/// Declarative description of a [`Router`].
///
/// Nothing is checked until [`build`](Self::build), which rejects empty or
/// malformed names and duplicate names within one router.
pub struct RouterBuilder<Ctx> {
    entries: Vec<(String, Entry<Ctx>)>,
    middleware: Vec<Step<Ctx>>,
}

impl<Ctx> Default for RouterBuilder<Ctx> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            middleware: Vec::new(),
        }
    }
}

impl<Ctx> RouterBuilder<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add middleware that runs before the middleware of every procedure
    /// beneath this router.
    #[must_use]
    pub fn use_middleware<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Context<Ctx>, Request, Next<Ctx>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Response>> + Send + 'static,
    {
        self.use_middleware_fn(Arc::new(f))
    }

    #[must_use]
    pub fn use_middleware_fn(mut self, middleware: MiddlewareFn<Ctx>) -> Self {
        trace!("Adding router middleware");
        self.middleware.push(Step::Middleware(middleware));
        self
    }

    /// Add a context derivation step shared by every procedure beneath this router.
    #[must_use]
    pub fn derive_context<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context<Ctx>) -> RpcResult<ContextPatch> + Send + Sync + 'static,
    {
        self.middleware.push(Step::Derive(Arc::new(f)));
        self
    }

    /// Attach a procedure under `name`.
    #[must_use]
    pub fn procedure(mut self, name: impl Into<String>, procedure: Procedure<Ctx>) -> Self {
        let name = name.into();
        trace!(name = %name, kind = %procedure.kind(), "Attaching procedure");
        self.entries.push((name, Entry::Procedure(procedure)));
        self
    }

    /// Attach a query with no schemas or middleware of its own.
    #[must_use]
    pub fn query<Input, Output, H>(self, name: impl Into<String>, handler: H) -> Self
    where
        Input: DeserializeOwned + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.procedure(name, Procedure::builder().query(handler))
    }

    /// Attach a mutation with no schemas or middleware of its own.
    #[must_use]
    pub fn mutation<Input, Output, H>(self, name: impl Into<String>, handler: H) -> Self
    where
        Input: DeserializeOwned + Send + 'static,
        Output: Serialize + Send + 'static,
        H: Handler<Ctx, Input, Output>,
    {
        self.procedure(name, Procedure::builder().mutation(handler))
    }

    /// Nest another router under `name`.
    #[must_use]
    pub fn router(mut self, name: impl Into<String>, router: RouterBuilder<Ctx>) -> Self {
        let name = name.into();
        trace!(name = %name, "Nesting router");
        self.entries.push((name, Entry::Router(router)));
        self
    }

    /// Fold another builder's entries into this level.
    ///
    /// The other builder's middleware keeps applying only to its own entries.
    #[must_use]
    pub fn merge(mut self, other: RouterBuilder<Ctx>) -> Self {
        let RouterBuilder {
            entries,
            middleware,
        } = other;
        trace!(entries = entries.len(), "Merging router");
        self.entries.extend(
            entries
                .into_iter()
                .map(|(name, entry)| (name, entry.with_outer_steps(&middleware))),
        );
        self
    }

    /// Check names and freeze the tree.
    pub fn build(self) -> Result<Router<Ctx>, ConfigurationError> {
        self.build_at("", &[])
    }

    fn build_at(
        self,
        path: &str,
        inherited: &[Step<Ctx>],
    ) -> Result<Router<Ctx>, ConfigurationError> {
        let router_name = if path.is_empty() { ROOT_NAME } else { path };
        let mut scope = inherited.to_vec();
        scope.extend(self.middleware);

        let mut children = IndexMap::with_capacity(self.entries.len());
        for (name, entry) in self.entries {
            validate_name(&name).map_err(|reason| ConfigurationError::InvalidName {
                name: join(path, &name),
                reason,
            })?;
            if children.contains_key(&name) {
                return Err(ConfigurationError::DuplicateName {
                    router: router_name.to_string(),
                    name,
                });
            }
            let node = match entry {
                Entry::Procedure(procedure) => {
                    procedure.check_schemas().map_err(|reason| {
                        ConfigurationError::InvalidSchema { route: join(path, &name), reason }
                    })?;
                    Node::Procedure(Arc::new(procedure.with_outer_steps(&scope)))
                }
                Entry::Router(builder) => Node::Router(builder.build_at(&join(path, &name), &scope)?),
            };
            children.insert(name, node);
        }

        debug!(router = %router_name, children = children.len(), "Router built");
        Ok(Router::from_children(children))
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}
