//! Per-request context.
//!
//! A [`Context`] pairs the application's shared state (database handles,
//! services) with an immutable key/value record. Middleware never mutates a
//! context; it hands a [`ContextPatch`] to `next`, and the following step
//! sees `ctx.merge(patch)` with patch keys shallowly overriding existing ones.
//!
//! The initial context comes from a [`ContextBuilder`], which turns whatever
//! the transport knows about the caller into a `Context`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::error::{RpcError, RpcResult};

/// The key/value record carried by a [`Context`].
pub type ContextValues = BTreeMap<String, Value>;

/// Application state for procedures that need none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmptyContext;

/// Shared application state plus the per-request key/value record.
///
/// Cloning is cheap: both halves sit behind `Arc`.
pub struct Context<Ctx> {
    state: Arc<Ctx>,
    values: Arc<ContextValues>,
}

impl<Ctx> Context<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    /// Create a context around application state with an empty record.
    pub fn new(state: Ctx) -> Self {
        Self::from_arc(Arc::new(state))
    }

    /// Create a context around already shared state.
    pub fn from_arc(state: Arc<Ctx>) -> Self {
        Self {
            state,
            values: Arc::new(ContextValues::new()),
        }
    }

    /// Borrow the application state.
    pub fn state(&self) -> &Ctx {
        &self.state
    }

    /// Clone the shared handle to the application state.
    pub fn state_arc(&self) -> Arc<Ctx> {
        Arc::clone(&self.state)
    }

    /// Look up a value set by an earlier step.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a value and deserialize it.
    ///
    /// A value of the wrong shape is a server bug, reported as
    /// `INTERNAL_SERVER_ERROR`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> RpcResult<Option<T>> {
        self.values
            .get(key)
            .map(|value| {
                T::deserialize(value).map_err(|e| {
                    RpcError::internal(format!("Context value '{key}' has an unexpected shape"))
                        .with_cause(e.to_string())
                })
            })
            .transpose()
    }

    /// Whether a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// The full key/value record.
    pub fn values(&self) -> &ContextValues {
        &self.values
    }

    /// Produce the next context: patch keys override same-named keys.
    ///
    /// An empty patch shares the existing record instead of copying it.
    pub fn merge(&self, patch: ContextPatch) -> Self {
        if patch.is_empty() {
            return self.clone();
        }
        trace!(keys = ?patch.entries.keys().collect::<Vec<_>>(), "Merging context patch");
        let mut values = (*self.values).clone();
        values.extend(patch.entries);
        Self {
            state: Arc::clone(&self.state),
            values: Arc::new(values),
        }
    }
}

impl<Ctx> Clone for Context<Ctx> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            values: Arc::clone(&self.values),
        }
    }
}

impl<Ctx> Deref for Context<Ctx> {
    type Target = Ctx;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl<Ctx: fmt::Debug> fmt::Debug for Context<Ctx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("state", &self.state)
            .field("values", &self.values)
            .finish()
    }
}

impl Default for Context<EmptyContext> {
    fn default() -> Self {
        Self::new(EmptyContext)
    }
}

/// Keys a step adds (or overrides) for the steps after it.
///
/// # Example
/// ```rust,ignore
/// let patch = ContextPatch::new()
///     .set("userId", 42)
///     .set("role", "admin");
/// next.run_with(patch).await
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextPatch {
    entries: ContextValues,
}

impl ContextPatch {
    /// An empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key to a JSON value.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Set a key to any serializable value.
    pub fn try_set(mut self, key: impl Into<String>, value: &impl Serialize) -> RpcResult<Self> {
        self.entries.insert(key.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Whether the patch sets nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys in the patch.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up a key in the patch.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContextPatch {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// =============================================================================
// Context transforms
// =============================================================================

/// A pure step computing a patch from the current context.
pub type ContextTransform<Ctx> =
    Arc<dyn Fn(&Context<Ctx>) -> RpcResult<ContextPatch> + Send + Sync>;

/// Fold transforms over a context in order; the first error stops the fold.
pub fn apply_transforms<'a, Ctx, I>(ctx: Context<Ctx>, transforms: I) -> RpcResult<Context<Ctx>>
where
    Ctx: Send + Sync + 'static,
    I: IntoIterator<Item = &'a ContextTransform<Ctx>>,
{
    transforms
        .into_iter()
        .try_fold(ctx, |ctx, transform| Ok(ctx.merge(transform(&ctx)?)))
}

// =============================================================================
// Context builder
// =============================================================================

/// Builds the initial context for one request from transport-level data.
///
/// Closures `Fn(Raw) -> impl Future<Output = RpcResult<Context<Ctx>>>`
/// implement this trait.
#[async_trait]
pub trait ContextBuilder<Raw, Ctx>: Send + Sync
where
    Raw: Send + 'static,
    Ctx: Send + Sync + 'static,
{
    /// Build the initial context. Failing here fails the request.
    async fn build(&self, raw: Raw) -> RpcResult<Context<Ctx>>;
}

#[async_trait]
impl<Raw, Ctx, F, Fut> ContextBuilder<Raw, Ctx> for F
where
    Raw: Send + 'static,
    Ctx: Send + Sync + 'static,
    F: Fn(Raw) -> Fut + Send + Sync,
    Fut: Future<Output = RpcResult<Context<Ctx>>> + Send,
{
    async fn build(&self, raw: Raw) -> RpcResult<Context<Ctx>> {
        (self)(raw).await
    }
}
