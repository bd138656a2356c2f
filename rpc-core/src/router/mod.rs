//! The procedure tree.
//!
//! A [`Router`] maps names to [`Node`]s, each either a nested router or a
//! procedure. Trees are assembled with [`RouterBuilder`], checked once at
//! build time and never mutated afterwards, so a built tree can be shared
//! across any number of concurrent requests without locking.
//!
//! # Example
//! ```rust,ignore
//! use rpc_core::prelude::*;
//!
//! let router = Router::builder()
//!     .query("health", health)
//!     .router("users", Router::builder()
//!         .procedure("get", get_user)
//!         .procedure("create", create_user))
//!     .build()?;
//!
//! assert!(router.resolve("users.get").is_some());
//! ```

mod builder;
pub(crate) mod chain;

#[cfg(test)]
mod tests;

pub use builder::RouterBuilder;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::middleware::ProcedureType;
use crate::procedure::Procedure;

/// A child of a router.
pub enum Node<Ctx> {
    Router(Router<Ctx>),
    Procedure(Arc<Procedure<Ctx>>),
}

impl<Ctx> Node<Ctx> {
    pub fn as_router(&self) -> Option<&Router<Ctx>> {
        match self {
            Self::Router(router) => Some(router),
            Self::Procedure(_) => None,
        }
    }

    pub fn as_procedure(&self) -> Option<&Arc<Procedure<Ctx>>> {
        match self {
            Self::Procedure(procedure) => Some(procedure),
            Self::Router(_) => None,
        }
    }
}

impl<Ctx> std::fmt::Debug for Node<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Router(router) => f.debug_tuple("Router").field(router).finish(),
            Self::Procedure(procedure) => f.debug_tuple("Procedure").field(procedure).finish(),
        }
    }
}

/// An immutable, ordered namespace of routers and procedures.
pub struct Router<Ctx> {
    children: IndexMap<String, Node<Ctx>>,
}

impl<Ctx> std::fmt::Debug for Router<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.children.iter()).finish()
    }
}

impl<Ctx> Router<Ctx>
where
    Ctx: Send + Sync + 'static,
{
    /// Start building a router.
    pub fn builder() -> RouterBuilder<Ctx> {
        RouterBuilder::new()
    }

    pub(crate) fn from_children(children: IndexMap<String, Node<Ctx>>) -> Self {
        Self { children }
    }

    /// Direct child by name.
    pub fn get(&self, name: &str) -> Option<&Node<Ctx>> {
        self.children.get(name)
    }

    /// Direct children in declaration order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Node<Ctx>)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Walk a dotted path segment by segment.
    ///
    /// Returns `None` when a segment is missing or empty, or when the path
    /// continues past a procedure.
    pub fn resolve(&self, path: &str) -> Option<&Node<Ctx>> {
        let mut segments = path.split('.');
        let mut node = self.children.get(segments.next()?)?;
        for segment in segments {
            node = node.as_router()?.children.get(segment)?;
        }
        Some(node)
    }

    /// Resolve a path that must end at a procedure.
    pub fn procedure(&self, path: &str) -> Option<&Arc<Procedure<Ctx>>> {
        self.resolve(path)?.as_procedure()
    }

    /// Every procedure as `(dotted path, kind)`, depth first in declaration order.
    pub fn procedures(&self) -> Vec<(String, ProcedureType)> {
        let mut out = Vec::new();
        self.collect_procedures("", &mut out);
        out
    }

    fn collect_procedures(&self, prefix: &str, out: &mut Vec<(String, ProcedureType)>) {
        for (name, node) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match node {
                Node::Router(router) => router.collect_procedures(&path, out),
                Node::Procedure(procedure) => out.push((path, procedure.kind())),
            }
        }
    }
}
