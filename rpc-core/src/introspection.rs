//! Static description of a router tree for external tooling.
//!
//! The document is derived from a built [`Router`] and mirrors it one node
//! per node. Children keep declaration order, so introspecting the same tree
//! twice yields identical documents.
//!
//! ```json
//! {
//!   "nodeType": "router",
//!   "routes": {
//!     "greetings": { "nodeType": "route", "type": "query", "inputSchema": { ... } }
//!   }
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RpcResult;
use crate::middleware::ProcedureType;
use crate::router::{Node, Router};
use crate::schema::TypeSchema;

/// One node of an introspection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "nodeType", rename_all = "lowercase")]
pub enum IntrospectionNode {
    Router {
        routes: IndexMap<String, IntrospectionNode>,
    },
    Route {
        #[serde(rename = "type")]
        kind: ProcedureType,
        #[serde(rename = "inputSchema", default, skip_serializing_if = "Option::is_none")]
        input_schema: Option<TypeSchema>,
        #[serde(rename = "outputSchema", default, skip_serializing_if = "Option::is_none")]
        output_schema: Option<TypeSchema>,
    },
}

/// Describe a router tree.
pub fn introspect<Ctx>(router: &Router<Ctx>) -> IntrospectionNode
where
    Ctx: Send + Sync + 'static,
{
    IntrospectionNode::Router {
        routes: router
            .children()
            .map(|(name, node)| {
                let described = match node {
                    Node::Router(child) => introspect(child),
                    Node::Procedure(procedure) => IntrospectionNode::Route {
                        kind: procedure.kind(),
                        input_schema: procedure.input_schema().cloned(),
                        output_schema: procedure.output_schema().cloned(),
                    },
                };
                (name.to_string(), described)
            })
            .collect(),
    }
}

impl IntrospectionNode {
    /// Look up a node by dotted path.
    pub fn get(&self, path: &str) -> Option<&IntrospectionNode> {
        path.split('.').try_fold(self, |node, segment| match node {
            Self::Router { routes } => routes.get(segment),
            Self::Route { .. } => None,
        })
    }

    /// Every route as `(dotted path, kind)`, in declaration order.
    pub fn procedures(&self) -> Vec<(String, ProcedureType)> {
        let mut out = Vec::new();
        self.collect("", &mut out);
        out
    }

    fn collect(&self, prefix: &str, out: &mut Vec<(String, ProcedureType)>) {
        match self {
            Self::Route { kind, .. } => out.push((prefix.to_string(), *kind)),
            Self::Router { routes } => {
                for (name, node) in routes {
                    let path = if prefix.is_empty() {
                        name.clone()
                    } else {
                        format!("{prefix}.{name}")
                    };
                    node.collect(&path, out);
                }
            }
        }
    }

    pub fn to_json(&self) -> RpcResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_pretty(&self) -> RpcResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
