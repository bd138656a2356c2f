//! Application RPC Module
//!
//! This module defines the RPC router, handlers, and types for the application.

mod context;
mod handlers;
mod types;

pub use context::{AppContext, HeaderContextBuilder};
pub use handlers::create_router;
pub use types::*;

// Re-export core types for convenience
pub use rpc_core::prelude::*;
