//! Application context and services

use std::sync::Arc;

use async_trait::async_trait;
use rpc_core::{Context, ContextBuilder, ContextPatch, RpcError, RpcResult};
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{TransportRequest, User};

/// Application state shared by every request.
#[derive(Debug, Clone, Default)]
pub struct AppContext {
    /// Database service
    pub db: DbService,
}

impl AppContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Async-safe in-memory user store.
#[derive(Debug, Clone)]
pub struct DbService {
    users: Arc<RwLock<Vec<User>>>,
    next_id: Arc<RwLock<u32>>,
}

impl DbService {
    pub fn new() -> Self {
        Self {
            users: Arc::new(RwLock::new(vec![
                User::new(1, "Alice", "alice@example.com"),
                User::new(2, "Bob", "bob@example.com"),
            ])),
            next_id: Arc::new(RwLock::new(3)),
        }
    }

    pub async fn get_user(&self, id: u32) -> Option<User> {
        let users = self.users.read().await;
        users.iter().find(|u| u.id == id).cloned()
    }

    /// Users created at or after `since` (unix seconds), or all users.
    pub async fn list_users(&self, since: Option<i64>) -> Vec<User> {
        let users = self.users.read().await;
        users
            .iter()
            .filter(|u| match since {
                Some(since) => chrono::DateTime::parse_from_rfc3339(&u.created_at)
                    .map(|created| created.timestamp() >= since)
                    .unwrap_or(false),
                None => true,
            })
            .cloned()
            .collect()
    }

    pub async fn create_user(&self, name: &str, email: &str) -> RpcResult<User> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Err(RpcError::conflict(format!("Email {email} is already registered")));
        }
        let mut next_id = self.next_id.write().await;

        let user = User::new(*next_id, name, email);
        *next_id += 1;
        users.push(user.clone());
        Ok(user)
    }

    pub async fn update_user(
        &self,
        id: u32,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Option<User> {
        let mut users = self.users.write().await;
        let user = users.iter_mut().find(|u| u.id == id)?;

        if let Some(n) = name {
            user.name = n.to_string();
        }
        if let Some(e) = email {
            user.email = e.to_string();
        }

        Some(user.clone())
    }

    pub async fn delete_user(&self, id: u32) -> bool {
        let mut users = self.users.write().await;
        let len = users.len();
        users.retain(|u| u.id != id);
        users.len() < len
    }

    pub async fn count_users(&self) -> usize {
        self.users.read().await.len()
    }
}

impl Default for DbService {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Per-request context
// =============================================================================

/// Turns transport headers into the initial request context.
///
/// A bearer token lands under `token`; authentication middleware decides
/// what it is worth.
pub struct HeaderContextBuilder {
    state: Arc<AppContext>,
}

impl HeaderContextBuilder {
    pub fn new(state: Arc<AppContext>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ContextBuilder<TransportRequest, AppContext> for HeaderContextBuilder {
    async fn build(&self, raw: TransportRequest) -> RpcResult<Context<AppContext>> {
        let ctx = Context::from_arc(Arc::clone(&self.state));
        let Some(header) = raw.header("authorization") else {
            return Ok(ctx);
        };
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| RpcError::bad_request("Authorization header must use the Bearer scheme"))?;
        debug!("Request carries a bearer token");
        Ok(ctx.merge(ContextPatch::new().set("token", token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[tokio::test]
    async fn seeded_users_exist() {
        let db = DbService::new();
        assert_eq!(db.count_users().await, 2);
        assert_eq!(db.get_user(1).await.unwrap().name, "Alice");
        assert!(db.get_user(99).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_emails_conflict() {
        let db = DbService::new();
        let error = db.create_user("Alice 2", "ALICE@example.com").await.unwrap_err();
        assert_eq!(error.code, rpc_core::RpcErrorCode::Conflict);
    }

    #[tokio::test]
    async fn since_filters_by_creation_time() {
        let db = DbService::new();
        assert_eq!(db.list_users(None).await.len(), 2);
        assert_eq!(db.list_users(Some(0)).await.len(), 2);
        assert!(db.list_users(Some(i64::MAX)).await.is_empty());
    }

    #[tokio::test]
    async fn builder_extracts_bearer_tokens() {
        let builder = HeaderContextBuilder::new(Arc::new(AppContext::new()));

        let ctx = builder
            .build(TransportRequest::default().with_header("Authorization", "Bearer abc"))
            .await
            .unwrap();
        assert_eq!(ctx.get("token").and_then(|v| v.as_str()), Some("abc"));

        let ctx = builder.build(TransportRequest::default()).await.unwrap();
        assert!(!ctx.contains("token"));

        let error = builder
            .build(TransportRequest::default().with_header("authorization", "Basic abc"))
            .await
            .unwrap_err();
        assert_eq!(error.code, rpc_core::RpcErrorCode::BadRequest);
    }

    proptest! {
        /// Concurrently created users get distinct ids.
        #[test]
        fn prop_unique_ids(count in 1usize..20) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let ids = rt.block_on(async {
                let db = DbService::new();
                let tasks: Vec<_> = (0..count)
                    .map(|i| {
                        let db = db.clone();
                        tokio::spawn(async move {
                            db.create_user(&format!("user{i}"), &format!("user{i}@example.com"))
                                .await
                                .unwrap()
                                .id
                        })
                    })
                    .collect();
                let mut ids = HashSet::new();
                for task in tasks {
                    ids.insert(task.await.unwrap());
                }
                ids
            });
            prop_assert_eq!(ids.len(), count);
        }
    }
}
