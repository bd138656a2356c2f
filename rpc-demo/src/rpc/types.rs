//! Application types

use rpc_core::{ValidationResult, ValidationRules, Validate};
use serde::{Deserialize, Serialize};

// =============================================================================
// User Types
// =============================================================================

/// User entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u32,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl User {
    pub fn new(id: u32, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            email: email.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Input for getting or deleting a user by ID
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdInput {
    pub id: u32,
}

/// Input for creating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserInput {
    pub name: String,
    pub email: String,
}

impl Validate for CreateUserInput {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new()
            .required("name", &self.name)
            .max_length("name", &self.name, 64)
            .email("email", &self.email)
            .build()
    }
}

/// Input for updating a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserInput {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Input for listing users created after a point in time.
///
/// `since` arrives as an RFC 3339 string and is turned into a unix
/// timestamp before the handler sees it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListUsersInput {
    #[serde(default)]
    pub since: Option<i64>,
}

// =============================================================================
// General Types
// =============================================================================

/// Input for greeting
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GreetInput {
    pub first_name: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// What a transport knows about an incoming call.
#[derive(Debug, Clone, Default)]
pub struct TransportRequest {
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}
