//! Application types

use nexus_rpc::{Validate, ValidationResult, ValidationRules};
use serde::{Deserialize, Serialize};

// =============================================================================
// User Types
// =============================================================================

/// User entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Input for looking up or deleting a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdInput {
    pub id: String,
}

impl Validate for UserIdInput {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new().required("id", &self.id).build()
    }
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
            .max_length("name", &self.name, 100)
            .email("email", &self.email)
            .build()
    }
}

/// Result of a delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deleted {
    pub id: String,
    pub deleted: bool,
}

// =============================================================================
// General Types
// =============================================================================

/// Input for `hello` and `teststream`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextInput {
    pub text: String,
}

impl Validate for TextInput {
    fn validate(&self) -> ValidationResult {
        ValidationRules::new()
            .max_length("text", &self.text, 256)
            .build()
    }
}

/// Output of `hello`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    pub greeting: String,
}

/// Output of `whoami`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmI {
    pub user: String,
    pub request_id: String,
}
