//! Audit entry data structures
//!
//! Defines who performed a privileged operation, what it was, and how it
//! turned out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Types of operations that can be audited
///
/// Unknown names read from the log are preserved as [`Operation::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operation {
    Create,
    List,
    Download,
    Delete,
    Validate,
    Cleanup,
    HealthCheck,
    Alert,
    Other(String),
}

impl Operation {
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Create => "create",
            Operation::List => "list",
            Operation::Download => "download",
            Operation::Delete => "delete",
            Operation::Validate => "validate",
            Operation::Cleanup => "cleanup",
            Operation::HealthCheck => "health_check",
            Operation::Alert => "alert",
            Operation::Other(name) => name,
        }
    }
}

impl From<String> for Operation {
    fn from(value: String) -> Self {
        match value.as_str() {
            "create" => Operation::Create,
            "list" => Operation::List,
            "download" => Operation::Download,
            "delete" => Operation::Delete,
            "validate" => Operation::Validate,
            "cleanup" => Operation::Cleanup,
            "health_check" => Operation::HealthCheck,
            "alert" => Operation::Alert,
            _ => Operation::Other(value),
        }
    }
}

impl From<Operation> for String {
    fn from(op: Operation) -> Self {
        op.as_str().to_string()
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

/// The identity performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role: role.into(),
        }
    }

    /// The actor used for scheduled and automatic operations
    pub fn system() -> Self {
        Self::new("system", "system@localhost", "system")
    }
}

/// A single audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,

    /// When the operation occurred (UTC)
    pub timestamp: DateTime<Utc>,

    pub user_id: String,
    pub user_email: String,
    pub user_role: String,

    pub operation: Operation,

    /// Backup (or alert) the operation targeted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuditEntry {
    /// Create an entry; id and timestamp are re-stamped when logged
    pub fn new(actor: &Actor, operation: Operation, success: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            user_id: actor.id.clone(),
            user_email: actor.email.clone(),
            user_role: actor.role.clone(),
            operation,
            resource_id: None,
            success,
            error: None,
            metadata: None,
            ip_address: None,
            user_agent: None,
        }
    }

    pub fn resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    /// Format the entry for human-readable output
    pub fn format_human_readable(&self) -> String {
        let mut output = format!(
            "[{}] {} by {} ({}) {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.operation,
            self.user_email,
            self.user_role,
            if self.success { "OK" } else { "FAILED" }
        );

        if let Some(resource) = &self.resource_id {
            output.push_str(&format!(" resource={}", resource));
        }

        if let Some(error) = &self.error {
            output.push_str(&format!("\n  Error: {}", error));
        }

        output
    }
}
