//! Idempotency ledger records and namespaced keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PlaneError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdempotencyStatus {
    Processing,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdempotencyStatus::Processing => "processing",
            IdempotencyStatus::Completed => "completed",
            IdempotencyStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, IdempotencyStatus::Processing)
    }
}

impl FromStr for IdempotencyStatus {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(IdempotencyStatus::Processing),
            "completed" => Ok(IdempotencyStatus::Completed),
            "failed" => Ok(IdempotencyStatus::Failed),
            other => Err(PlaneError::validation(format!(
                "unknown idempotency status: {other}"
            ))),
        }
    }
}

/// A ledger key. The operation type is always the leading segment so
/// keys from different operations can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    operation: String,
    key: String,
}

impl IdempotencyKey {
    pub const WEBHOOK: &'static str = "webhook";
    pub const REGISTRATION: &'static str = "register";

    /// `webhook:<event-type>:<event-id>`
    pub fn webhook(event_type: &str, event_id: &str) -> Self {
        Self {
            operation: Self::WEBHOOK.into(),
            key: format!("{}:{event_type}:{event_id}", Self::WEBHOOK),
        }
    }

    /// `register:<caller-token>`
    pub fn registration(token: &str) -> Self {
        Self {
            operation: Self::REGISTRATION.into(),
            key: format!("{}:{token}", Self::REGISTRATION),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub operation: String,
    pub status: IdempotencyStatus,
    /// Stored only on completion.
    pub result: Option<serde_json::Value>,
    /// Stored only on failure.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
