//! Global user model: the cross-tenant identity anchor.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlaneError;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    #[default]
    Member,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Member => "member",
        }
    }
}

impl FromStr for UserRole {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "member" => Ok(UserRole::Member),
            other => Err(PlaneError::validation(format!("unknown user role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalUser {
    pub id: Uuid,
    /// Always stored lowercased.
    pub email: String,
    pub external_user_id: Option<String>,
    /// `None` until the user is linked to a tenant.
    pub tenant_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    /// Argon2id PHC hash, only set for admins registered with a password.
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateGlobalUser {
    pub email: String,
    pub external_user_id: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateGlobalUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<UserRole>,
    pub password_hash: Option<String>,
    /// Only attaches an id to a user that has none.
    pub external_user_id: Option<String>,
    /// `Some(Some(id))` = link, `Some(None)` = unlink, `None` = no change.
    pub tenant_id: Option<Option<Uuid>>,
}

/// Result of an idempotent user upsert.
#[derive(Debug, Clone)]
pub struct UserUpsert {
    pub user: GlobalUser,
    pub created: bool,
}

/// Lowercase and trim an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
