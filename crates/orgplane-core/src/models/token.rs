//! Downstream credentials and resolved foreign identities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access + refresh credentials minted for the downstream application.
/// Never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Everything an access credential is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSubject {
    pub tenant_id: Uuid,
    pub workspace_id: Uuid,
    /// Internal (global) user id, reused as the downstream user id.
    pub user_id: Uuid,
    pub user_workspace_id: Uuid,
}

/// Identity extracted from a verified foreign credential.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForeignIdentity {
    pub subject: String,
    pub org_id: Option<String>,
    pub email: Option<String>,
    pub org_role: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Name of the verifier strategy that accepted the credential.
    pub verified_by: String,
}

/// Tenant resolved during identity inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTenant {
    pub id: Uuid,
    pub slug: String,
    pub workspace_id: Option<Uuid>,
}

/// Read-only result of `verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityInspection {
    pub subject: String,
    pub org_id: Option<String>,
    pub email: Option<String>,
    pub org_role: Option<String>,
    pub user_id: Option<Uuid>,
    pub tenant: Option<ResolvedTenant>,
}
