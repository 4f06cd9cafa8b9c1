//! Tenant registry model.
//!
//! A tenant is one isolated customer organization with its own data
//! store in the downstream application. Registry rows are never deleted;
//! deactivation and failure are status changes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PlaneError;

/// Provisioning lifecycle of a tenant.
///
/// Legal transitions: `Pending -> Provisioning -> {Active, Failed}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Pending,
    Provisioning,
    Active,
    Failed,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Pending => "pending",
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
            TenantStatus::Failed => "failed",
        }
    }

    pub fn can_transition_to(self, next: TenantStatus) -> bool {
        matches!(
            (self, next),
            (TenantStatus::Pending, TenantStatus::Provisioning)
                | (TenantStatus::Provisioning, TenantStatus::Active)
                | (TenantStatus::Provisioning, TenantStatus::Failed)
        )
    }

    /// Still moving towards a terminal state.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TenantStatus::Pending | TenantStatus::Provisioning)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TenantStatus::Pending),
            "provisioning" => Ok(TenantStatus::Provisioning),
            "active" => Ok(TenantStatus::Active),
            "failed" => Ok(TenantStatus::Failed),
            other => Err(PlaneError::validation(format!(
                "unknown tenant status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Enterprise => "enterprise",
        }
    }
}

impl FromStr for PlanTier {
    type Err = PlaneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "enterprise" => Ok(PlanTier::Enterprise),
            other => Err(PlaneError::validation(format!(
                "plan must be one of free, pro, enterprise (got '{other}')"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    /// URL-safe unique identifier (e.g., `acme-inc`).
    pub slug: String,
    /// Human-readable organization name.
    pub name: String,
    /// Identity-provider organization this tenant mirrors, if known.
    pub external_org_id: Option<String>,
    /// Opaque locator of the tenant's isolated data store.
    pub connection_descriptor: Option<String>,
    pub status: TenantStatus,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to register a new tenant. New tenants start `Pending`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    pub name: String,
    pub slug: String,
    pub external_org_id: Option<String>,
    pub plan: PlanTier,
}
