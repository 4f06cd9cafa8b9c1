//! Provisioning requests, queued jobs and their results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::downstream::StepReport;
use crate::models::tenant::{PlanTier, Tenant};

/// Admin identity supplied with a registration request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminCredentials {
    pub email: String,
    /// Raw password; `None` when the identity provider vouches for the admin.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub external_user_id: Option<String>,
}

/// Parameters for creating one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub organization_name: String,
    pub plan: PlanTier,
    pub admin: Option<AdminCredentials>,
    /// Identity-provider organization to link at creation time.
    pub external_org_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobOrigin {
    /// A client called the registration endpoint.
    Registration,
    /// An identity-provider event asked for the tenant.
    ExternalEvent,
}

/// A provisioning request handed to the background machinery.
/// Consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningJob {
    pub id: Uuid,
    pub request: ProvisionRequest,
    pub origin: JobOrigin,
    pub enqueued_at: DateTime<Utc>,
}

impl ProvisioningJob {
    pub fn new(request: ProvisionRequest, origin: JobOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            origin,
            enqueued_at: Utc::now(),
        }
    }
}

/// Outcome of a successful provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    pub workspace_id: Uuid,
    pub admin_user_id: Option<Uuid>,
    /// Downstream access token for the admin, when one was requested.
    pub access_token: Option<String>,
    pub steps: Vec<StepReport>,
}
