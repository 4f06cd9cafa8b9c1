//! Per-event handlers. Each one is idempotent on its own and reports a
//! structured outcome; expected no-ops are outcomes, not errors.

use std::sync::Arc;

use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::provisioning::{
    AdminCredentials, JobOrigin, ProvisionRequest, ProvisioningJob,
};
use orgplane_core::models::tenant::{PlanTier, TenantStatus};
use orgplane_core::models::user::{CreateGlobalUser, UpdateGlobalUser};
use orgplane_core::repository::{GlobalUserRepository, TenantRepository};
use orgplane_core::slug;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{IdentityEvent, MembershipData, OrganizationData, UserData};
use crate::provisioning::ProvisioningQueue;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerOutcome {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl HandlerOutcome {
    pub fn action(action: &str) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn skipped(reason: &str) -> Self {
        Self {
            action: "skipped".into(),
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    fn tenant(mut self, id: Uuid) -> Self {
        self.tenant_id = Some(id);
        self
    }

    fn user(mut self, id: Uuid) -> Self {
        self.user_id = Some(id);
        self
    }
}

pub struct EventHandlers<T, U>
where
    T: TenantRepository,
    U: GlobalUserRepository,
{
    tenants: Arc<T>,
    users: Arc<U>,
    queue: ProvisioningQueue,
}

impl<T, U> EventHandlers<T, U>
where
    T: TenantRepository,
    U: GlobalUserRepository,
{
    pub fn new(tenants: Arc<T>, users: Arc<U>, queue: ProvisioningQueue) -> Self {
        Self {
            tenants,
            users,
            queue,
        }
    }

    pub async fn dispatch(&self, event: IdentityEvent) -> PlaneResult<HandlerOutcome> {
        match event {
            IdentityEvent::OrganizationCreated(org) => self.organization_created(org).await,
            IdentityEvent::UserCreated(user) => self.user_created(user).await,
            IdentityEvent::UserUpdated(user) => self.user_updated(user).await,
            IdentityEvent::MembershipCreated(m) => self.membership_created(m).await,
            IdentityEvent::MembershipDeleted(m) => self.membership_deleted(m).await,
            IdentityEvent::Unhandled(event_type) => {
                info!(event_type = %event_type, "Ignoring unhandled event type");
                Ok(HandlerOutcome {
                    action: "ignored".into(),
                    reason: Some("unhandled_event_type".into()),
                    ..Default::default()
                })
            }
        }
    }

    async fn organization_created(&self, org: OrganizationData) -> PlaneResult<HandlerOutcome> {
        let name = org.display_name().to_string();
        let base = slug::normalize(&name);
        if base.is_empty() {
            return Err(PlaneError::validation(format!(
                "organization name '{name}' yields an empty slug"
            )));
        }

        if let Some(existing) = self.tenants.find_by_external_org(&org.id).await? {
            let reason = if existing.status.is_in_flight() {
                "tenant_already_provisioning"
            } else {
                "tenant_already_exists"
            };
            info!(
                external_org_id = %org.id,
                tenant_id = %existing.id,
                status = %existing.status,
                reason,
                "Organization already has a tenant"
            );
            return Ok(HandlerOutcome::skipped(reason).tenant(existing.id));
        }

        let admin = org.creator_email().map(|email| AdminCredentials {
            email: email.to_string(),
            password: None,
            first_name: org.created_by_user.as_ref().and_then(|u| u.first_name.clone()),
            last_name: org.created_by_user.as_ref().and_then(|u| u.last_name.clone()),
            external_user_id: org.creator_id().map(str::to_string),
        });
        let job = ProvisioningJob::new(
            ProvisionRequest {
                organization_name: name,
                plan: PlanTier::Free,
                admin,
                external_org_id: Some(org.id.clone()),
            },
            JobOrigin::ExternalEvent,
        );
        let job_id = self.queue.enqueue(job).await?;

        info!(external_org_id = %org.id, job_id = %job_id, slug = %base, "Provisioning enqueued");
        Ok(HandlerOutcome {
            job_id: Some(job_id),
            slug: Some(base),
            ..HandlerOutcome::action("provisioning_enqueued")
        })
    }

    async fn user_created(&self, user: UserData) -> PlaneResult<HandlerOutcome> {
        let Some(email) = user.email() else {
            warn!(external_user_id = %user.id, "User event carries no email");
            return Ok(HandlerOutcome::skipped("no_email"));
        };

        let upserted = self.users.upsert(new_user(&user, email)).await?;
        if !upserted.created {
            info!(user_id = %upserted.user.id, external_user_id = %user.id, "User already exists");
            return Ok(HandlerOutcome::skipped("user_already_exists").user(upserted.user.id));
        }

        info!(user_id = %upserted.user.id, external_user_id = %user.id, "Global user created");
        Ok(HandlerOutcome::action("user_created").user(upserted.user.id))
    }

    /// Missing users are created: the provider may have dropped the
    /// matching `user.created`.
    async fn user_updated(&self, user: UserData) -> PlaneResult<HandlerOutcome> {
        let Some(email) = user.email() else {
            warn!(external_user_id = %user.id, "User event carries no email");
            return Ok(HandlerOutcome::skipped("no_email"));
        };

        let existing = match self.users.find_by_external_id(&user.id).await? {
            Some(existing) => existing,
            None => {
                let upserted = self.users.upsert(new_user(&user, email)).await?;
                if upserted.created {
                    info!(user_id = %upserted.user.id, external_user_id = %user.id, "Global user created from update");
                    return Ok(HandlerOutcome::action("user_created").user(upserted.user.id));
                }
                // The email belongs to a record bound to another external user.
                if upserted
                    .user
                    .external_user_id
                    .as_deref()
                    .is_some_and(|linked| linked != user.id)
                {
                    warn!(
                        user_id = %upserted.user.id,
                        external_user_id = %user.id,
                        "Email already belongs to another external user"
                    );
                    return Ok(HandlerOutcome::skipped("email_conflict"));
                }
                upserted.user
            }
        };

        let update = self
            .users
            .update(
                existing.id,
                UpdateGlobalUser {
                    email: Some(email.to_string()),
                    first_name: user.first_name.clone(),
                    last_name: user.last_name.clone(),
                    external_user_id: Some(user.id.clone()),
                    ..Default::default()
                },
            )
            .await;
        let updated = match update {
            Ok(updated) => updated,
            Err(PlaneError::AlreadyExists { .. } | PlaneError::Validation { .. }) => {
                warn!(
                    user_id = %existing.id,
                    external_user_id = %user.id,
                    "Email update collides with another user"
                );
                return Ok(HandlerOutcome::skipped("email_conflict"));
            }
            Err(e) => return Err(e),
        };

        info!(user_id = %updated.id, external_user_id = %user.id, "Global user updated");
        Ok(HandlerOutcome::action("user_updated").user(updated.id))
    }

    async fn membership_created(&self, m: MembershipData) -> PlaneResult<HandlerOutcome> {
        let Some(tenant) = self.tenants.find_by_external_org(&m.org_id).await? else {
            warn!(external_org_id = %m.org_id, "Membership for unknown organization");
            return Ok(HandlerOutcome::skipped("tenant_not_found"));
        };
        if tenant.status != TenantStatus::Active {
            warn!(tenant_id = %tenant.id, status = %tenant.status, "Membership for inactive tenant");
            return Ok(HandlerOutcome::skipped("tenant_not_active").tenant(tenant.id));
        }

        let Some(user) = self.users.find_by_external_id(&m.user_id).await? else {
            warn!(external_user_id = %m.user_id, tenant_id = %tenant.id, "Membership for unknown user");
            return Ok(HandlerOutcome::skipped("user_not_found").tenant(tenant.id));
        };
        if user.tenant_id == Some(tenant.id) {
            return Ok(HandlerOutcome::skipped("already_linked")
                .tenant(tenant.id)
                .user(user.id));
        }

        self.users
            .update(
                user.id,
                UpdateGlobalUser {
                    tenant_id: Some(Some(tenant.id)),
                    ..Default::default()
                },
            )
            .await?;

        info!(
            user_id = %user.id,
            tenant_id = %tenant.id,
            previous_tenant = ?user.tenant_id,
            role = ?m.role,
            "User linked to tenant"
        );
        Ok(HandlerOutcome::action("user_linked")
            .tenant(tenant.id)
            .user(user.id))
    }

    async fn membership_deleted(&self, m: MembershipData) -> PlaneResult<HandlerOutcome> {
        let Some(tenant) = self.tenants.find_by_external_org(&m.org_id).await? else {
            warn!(external_org_id = %m.org_id, "Membership removal for unknown organization");
            return Ok(HandlerOutcome::skipped("tenant_not_found"));
        };

        let user = self
            .users
            .find_by_external_id(&m.user_id)
            .await?
            .filter(|u| u.tenant_id == Some(tenant.id));
        let Some(user) = user else {
            warn!(external_user_id = %m.user_id, tenant_id = %tenant.id, "User not linked to tenant");
            return Ok(HandlerOutcome::skipped("user_not_found").tenant(tenant.id));
        };

        self.users
            .update(
                user.id,
                UpdateGlobalUser {
                    tenant_id: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        info!(user_id = %user.id, tenant_id = %tenant.id, "User unlinked from tenant");
        Ok(HandlerOutcome::action("user_unlinked")
            .tenant(tenant.id)
            .user(user.id))
    }
}

fn new_user(user: &UserData, email: &str) -> CreateGlobalUser {
    CreateGlobalUser {
        email: email.to_string(),
        external_user_id: Some(user.id.clone()),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        ..Default::default()
    }
}
