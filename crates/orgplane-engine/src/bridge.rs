//! Identity token bridge: trades a foreign credential for downstream
//! access and refresh tokens scoped to one tenant workspace.

use std::sync::Arc;

use orgplane_auth::token::{decode_refresh_token, issue_token_pair};
use orgplane_auth::{AuthConfig, VerifierChain};
use orgplane_core::downstream::{DownstreamBackend, DownstreamUser, WorkspaceLinkage};
use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::tenant::{Tenant, TenantStatus};
use orgplane_core::models::token::{
    ForeignIdentity, IdentityInspection, ResolvedTenant, TokenPair, TokenSubject,
};
use orgplane_core::models::user::{CreateGlobalUser, GlobalUser, UpdateGlobalUser};
use orgplane_core::repository::{GlobalUserRepository, TenantRepository};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::router::ConnectionRouter;

/// Downstream failures surface as `LinkageFailure`; storage outages stay
/// transient.
fn linkage(e: PlaneError) -> PlaneError {
    if e.is_transient() {
        e
    } else {
        PlaneError::LinkageFailure {
            reason: e.to_string(),
        }
    }
}

pub struct TokenBridge<T, U, B>
where
    T: TenantRepository,
    U: GlobalUserRepository,
    B: DownstreamBackend,
{
    tenants: Arc<T>,
    users: Arc<U>,
    backend: Arc<B>,
    router: Arc<ConnectionRouter<B>>,
    verifiers: Arc<VerifierChain>,
    auth: Arc<AuthConfig>,
}

impl<T, U, B> TokenBridge<T, U, B>
where
    T: TenantRepository,
    U: GlobalUserRepository,
    B: DownstreamBackend,
{
    pub fn new(
        tenants: Arc<T>,
        users: Arc<U>,
        backend: Arc<B>,
        router: Arc<ConnectionRouter<B>>,
        verifiers: Arc<VerifierChain>,
        auth: Arc<AuthConfig>,
    ) -> Self {
        Self {
            tenants,
            users,
            backend,
            router,
            verifiers,
            auth,
        }
    }

    pub async fn exchange(&self, credential: &str) -> PlaneResult<TokenPair> {
        let identity = self.verifiers.verify(credential).await?;
        let org_id = identity
            .org_id
            .clone()
            .ok_or(PlaneError::MissingOrganization)?;
        let tenant = self.active_tenant(&org_id).await?;

        let user = self.global_user(&identity, &tenant).await?;
        let linkage = self.link(&tenant, &user).await?;

        let pair = issue_token_pair(
            &TokenSubject {
                tenant_id: tenant.id,
                workspace_id: linkage.workspace_id,
                user_id: linkage.user_id,
                user_workspace_id: linkage.id,
            },
            user.id,
            &self.auth,
        )?;

        if let Err(e) = self.users.touch_last_login(user.id).await {
            warn!(user_id = %user.id, error = %e, "Could not record last login");
        }
        info!(
            tenant_id = %tenant.id,
            user_id = %user.id,
            verifier = %identity.verified_by,
            "Foreign credential exchanged"
        );
        Ok(pair)
    }

    /// Read-only inspection of a foreign credential. Nothing is created and
    /// no token is minted.
    pub async fn verify(&self, credential: &str) -> PlaneResult<IdentityInspection> {
        let identity = self.verifiers.verify(credential).await?;

        let tenant = match identity.org_id.as_deref() {
            Some(org_id) => self
                .find_tenant(org_id)
                .await?
                .filter(|t| t.status == TenantStatus::Active),
            None => None,
        };
        let resolved = match tenant {
            Some(tenant) => Some(ResolvedTenant {
                workspace_id: self.primary_workspace(&tenant).await,
                id: tenant.id,
                slug: tenant.slug,
            }),
            None => None,
        };

        let mut user = self.users.find_by_external_id(&identity.subject).await?;
        if user.is_none()
            && let Some(email) = identity.email.as_deref()
        {
            user = self.users.find_by_email(email).await?;
        }

        Ok(IdentityInspection {
            subject: identity.subject,
            org_id: identity.org_id,
            email: identity.email,
            org_role: identity.org_role,
            user_id: user.map(|u| u.id),
            tenant: resolved,
        })
    }

    /// Trade a refresh token for a fresh pair. The token names only the
    /// global user; the tenant comes from that user's current linkage.
    pub async fn refresh(&self, refresh_token: &str) -> PlaneResult<TokenPair> {
        let claims = decode_refresh_token(refresh_token, &self.auth)?;
        let user_id = claims.user_uuid()?;

        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| PlaneError::AuthenticationFailed {
                reason: "refresh token names an unknown user".into(),
            })?;
        let tenant_id = user.tenant_id.ok_or_else(|| PlaneError::AuthenticationFailed {
            reason: "user is not linked to a tenant".into(),
        })?;

        let tenant = self.active_tenant(&tenant_id.to_string()).await?;
        let linked = self.link(&tenant, &user).await?;

        debug!(tenant_id = %tenant.id, user_id = %user.id, "Refresh token exchanged");
        Ok(issue_token_pair(
            &TokenSubject {
                tenant_id: tenant.id,
                workspace_id: linked.workspace_id,
                user_id: linked.user_id,
                user_workspace_id: linked.id,
            },
            user.id,
            &self.auth,
        )?)
    }

    /// Registry lookup by external org id, then by tenant id for
    /// credentials that carry ours.
    async fn find_tenant(&self, org_id: &str) -> PlaneResult<Option<Tenant>> {
        if let Some(tenant) = self.tenants.find_by_external_org(org_id).await? {
            return Ok(Some(tenant));
        }
        match Uuid::parse_str(org_id) {
            Ok(id) => self.tenants.find_by_id(id).await,
            Err(_) => Ok(None),
        }
    }

    async fn active_tenant(&self, org_id: &str) -> PlaneResult<Tenant> {
        match self.find_tenant(org_id).await? {
            Some(tenant)
                if tenant.status == TenantStatus::Active
                    && tenant.connection_descriptor.is_some() =>
            {
                Ok(tenant)
            }
            other => {
                warn!(
                    external_org_id = %org_id,
                    status = ?other.map(|t| t.status),
                    "No active tenant for organization"
                );
                Err(PlaneError::TenantNotProvisioned {
                    org_id: org_id.to_string(),
                })
            }
        }
    }

    /// Find or create the global record and link it when unlinked.
    async fn global_user(&self, identity: &ForeignIdentity, tenant: &Tenant) -> PlaneResult<GlobalUser> {
        let email = identity
            .email
            .clone()
            .unwrap_or_else(|| self.auth.placeholder_email(&identity.subject));

        let upserted = self
            .users
            .upsert(CreateGlobalUser {
                email,
                external_user_id: Some(identity.subject.clone()),
                tenant_id: Some(tenant.id),
                first_name: identity.first_name.clone(),
                last_name: identity.last_name.clone(),
                ..Default::default()
            })
            .await?;
        let user = upserted.user;

        match user.tenant_id {
            None => {
                self.users
                    .update(
                        user.id,
                        UpdateGlobalUser {
                            tenant_id: Some(Some(tenant.id)),
                            ..Default::default()
                        },
                    )
                    .await
            }
            Some(linked) if linked != tenant.id => {
                warn!(
                    user_id = %user.id,
                    linked_tenant = %linked,
                    tenant_id = %tenant.id,
                    "User is linked to another tenant"
                );
                Ok(user)
            }
            Some(_) => Ok(user),
        }
    }

    async fn link(&self, tenant: &Tenant, user: &GlobalUser) -> PlaneResult<WorkspaceLinkage> {
        let handle = self.router.pool(descriptor(tenant)?).await.map_err(linkage)?;
        let workspace_id = self.workspace(&handle).await?;

        let downstream_id = self
            .backend
            .ensure_user(
                &handle,
                &DownstreamUser {
                    id: user.id,
                    email: user.email.clone(),
                    first_name: user.first_name.clone(),
                    last_name: user.last_name.clone(),
                },
            )
            .await
            .map_err(linkage)?;

        self.backend
            .ensure_linkage(&handle, downstream_id, workspace_id)
            .await
            .map_err(linkage)
    }

    async fn workspace(&self, handle: &B::Handle) -> PlaneResult<Uuid> {
        self.backend
            .primary_workspace(handle)
            .await
            .map_err(linkage)?
            .ok_or_else(|| PlaneError::LinkageFailure {
                reason: "tenant store has no workspace".into(),
            })
    }

    async fn primary_workspace(&self, tenant: &Tenant) -> Option<Uuid> {
        let descriptor = tenant.connection_descriptor.as_deref()?;
        let lookup = async {
            let handle = self.router.pool(descriptor).await?;
            self.backend.primary_workspace(&handle).await
        };
        match lookup.await {
            Ok(workspace) => workspace,
            Err(e) => {
                warn!(tenant_id = %tenant.id, error = %e, "Could not resolve workspace");
                None
            }
        }
    }
}

fn descriptor(tenant: &Tenant) -> PlaneResult<&str> {
    tenant
        .connection_descriptor
        .as_deref()
        .ok_or_else(|| PlaneError::LinkageFailure {
            reason: format!("tenant {} has no connection descriptor", tenant.id),
        })
}
