//! Tenant provisioning state machine and its background queue.
//!
//! `pending -> provisioning -> active`, or `provisioning -> failed`. Once
//! the registry row exists every failure moves it to `failed`; the slug
//! and external org link stay reserved and the allocated store is left in
//! place for operators. Its cached connection is dropped.

use std::sync::Arc;

use orgplane_auth::AuthConfig;
use orgplane_auth::password::hash_password;
use orgplane_auth::token::issue_access_token;
use orgplane_core::downstream::{DownstreamBackend, DownstreamUser, WorkspaceSeed};
use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::provisioning::{
    AdminCredentials, JobOrigin, ProvisionRequest, ProvisionedTenant, ProvisioningJob,
};
use orgplane_core::models::tenant::{CreateTenant, Tenant, TenantStatus};
use orgplane_core::models::token::TokenSubject;
use orgplane_core::models::user::{CreateGlobalUser, GlobalUser, UpdateGlobalUser, UserRole};
use orgplane_core::repository::{GlobalUserRepository, TenantRepository};
use orgplane_core::slug;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::router::ConnectionRouter;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric disambiguator.
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

pub struct Provisioner<T, U, B>
where
    T: TenantRepository,
    U: GlobalUserRepository,
    B: DownstreamBackend,
{
    tenants: Arc<T>,
    users: Arc<U>,
    backend: Arc<B>,
    router: Arc<ConnectionRouter<B>>,
    auth: Arc<AuthConfig>,
    config: EngineConfig,
}

impl<T, U, B> Provisioner<T, U, B>
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
        auth: Arc<AuthConfig>,
        config: EngineConfig,
    ) -> Self {
        Self {
            tenants,
            users,
            backend,
            router,
            auth,
            config,
        }
    }

    /// Create and seed one tenant.
    ///
    /// Errors raised before the registry row exists are returned as is.
    /// Later errors are wrapped in `PlaneError::Provisioning` after the row
    /// has been marked `failed`.
    pub async fn provision(
        &self,
        request: ProvisionRequest,
        origin: JobOrigin,
    ) -> PlaneResult<ProvisionedTenant> {
        let base = slug::normalize(&request.organization_name);
        if base.is_empty() {
            return Err(PlaneError::validation(
                "organization name must contain at least one letter or digit",
            ));
        }

        // The admin is resolved first: downstream user ids reuse the global id,
        // and a rejected admin must not leave a reserved slug behind.
        let admin = match &request.admin {
            Some(admin) => {
                let user = self.resolve_admin(admin, origin).await?;
                let password_hash = self.admin_password_hash(admin, &user)?;
                Some((user, password_hash))
            }
            None => None,
        };

        let tenant = self.create_with_unique_slug(&request, &base).await?;
        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            origin = ?origin,
            "Tenant registered"
        );

        match self.run(&tenant, admin, origin).await {
            Ok(provisioned) => Ok(provisioned),
            Err(e) => {
                error!(tenant_id = %tenant.id, slug = %tenant.slug, error = %e, "Provisioning failed");
                if let Err(mark) = self.tenants.set_status(tenant.id, TenantStatus::Failed).await {
                    error!(tenant_id = %tenant.id, error = %mark, "Could not mark tenant failed");
                }
                self.release_connection(tenant.id).await;
                Err(PlaneError::Provisioning {
                    tenant_id: tenant.id.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Drop the cached store handle of a tenant that will not go active.
    async fn release_connection(&self, tenant_id: Uuid) {
        match self.tenants.find_by_id(tenant_id).await {
            Ok(Some(Tenant {
                connection_descriptor: Some(descriptor),
                ..
            })) => {
                if self.router.evict(&descriptor).await {
                    debug!(tenant_id = %tenant_id, "Tenant store connection released");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(tenant_id = %tenant_id, error = %e, "Could not release tenant store connection");
            }
        }
    }

    async fn create_with_unique_slug(
        &self,
        request: &ProvisionRequest,
        base: &str,
    ) -> PlaneResult<Tenant> {
        let attempts = self.config.slug_max_attempts.max(1);
        for attempt in 0..attempts {
            let candidate = if attempt == 0 {
                base.to_string()
            } else {
                slug::with_suffix(base, &random_suffix(self.config.slug_suffix_len))
            };

            let input = CreateTenant {
                name: request.organization_name.trim().to_string(),
                slug: candidate,
                external_org_id: request.external_org_id.clone(),
                plan: request.plan,
            };
            match self.tenants.create(input).await {
                Ok(tenant) => return Ok(tenant),
                Err(PlaneError::DuplicateTenant { field, value }) if field == "slug" => {
                    info!(slug = %value, attempt, "Slug taken, retrying with a suffix");
                }
                Err(e) => return Err(e),
            }
        }

        Err(PlaneError::SlugExhausted {
            base: base.to_string(),
            attempts,
        })
    }

    async fn run(
        &self,
        tenant: &Tenant,
        admin: Option<(GlobalUser, Option<String>)>,
        origin: JobOrigin,
    ) -> PlaneResult<ProvisionedTenant> {
        self.tenants
            .set_status(tenant.id, TenantStatus::Provisioning)
            .await?;

        let descriptor = self.backend.allocate(tenant.id, &tenant.slug).await?;
        self.tenants.set_connection(tenant.id, &descriptor).await?;
        let handle = self.router.pool(&descriptor).await?;

        let seed = WorkspaceSeed {
            tenant_id: tenant.id,
            display_name: tenant.name.clone(),
            admin: admin.as_ref().map(|(user, _)| DownstreamUser {
                id: user.id,
                email: user.email.clone(),
                first_name: user.first_name.clone(),
                last_name: user.last_name.clone(),
            }),
            external_org_id: tenant.external_org_id.clone(),
            optional_steps: self.config.optional_steps.clone(),
        };
        let initialized = self.backend.initialize(&handle, &seed).await?;

        let mut access_token = None;
        let mut admin_user_id = None;
        if let Some((user, password_hash)) = admin {
            let linked = self
                .users
                .update(
                    user.id,
                    UpdateGlobalUser {
                        role: Some(UserRole::Admin),
                        tenant_id: link_target(&user, tenant.id),
                        password_hash,
                        ..Default::default()
                    },
                )
                .await?;
            admin_user_id = Some(linked.id);

            if origin == JobOrigin::Registration
                && let Some(linkage) = &initialized.admin_linkage
            {
                let subject = TokenSubject {
                    tenant_id: tenant.id,
                    workspace_id: initialized.workspace_id,
                    user_id: linkage.user_id,
                    user_workspace_id: linkage.id,
                };
                let (token, _) = issue_access_token(&subject, &self.auth)?;
                access_token = Some(token);
                self.users.touch_last_login(linked.id).await?;
            }
        }

        let tenant = self
            .tenants
            .set_status(tenant.id, TenantStatus::Active)
            .await?;
        info!(
            tenant_id = %tenant.id,
            slug = %tenant.slug,
            workspace_id = %initialized.workspace_id,
            "Tenant active"
        );

        Ok(ProvisionedTenant {
            tenant,
            workspace_id: initialized.workspace_id,
            admin_user_id,
            access_token,
            steps: initialized.steps,
        })
    }

    /// Find or create the admin's global record. Registration never takes
    /// over an account that already belongs to another tenant.
    async fn resolve_admin(
        &self,
        admin: &AdminCredentials,
        origin: JobOrigin,
    ) -> PlaneResult<GlobalUser> {
        let upserted = self
            .users
            .upsert(CreateGlobalUser {
                email: admin.email.clone(),
                external_user_id: admin.external_user_id.clone(),
                first_name: admin.first_name.clone(),
                last_name: admin.last_name.clone(),
                ..Default::default()
            })
            .await?;

        let user = upserted.user;
        if !upserted.created && origin == JobOrigin::Registration && user.tenant_id.is_some() {
            return Err(PlaneError::AlreadyExists {
                entity: "admin user".into(),
            });
        }
        Ok(user)
    }

    fn admin_password_hash(
        &self,
        admin: &AdminCredentials,
        user: &GlobalUser,
    ) -> PlaneResult<Option<String>> {
        match admin.password.as_deref() {
            Some(_) if user.password_hash.is_some() => {
                warn!(user_id = %user.id, "Admin already has a password; keeping it");
                Ok(None)
            }
            Some(password) => Ok(Some(hash_password(password, self.auth.pepper.as_deref())?)),
            None => Ok(None),
        }
    }
}

/// Link unlinked users; leave an existing link alone.
fn link_target(user: &GlobalUser, tenant_id: Uuid) -> Option<Option<Uuid>> {
    match user.tenant_id {
        None => Some(Some(tenant_id)),
        Some(existing) if existing != tenant_id => {
            warn!(
                user_id = %user.id,
                linked_tenant = %existing,
                tenant_id = %tenant_id,
                "Admin stays linked to their current tenant"
            );
            None
        }
        Some(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Hands provisioning jobs to a single background worker.
#[derive(Clone)]
pub struct ProvisioningQueue {
    tx: mpsc::Sender<ProvisioningJob>,
}

impl ProvisioningQueue {
    /// Start the worker. It runs until every queue handle is dropped.
    pub fn spawn<T, U, B>(
        provisioner: Arc<Provisioner<T, U, B>>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>)
    where
        T: TenantRepository + 'static,
        U: GlobalUserRepository + 'static,
        B: DownstreamBackend,
    {
        let (tx, mut rx) = mpsc::channel::<ProvisioningJob>(capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let org = job.request.external_org_id.clone();
                match provisioner.provision(job.request, job.origin).await {
                    Ok(provisioned) => info!(
                        job_id = %job.id,
                        tenant_id = %provisioned.tenant.id,
                        external_org_id = ?org,
                        "Queued provisioning finished"
                    ),
                    Err(e) => error!(
                        job_id = %job.id,
                        external_org_id = ?org,
                        error = %e,
                        "Queued provisioning failed"
                    ),
                }
            }
            info!("Provisioning queue closed");
        });

        (Self { tx }, worker)
    }

    pub async fn enqueue(&self, job: ProvisioningJob) -> PlaneResult<Uuid> {
        let id = job.id;
        self.tx
            .send(job)
            .await
            .map_err(|_| PlaneError::Internal("provisioning queue is closed".into()))?;
        Ok(id)
    }
}
