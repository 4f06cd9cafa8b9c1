//! SurrealDB implementation of [`TenantRepository`].
//!
//! Slug uniqueness is a unique index on `tenant.slug`. External org
//! uniqueness is a reservation row in `tenant_org_link` keyed by the org
//! id, written in the same transaction as the tenant change.

use chrono::{DateTime, Utc};
use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::tenant::{CreateTenant, PlanTier, Tenant, TenantStatus};
use orgplane_core::repository::TenantRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct TenantRow {
    name: String,
    slug: String,
    external_org_id: Option<String>,
    connection_descriptor: Option<String>,
    status: String,
    plan: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRow {
    fn into_tenant(self, id: Uuid) -> Result<Tenant, DbError> {
        Ok(Tenant {
            id,
            slug: self.slug,
            name: self.name,
            external_org_id: self.external_org_id,
            connection_descriptor: self.connection_descriptor,
            status: parse_status(&self.status)?,
            plan: parse_plan(&self.plan)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct TenantRowWithId {
    record_id: String,
    name: String,
    slug: String,
    external_org_id: Option<String>,
    connection_descriptor: Option<String>,
    status: String,
    plan: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TenantRowWithId {
    fn try_into_tenant(self) -> Result<Tenant, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Decode(format!("invalid tenant UUID: {e}")))?;
        Ok(Tenant {
            id,
            slug: self.slug,
            name: self.name,
            external_org_id: self.external_org_id,
            connection_descriptor: self.connection_descriptor,
            status: parse_status(&self.status)?,
            plan: parse_plan(&self.plan)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct OrgLinkRow {
    tenant_id: String,
}

fn parse_status(s: &str) -> Result<TenantStatus, DbError> {
    s.parse()
        .map_err(|_| DbError::Decode(format!("unknown tenant status: {s}")))
}

fn parse_plan(s: &str) -> Result<PlanTier, DbError> {
    s.parse()
        .map_err(|_| DbError::Decode(format!("unknown plan tier: {s}")))
}

/// SurrealDB implementation of the tenant registry.
#[derive(Clone)]
pub struct SurrealTenantRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTenantRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn get(&self, id: Uuid) -> PlaneResult<Tenant> {
        self.find_by_id(id).await?.ok_or_else(|| {
            DbError::NotFound {
                entity: "tenant".into(),
                id: id.to_string(),
            }
            .into()
        })
    }

    /// Tenant currently holding the reservation for `org_id`.
    async fn org_owner(&self, org_id: &str) -> PlaneResult<Option<Uuid>> {
        let mut result = self
            .db
            .query("SELECT tenant_id FROM type::record('tenant_org_link', $org_id)")
            .bind(("org_id", org_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<OrgLinkRow> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(|row| {
                Uuid::parse_str(&row.tenant_id)
                    .map_err(|e| DbError::Decode(format!("invalid tenant UUID: {e}")).into())
            })
            .transpose()
    }

    /// Explain why a create transaction was rejected.
    async fn classify_create_failure(&self, input: &CreateTenant, detail: String) -> PlaneError {
        match self.find_by_slug(&input.slug).await {
            Ok(Some(_)) => {
                return PlaneError::DuplicateTenant {
                    field: "slug".into(),
                    value: input.slug.clone(),
                };
            }
            Err(e) => return e,
            Ok(None) => {}
        }
        if let Some(org_id) = &input.external_org_id {
            match self.org_owner(org_id).await {
                Ok(Some(_)) => {
                    return PlaneError::DuplicateTenant {
                        field: "external_org_id".into(),
                        value: org_id.clone(),
                    };
                }
                Err(e) => return e,
                Ok(None) => {}
            }
        }
        DbError::Query(detail).into()
    }
}

impl<C: Connection> TenantRepository for SurrealTenantRepository<C> {
    async fn create(&self, input: CreateTenant) -> PlaneResult<Tenant> {
        if self.find_by_slug(&input.slug).await?.is_some() {
            return Err(PlaneError::DuplicateTenant {
                field: "slug".into(),
                value: input.slug,
            });
        }
        if let Some(org_id) = &input.external_org_id
            && self.org_owner(org_id).await?.is_some()
        {
            return Err(PlaneError::DuplicateTenant {
                field: "external_org_id".into(),
                value: org_id.clone(),
            });
        }

        let id = Uuid::new_v4();
        let mut query = String::from(
            "BEGIN TRANSACTION; \
             CREATE type::record('tenant', $id) SET \
             name = $name, slug = $slug, \
             external_org_id = $org_id, \
             connection_descriptor = NONE, \
             status = 'pending', plan = $plan;",
        );
        if input.external_org_id.is_some() {
            query.push_str(
                " CREATE type::record('tenant_org_link', $org_id) \
                 SET tenant_id = $id;",
            );
        }
        query.push_str(" COMMIT TRANSACTION;");

        let result = self
            .db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("name", input.name.clone()))
            .bind(("slug", input.slug.clone()))
            .bind(("org_id", input.external_org_id.clone()))
            .bind(("plan", input.plan.as_str()))
            .await
            .map_err(DbError::from)?;

        // A concurrent writer can win between the pre-checks and the commit.
        if let Err(e) = result.check() {
            let err = self.classify_create_failure(&input, e.to_string()).await;
            warn!(slug = %input.slug, error = %err, "Tenant create rejected");
            return Err(err);
        }

        info!(tenant_id = %id, slug = %input.slug, "Tenant registered");
        self.get(id).await
    }

    async fn find_by_id(&self, id: Uuid) -> PlaneResult<Option<Tenant>> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('tenant', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.into_tenant(id))
            .transpose()?)
    }

    async fn find_by_slug(&self, slug: &str) -> PlaneResult<Option<Tenant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM tenant WHERE slug = $slug",
            )
            .bind(("slug", slug.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.try_into_tenant())
            .transpose()?)
    }

    async fn find_by_external_org(&self, org_id: &str) -> PlaneResult<Option<Tenant>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM tenant WHERE external_org_id = $org_id",
            )
            .bind(("org_id", org_id.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TenantRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.try_into_tenant())
            .transpose()?)
    }

    async fn set_status(&self, id: Uuid, status: TenantStatus) -> PlaneResult<Tenant> {
        let current = self.get(id).await?;
        if current.status == status {
            return Ok(current);
        }
        if !current.status.can_transition_to(status) {
            return Err(PlaneError::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        let result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 status = $next, updated_at = time::now() \
                 WHERE status = $current",
            )
            .bind(("id", id.to_string()))
            .bind(("next", status.as_str()))
            .bind(("current", current.status.as_str()))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => {
                info!(tenant_id = %id, from = %current.status, to = %status, "Tenant status changed");
                Ok(row.into_tenant(id)?)
            }
            // Lost the compare-and-set to another writer.
            None => {
                let actual = self.get(id).await?;
                Err(PlaneError::InvalidTransition {
                    from: actual.status.to_string(),
                    to: status.to_string(),
                })
            }
        }
    }

    async fn set_connection(&self, id: Uuid, descriptor: &str) -> PlaneResult<Tenant> {
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "UPDATE type::record('tenant', $id) SET \
                 connection_descriptor = $descriptor, \
                 updated_at = time::now()",
            )
            .bind(("id", id_str.clone()))
            .bind(("descriptor", descriptor.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<TenantRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "tenant".into(),
            id: id_str,
        })?;

        Ok(row.into_tenant(id)?)
    }

    async fn link_external_org(&self, id: Uuid, org_id: &str) -> PlaneResult<Tenant> {
        let tenant = self.get(id).await?;
        match tenant.external_org_id.as_deref() {
            Some(existing) if existing == org_id => return Ok(tenant),
            Some(existing) => {
                return Err(PlaneError::validation(format!(
                    "tenant {id} is already linked to organization {existing}"
                )));
            }
            None => {}
        }
        if let Some(owner) = self.org_owner(org_id).await? {
            if owner == id {
                return self.get(id).await;
            }
            return Err(PlaneError::ConflictingLink {
                org_id: org_id.to_string(),
            });
        }

        let result = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 CREATE type::record('tenant_org_link', $org_id) \
                 SET tenant_id = $id; \
                 UPDATE type::record('tenant', $id) SET \
                 external_org_id = $org_id, updated_at = time::now(); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("org_id", org_id.to_string()))
            .await
            .map_err(DbError::from)?;

        if let Err(e) = result.check() {
            return match self.org_owner(org_id).await? {
                Some(owner) if owner == id => self.get(id).await,
                Some(_) => Err(PlaneError::ConflictingLink {
                    org_id: org_id.to_string(),
                }),
                None => Err(DbError::Query(e.to_string()).into()),
            };
        }

        info!(tenant_id = %id, org_id, "External organization linked");
        self.get(id).await
    }
}
