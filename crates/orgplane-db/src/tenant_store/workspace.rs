//! Workspace seeding and per-tenant membership for [`SurrealTenantStore`].
//!
//! Record ids are derived (UUIDv5) from their natural keys, so repeated
//! seeding and concurrent linkage upserts land on the same rows.

use orgplane_core::downstream::{
    CapabilitySet, DownstreamUser, InitializedWorkspace, OptionalStep, StepReport,
    WorkspaceInitializer, WorkspaceLinkage, WorkspaceSeed, WorkspaceStore,
};
use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::user::normalize_email;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb_types::SurrealValue;
use tracing::{debug, info};
use uuid::Uuid;

use super::SurrealTenantStore;
use crate::error::DbError;

const SYSTEM_ROLES: [&str; 3] = ["ADMIN", "EDITOR", "VIEWER"];

const DEFAULT_SETTINGS: [(&str, &str); 3] = [
    ("locale", "en"),
    ("timezone", "UTC"),
    ("date_format", "YYYY-MM-DD"),
];

#[derive(Debug, SurrealValue)]
struct IdRow {
    record_id: String,
}

#[derive(Debug, SurrealValue)]
struct WorkspaceIdRow {
    record_id: String,
    #[allow(dead_code)]
    created_at: chrono::DateTime<chrono::Utc>,
}

fn parse_uuid(raw: &str, entity: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(raw).map_err(|e| DbError::Decode(format!("invalid {entity} UUID: {e}")))
}

fn workspace_id_for(tenant_id: Uuid) -> Uuid {
    Uuid::new_v5(&tenant_id, b"workspace")
}

fn role_id_for(workspace_id: Uuid, label: &str) -> Uuid {
    Uuid::new_v5(&workspace_id, label.as_bytes())
}

fn linkage_id_for(user_id: Uuid, workspace_id: Uuid) -> Uuid {
    Uuid::new_v5(&workspace_id, user_id.as_bytes())
}

async fn execute(
    db: &Surreal<Any>,
    query: &str,
    binds: Vec<(&'static str, String)>,
) -> Result<(), DbError> {
    let mut builder = db.query(query);
    for (name, value) in binds {
        builder = builder.bind((name, value));
    }
    builder
        .await?
        .check()
        .map_err(|e| DbError::Query(e.to_string()))?;
    Ok(())
}

async fn find_member(db: &Surreal<Any>, email: &str) -> PlaneResult<Option<Uuid>> {
    let mut result = db
        .query("SELECT meta::id(id) AS record_id FROM member WHERE email = $email")
        .bind(("email", email.to_string()))
        .await
        .map_err(DbError::from)?;
    let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
    Ok(rows
        .into_iter()
        .next()
        .map(|row| parse_uuid(&row.record_id, "member"))
        .transpose()?)
}

impl SurrealTenantStore {
    async fn seed_roles(&self, db: &Surreal<Any>, workspace_id: Uuid) -> Result<(), DbError> {
        for label in SYSTEM_ROLES {
            execute(
                db,
                "UPSERT type::record('role', $id) SET \
                 workspace_id = $workspace_id, label = $label, is_editable = false",
                vec![
                    ("id", role_id_for(workspace_id, label).to_string()),
                    ("workspace_id", workspace_id.to_string()),
                    ("label", label.to_string()),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn seed_settings(&self, db: &Surreal<Any>, workspace_id: Uuid) -> Result<(), DbError> {
        for (name, value) in DEFAULT_SETTINGS {
            execute(
                db,
                "UPSERT type::record('workspace_setting', $id) SET \
                 workspace_id = $workspace_id, name = $name, value = $value",
                vec![
                    ("id", Uuid::new_v5(&workspace_id, name.as_bytes()).to_string()),
                    ("workspace_id", workspace_id.to_string()),
                    ("name", name.to_string()),
                    ("value", value.to_string()),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn seed_object_permissions(
        &self,
        db: &Surreal<Any>,
        workspace_id: Uuid,
    ) -> Result<(), DbError> {
        for label in SYSTEM_ROLES {
            let role_id = role_id_for(workspace_id, label);
            let (can_update, can_delete) = match label {
                "ADMIN" => (true, true),
                "EDITOR" => (true, false),
                _ => (false, false),
            };
            db.query(
                "UPSERT type::record('object_permission', $id) SET \
                 role_id = $role_id, object = '*', can_read = true, \
                 can_update = $can_update, can_delete = $can_delete",
            )
            .bind(("id", Uuid::new_v5(&role_id, b"*").to_string()))
            .bind(("role_id", role_id.to_string()))
            .bind(("can_update", can_update))
            .bind(("can_delete", can_delete))
            .await?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        }
        Ok(())
    }
}

impl WorkspaceInitializer for SurrealTenantStore {
    fn capabilities(&self) -> CapabilitySet {
        self.config.capabilities.clone()
    }

    async fn initialize(
        &self,
        handle: &Surreal<Any>,
        seed: &WorkspaceSeed,
    ) -> PlaneResult<InitializedWorkspace> {
        let workspace_id = workspace_id_for(seed.tenant_id);
        let mut steps = Vec::new();

        execute(
            handle,
            "UPSERT type::record('workspace', $id) SET \
             tenant_id = $tenant_id, display_name = $display_name, \
             activation_status = 'active'",
            vec![
                ("id", workspace_id.to_string()),
                ("tenant_id", seed.tenant_id.to_string()),
                ("display_name", seed.display_name.clone()),
            ],
        )
        .await?;
        steps.push(StepReport::applied("workspace"));

        self.seed_roles(handle, workspace_id).await?;
        steps.push(StepReport::applied("roles"));

        let admin_linkage = match &seed.admin {
            Some(admin) => {
                let user_id = self.ensure_user(handle, admin).await?;
                let linkage = self.ensure_linkage(handle, user_id, workspace_id).await?;
                execute(
                    handle,
                    "UPDATE type::record('workspace_member', $id) SET role_id = $role_id",
                    vec![
                        ("id", linkage.id.to_string()),
                        ("role_id", role_id_for(workspace_id, "ADMIN").to_string()),
                    ],
                )
                .await?;
                steps.push(StepReport::applied("admin_user"));
                Some(linkage)
            }
            None => {
                steps.push(StepReport::skipped("admin_user", "no admin supplied"));
                None
            }
        };

        match &seed.external_org_id {
            Some(org_id) => {
                execute(
                    handle,
                    "UPSERT type::record('key_value', $id) SET \
                     workspace_id = $workspace_id, key = 'external_org_id', value = $value",
                    vec![
                        ("id", Uuid::new_v5(&workspace_id, b"external_org_id").to_string()),
                        ("workspace_id", workspace_id.to_string()),
                        ("value", org_id.clone()),
                    ],
                )
                .await?;
                steps.push(StepReport::applied("external_metadata"));
            }
            None => steps.push(StepReport::skipped(
                "external_metadata",
                "no external organization",
            )),
        }

        execute(
            handle,
            "DELETE onboarding_flag WHERE workspace_id = $workspace_id; \
             UPDATE type::record('workspace', $workspace_id) SET onboarding_complete = true;",
            vec![("workspace_id", workspace_id.to_string())],
        )
        .await?;
        steps.push(StepReport::applied("onboarding"));

        for step in &seed.optional_steps {
            if !self.config.capabilities.supports(*step) {
                steps.push(StepReport::skipped(step.as_str(), "not supported"));
                continue;
            }
            match step {
                OptionalStep::DefaultSettings => self.seed_settings(handle, workspace_id).await?,
                OptionalStep::ObjectPermissions => {
                    self.seed_object_permissions(handle, workspace_id).await?
                }
            }
            steps.push(StepReport::applied(step.as_str()));
        }

        info!(
            tenant_id = %seed.tenant_id,
            workspace_id = %workspace_id,
            "Workspace initialized"
        );

        Ok(InitializedWorkspace {
            workspace_id,
            admin_linkage,
            steps,
        })
    }
}

impl WorkspaceStore for SurrealTenantStore {
    async fn primary_workspace(&self, handle: &Surreal<Any>) -> PlaneResult<Option<Uuid>> {
        let mut result = handle
            .query(
                "SELECT meta::id(id) AS record_id, created_at FROM workspace \
                 WHERE activation_status = 'active' \
                 ORDER BY created_at ASC LIMIT 1",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<WorkspaceIdRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| parse_uuid(&row.record_id, "workspace"))
            .transpose()?)
    }

    async fn ensure_user(&self, handle: &Surreal<Any>, user: &DownstreamUser) -> PlaneResult<Uuid> {
        let email = normalize_email(&user.email);

        if let Some(id) = find_member(handle, &email).await? {
            return Ok(id);
        }

        let created = handle
            .query(
                "CREATE type::record('member', $id) SET \
                 email = $email, first_name = $first_name, \
                 last_name = $last_name, email_verified = true",
            )
            .bind(("id", user.id.to_string()))
            .bind(("email", email.clone()))
            .bind(("first_name", user.first_name.clone()))
            .bind(("last_name", user.last_name.clone()))
            .await
            .map_err(DbError::from)?;

        match created.check() {
            Ok(_) => {
                debug!(user_id = %user.id, "Downstream user created");
                Ok(user.id)
            }
            // Lost a race on the email index: the winner's row is the answer.
            Err(e) => find_member(handle, &email)
                .await?
                .ok_or_else(|| DbError::Query(e.to_string()).into()),
        }
    }

    async fn ensure_linkage(
        &self,
        handle: &Surreal<Any>,
        user_id: Uuid,
        workspace_id: Uuid,
    ) -> PlaneResult<WorkspaceLinkage> {
        let mut result = handle
            .query("SELECT meta::id(id) AS record_id FROM type::record('workspace', $id)")
            .bind(("id", workspace_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<IdRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(PlaneError::LinkageFailure {
                reason: format!("workspace {workspace_id} does not exist in tenant store"),
            });
        }

        let linkage = WorkspaceLinkage {
            id: linkage_id_for(user_id, workspace_id),
            user_id,
            workspace_id,
        };

        let created = handle
            .query(
                "CREATE type::record('workspace_member', $id) SET \
                 user_id = $user_id, workspace_id = $workspace_id, role_id = NONE",
            )
            .bind(("id", linkage.id.to_string()))
            .bind(("user_id", user_id.to_string()))
            .bind(("workspace_id", workspace_id.to_string()))
            .await
            .map_err(DbError::from)?;

        if let Err(e) = created.check() {
            let mut existing = handle
                .query(
                    "SELECT meta::id(id) AS record_id FROM workspace_member \
                     WHERE user_id = $user_id AND workspace_id = $workspace_id",
                )
                .bind(("user_id", user_id.to_string()))
                .bind(("workspace_id", workspace_id.to_string()))
                .await
                .map_err(DbError::from)?;
            let rows: Vec<IdRow> = existing.take(0).map_err(DbError::from)?;
            let row = rows
                .into_iter()
                .next()
                .ok_or_else(|| DbError::Query(e.to_string()))?;
            return Ok(WorkspaceLinkage {
                id: parse_uuid(&row.record_id, "workspace_member")?,
                user_id,
                workspace_id,
            });
        }

        Ok(linkage)
    }
}
