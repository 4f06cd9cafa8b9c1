//! SurrealDB-backed downstream: every tenant gets its own database inside
//! a shared namespace, opened from a [`ConnectionDescriptor`].

mod descriptor;
mod workspace;

use orgplane_core::downstream::{CapabilitySet, ConnectionFactory, OptionalStep, StoreAllocator};
use orgplane_core::error::PlaneResult;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tracing::info;
use uuid::Uuid;

use crate::connection::{is_embedded, open};
use crate::error::DbError;

pub use descriptor::ConnectionDescriptor;

/// Tables every tenant store carries. Applied on each open, so it must stay
/// idempotent.
const TENANT_SCHEMA: &str = "\
DEFINE TABLE IF NOT EXISTS workspace SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS tenant_id ON TABLE workspace TYPE string;
DEFINE FIELD IF NOT EXISTS display_name ON TABLE workspace TYPE string;
DEFINE FIELD IF NOT EXISTS activation_status ON TABLE workspace TYPE string \
    ASSERT $value IN ['pending_creation', 'active', 'inactive'];
DEFINE FIELD IF NOT EXISTS onboarding_complete ON TABLE workspace TYPE bool \
    DEFAULT false;
DEFINE FIELD IF NOT EXISTS created_at ON TABLE workspace TYPE datetime \
    DEFAULT time::now();

DEFINE TABLE IF NOT EXISTS role SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS workspace_id ON TABLE role TYPE string;
DEFINE FIELD IF NOT EXISTS label ON TABLE role TYPE string;
DEFINE FIELD IF NOT EXISTS is_editable ON TABLE role TYPE bool DEFAULT false;
DEFINE INDEX IF NOT EXISTS idx_role_workspace_label ON TABLE role \
    COLUMNS workspace_id, label UNIQUE;

DEFINE TABLE IF NOT EXISTS member SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS email ON TABLE member TYPE string;
DEFINE FIELD IF NOT EXISTS first_name ON TABLE member TYPE option<string>;
DEFINE FIELD IF NOT EXISTS last_name ON TABLE member TYPE option<string>;
DEFINE FIELD IF NOT EXISTS email_verified ON TABLE member TYPE bool \
    DEFAULT true;
DEFINE FIELD IF NOT EXISTS created_at ON TABLE member TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_member_email ON TABLE member \
    COLUMNS email UNIQUE;

DEFINE TABLE IF NOT EXISTS workspace_member SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS user_id ON TABLE workspace_member TYPE string;
DEFINE FIELD IF NOT EXISTS workspace_id ON TABLE workspace_member TYPE string;
DEFINE FIELD IF NOT EXISTS role_id ON TABLE workspace_member \
    TYPE option<string>;
DEFINE FIELD IF NOT EXISTS created_at ON TABLE workspace_member \
    TYPE datetime DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_workspace_member_pair ON TABLE workspace_member \
    COLUMNS user_id, workspace_id UNIQUE;

DEFINE TABLE IF NOT EXISTS key_value SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS workspace_id ON TABLE key_value TYPE string;
DEFINE FIELD IF NOT EXISTS key ON TABLE key_value TYPE string;
DEFINE FIELD IF NOT EXISTS value ON TABLE key_value TYPE string;

DEFINE TABLE IF NOT EXISTS onboarding_flag SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS workspace_id ON TABLE onboarding_flag TYPE string;
DEFINE FIELD IF NOT EXISTS flag ON TABLE onboarding_flag TYPE string;

DEFINE TABLE IF NOT EXISTS workspace_setting SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS workspace_id ON TABLE workspace_setting TYPE string;
DEFINE FIELD IF NOT EXISTS name ON TABLE workspace_setting TYPE string;
DEFINE FIELD IF NOT EXISTS value ON TABLE workspace_setting TYPE string;

DEFINE TABLE IF NOT EXISTS object_permission SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS role_id ON TABLE object_permission TYPE string;
DEFINE FIELD IF NOT EXISTS object ON TABLE object_permission TYPE string;
DEFINE FIELD IF NOT EXISTS can_read ON TABLE object_permission TYPE bool;
DEFINE FIELD IF NOT EXISTS can_update ON TABLE object_permission TYPE bool;
DEFINE FIELD IF NOT EXISTS can_delete ON TABLE object_permission TYPE bool;
";

/// Where tenant stores live and what the initializer may do in them.
#[derive(Debug, Clone)]
pub struct TenantStoreConfig {
    /// Endpoint shared by all tenant databases (e.g., `ws://127.0.0.1:8000`).
    pub endpoint: String,
    pub namespace: String,
    /// Root credentials; empty disables sign-in.
    pub username: String,
    pub password: String,
    pub capabilities: CapabilitySet,
}

impl Default for TenantStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".into(),
            namespace: "tenants".into(),
            username: String::new(),
            password: String::new(),
            capabilities: CapabilitySet::new([OptionalStep::DefaultSettings]),
        }
    }
}

/// Allocates, opens and seeds tenant databases.
#[derive(Debug, Clone)]
pub struct SurrealTenantStore {
    config: TenantStoreConfig,
}

impl SurrealTenantStore {
    pub fn new(config: TenantStoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TenantStoreConfig {
        &self.config
    }
}

impl StoreAllocator for SurrealTenantStore {
    async fn allocate(&self, tenant_id: Uuid, slug: &str) -> PlaneResult<String> {
        let descriptor = ConnectionDescriptor {
            endpoint: self.config.endpoint.clone(),
            namespace: self.config.namespace.clone(),
            database: ConnectionDescriptor::database_for_slug(slug),
        };

        // Embedded stores come into existence on first open.
        if !is_embedded(&descriptor.endpoint) {
            let db = open(
                &descriptor.endpoint,
                &self.config.username,
                &self.config.password,
                &descriptor.namespace,
                &descriptor.database,
            )
            .await
            .map_err(DbError::from)?;
            db.query(format!(
                "DEFINE DATABASE IF NOT EXISTS {}",
                descriptor.database
            ))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;
        }

        info!(
            tenant_id = %tenant_id,
            database = %descriptor.database,
            "Allocated tenant store"
        );
        Ok(descriptor.to_string())
    }
}

impl ConnectionFactory for SurrealTenantStore {
    type Handle = Surreal<Any>;

    async fn open(&self, descriptor: &str) -> PlaneResult<Surreal<Any>> {
        let parsed: ConnectionDescriptor = descriptor.parse()?;

        let db = open(
            &parsed.endpoint,
            &self.config.username,
            &self.config.password,
            &parsed.namespace,
            &parsed.database,
        )
        .await
        .map_err(DbError::from)?;

        db.query(TENANT_SCHEMA)
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Migration(e.to_string()))?;

        info!(database = %parsed.database, "Opened tenant store");
        Ok(db)
    }
}
