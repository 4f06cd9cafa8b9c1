//! Schema definitions and migration runner for the control-plane database.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. Nullable-but-unique columns are
//! guarded by reservation tables whose record id is the reserved value.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "control_plane",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1: tenant registry, global users, idempotency ledger
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Tenant registry
-- =======================================================================
DEFINE TABLE tenant SCHEMAFULL;
DEFINE FIELD name ON TABLE tenant TYPE string;
DEFINE FIELD slug ON TABLE tenant TYPE string;
DEFINE FIELD external_org_id ON TABLE tenant TYPE option<string>;
DEFINE FIELD connection_descriptor ON TABLE tenant TYPE option<string>;
DEFINE FIELD status ON TABLE tenant TYPE string \
    ASSERT $value IN ['pending', 'provisioning', 'active', 'failed'];
DEFINE FIELD plan ON TABLE tenant TYPE string \
    ASSERT $value IN ['free', 'pro', 'enterprise'];
DEFINE FIELD created_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE tenant TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_tenant_slug ON TABLE tenant COLUMNS slug UNIQUE;
DEFINE INDEX idx_tenant_external_org ON TABLE tenant \
    COLUMNS external_org_id;

-- Record id is the external organization id.
DEFINE TABLE tenant_org_link SCHEMAFULL;
DEFINE FIELD tenant_id ON TABLE tenant_org_link TYPE string;
DEFINE FIELD created_at ON TABLE tenant_org_link TYPE datetime \
    DEFAULT time::now();

-- =======================================================================
-- Global users (cross-tenant identity anchor)
-- =======================================================================
DEFINE TABLE global_user SCHEMAFULL;
DEFINE FIELD email ON TABLE global_user TYPE string;
DEFINE FIELD external_user_id ON TABLE global_user TYPE option<string>;
DEFINE FIELD tenant_id ON TABLE global_user TYPE option<string>;
DEFINE FIELD first_name ON TABLE global_user TYPE option<string>;
DEFINE FIELD last_name ON TABLE global_user TYPE option<string>;
DEFINE FIELD role ON TABLE global_user TYPE string \
    ASSERT $value IN ['admin', 'member'];
DEFINE FIELD password_hash ON TABLE global_user TYPE option<string>;
DEFINE FIELD active ON TABLE global_user TYPE bool DEFAULT true;
DEFINE FIELD last_login_at ON TABLE global_user TYPE option<datetime>;
DEFINE FIELD created_at ON TABLE global_user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE global_user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_global_user_email ON TABLE global_user \
    COLUMNS email UNIQUE;
DEFINE INDEX idx_global_user_external ON TABLE global_user \
    COLUMNS external_user_id;
DEFINE INDEX idx_global_user_tenant ON TABLE global_user \
    COLUMNS tenant_id;

-- Record id is the external user id.
DEFINE TABLE user_external_link SCHEMAFULL;
DEFINE FIELD user_id ON TABLE user_external_link TYPE string;
DEFINE FIELD created_at ON TABLE user_external_link TYPE datetime \
    DEFAULT time::now();

-- =======================================================================
-- Idempotency ledger (record id is the namespaced key)
-- =======================================================================
DEFINE TABLE idempotency SCHEMAFULL;
DEFINE FIELD operation ON TABLE idempotency TYPE string;
DEFINE FIELD status ON TABLE idempotency TYPE string \
    ASSERT $value IN ['processing', 'completed', 'failed'];
DEFINE FIELD result ON TABLE idempotency TYPE option<string>;
DEFINE FIELD error ON TABLE idempotency TYPE option<string>;
DEFINE FIELD created_at ON TABLE idempotency TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE idempotency TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD completed_at ON TABLE idempotency TYPE option<datetime>;
DEFINE INDEX idx_idempotency_status ON TABLE idempotency \
    COLUMNS status, updated_at;
";

/// Run all pending migrations against the given database.
///
/// Idempotent: migrations already recorded in `_migration` are skipped.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}
