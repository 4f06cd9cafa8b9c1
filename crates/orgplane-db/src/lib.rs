//! orgplane database: SurrealDB connection management, the control-plane
//! schema, repository implementations and a SurrealDB-backed downstream
//! tenant store.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Registry, user and ledger repositories ([`repository`])
//! - Per-tenant databases ([`SurrealTenantStore`])
//! - Error types ([`DbError`])

mod connection;
mod error;
pub mod repository;
mod schema;
mod tenant_store;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::{run_migrations, schema_v1};
pub use tenant_store::{ConnectionDescriptor, SurrealTenantStore, TenantStoreConfig};
