//! Database-specific error types and conversions.

use orgplane_core::error::PlaneError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Stored record could not be decoded: {0}")]
    Decode(String),

    #[error("Invalid connection descriptor: {0}")]
    Descriptor(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for PlaneError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => PlaneError::NotFound { entity, id },
            DbError::Descriptor(msg) => PlaneError::validation(msg),
            DbError::Decode(msg) => PlaneError::Internal(msg),
            other => PlaneError::Database(other.to_string()),
        }
    }
}
