//! SurrealDB implementation of [`IdempotencyRepository`].
//!
//! The ledger key is the record id, so `CREATE` is the atomic
//! first-writer-wins primitive. Results are stored as JSON text.

use chrono::{DateTime, Duration, Utc};
use orgplane_core::error::PlaneResult;
use orgplane_core::models::idempotency::{IdempotencyRecord, IdempotencyStatus};
use orgplane_core::repository::IdempotencyRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct IdempotencyRowWithId {
    record_id: String,
    operation: String,
    status: String,
    result: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRowWithId {
    fn try_into_record(self) -> Result<IdempotencyRecord, DbError> {
        let status: IdempotencyStatus = self
            .status
            .parse()
            .map_err(|_| DbError::Decode(format!("unknown ledger status: {}", self.status)))?;
        let result = self
            .result
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| DbError::Decode(format!("ledger result is not JSON: {e}")))?;
        Ok(IdempotencyRecord {
            key: self.record_id,
            operation: self.operation,
            status,
            result,
            error: self.error,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
        })
    }
}

/// Row struct for statements that only need to know a row was touched.
#[derive(Debug, SurrealValue)]
struct StatusRow {
    #[allow(dead_code)]
    status: String,
}

/// SurrealQL duration literal for a chrono duration, clamped at zero.
fn surreal_duration(d: Duration) -> String {
    format!("{}s", d.num_seconds().max(0))
}

/// SurrealDB implementation of the idempotency ledger store.
#[derive(Clone)]
pub struct SurrealIdempotencyRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealIdempotencyRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> IdempotencyRepository for SurrealIdempotencyRepository<C> {
    async fn insert_processing(&self, key: &str, operation: &str) -> PlaneResult<bool> {
        // Transport failures surface here and are never read as a duplicate.
        let result = self
            .db
            .query(
                "CREATE type::record('idempotency', $key) SET \
                 operation = $operation, status = 'processing', \
                 result = NONE, error = NONE, completed_at = NONE",
            )
            .bind(("key", key.to_string()))
            .bind(("operation", operation.to_string()))
            .await
            .map_err(DbError::from)?;

        match result.check() {
            Ok(_) => Ok(true),
            Err(e) => {
                if self.get(key).await?.is_some() {
                    debug!(key, "Ledger key already present");
                    Ok(false)
                } else {
                    Err(DbError::Query(e.to_string()).into())
                }
            }
        }
    }

    async fn get(&self, key: &str) -> PlaneResult<Option<IdempotencyRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * \
                 FROM type::record('idempotency', $key)",
            )
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdempotencyRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .map(|row| row.try_into_record())
            .transpose()?)
    }

    async fn mark_completed(&self, key: &str, result: &serde_json::Value) -> PlaneResult<bool> {
        let payload = serde_json::to_string(result)
            .map_err(|e| DbError::Decode(format!("result is not serializable: {e}")))?;

        let response = self
            .db
            .query(
                "UPDATE type::record('idempotency', $key) SET \
                 status = 'completed', result = $result, \
                 completed_at = time::now(), updated_at = time::now() \
                 WHERE status = 'processing'",
            )
            .bind(("key", key.to_string()))
            .bind(("result", payload))
            .await
            .map_err(DbError::from)?;
        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<StatusRow> = response.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn mark_failed(&self, key: &str, error: &str) -> PlaneResult<bool> {
        let response = self
            .db
            .query(
                "UPDATE type::record('idempotency', $key) SET \
                 status = 'failed', error = $error, \
                 completed_at = time::now(), updated_at = time::now() \
                 WHERE status = 'processing'",
            )
            .bind(("key", key.to_string()))
            .bind(("error", error.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<StatusRow> = response.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn delete_processing(&self, key: &str) -> PlaneResult<bool> {
        let response = self
            .db
            .query(
                "DELETE type::record('idempotency', $key) \
                 WHERE status = 'processing' RETURN BEFORE",
            )
            .bind(("key", key.to_string()))
            .await
            .map_err(DbError::from)?;
        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<StatusRow> = response.take(0).map_err(DbError::from)?;
        Ok(!rows.is_empty())
    }

    async fn purge_terminal(&self, older_than: Duration) -> PlaneResult<u64> {
        let response = self
            .db
            .query(
                "DELETE idempotency \
                 WHERE status != 'processing' \
                 AND updated_at < time::now() - type::duration($window) \
                 RETURN BEFORE",
            )
            .bind(("window", surreal_duration(older_than)))
            .await
            .map_err(DbError::from)?;
        let mut response = response
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<StatusRow> = response.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn list_stale_processing(&self, older_than: Duration) -> PlaneResult<Vec<IdempotencyRecord>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM idempotency \
                 WHERE status = 'processing' \
                 AND created_at < time::now() - type::duration($window) \
                 ORDER BY created_at ASC",
            )
            .bind(("window", surreal_duration(older_than)))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<IdempotencyRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .map(|row| row.try_into_record().map_err(Into::into))
            .collect()
    }
}
