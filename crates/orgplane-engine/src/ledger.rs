//! Idempotency ledger: at-most-once execution of keyed operations.
//!
//! `begin` is the only entry point that can start work. Exactly one caller
//! per key sees [`BeginOutcome::Started`]; everyone else gets the stored
//! outcome or is told the work is still in flight.

use std::sync::Arc;
use std::time::Duration;

use orgplane_core::error::{PlaneError, PlaneResult};
use orgplane_core::models::idempotency::{IdempotencyKey, IdempotencyRecord, IdempotencyStatus};
use orgplane_core::repository::IdempotencyRepository;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A released key can disappear between our failed insert and the read
/// that follows; retry that window a few times.
const BEGIN_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    Started,
    AlreadyCompleted(Value),
    AlreadyProcessing,
    PreviouslyFailed(String),
}

/// Result of one janitor pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub purged: u64,
    pub stale: usize,
}

fn chrono_duration(d: Duration) -> PlaneResult<chrono::Duration> {
    chrono::Duration::from_std(d)
        .map_err(|e| PlaneError::validation(format!("duration out of range: {e}")))
}

pub struct IdempotencyLedger<R: IdempotencyRepository> {
    repo: R,
}

impl<R: IdempotencyRepository> IdempotencyLedger<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub async fn begin(&self, key: &IdempotencyKey) -> PlaneResult<BeginOutcome> {
        for _ in 0..BEGIN_ATTEMPTS {
            if self
                .repo
                .insert_processing(key.as_str(), key.operation())
                .await?
            {
                debug!(key = %key, "Ledger entry started");
                return Ok(BeginOutcome::Started);
            }

            let Some(record) = self.repo.get(key.as_str()).await? else {
                continue;
            };
            let outcome = match record.status {
                IdempotencyStatus::Processing => BeginOutcome::AlreadyProcessing,
                IdempotencyStatus::Completed => {
                    BeginOutcome::AlreadyCompleted(record.result.unwrap_or(Value::Null))
                }
                IdempotencyStatus::Failed => {
                    BeginOutcome::PreviouslyFailed(record.error.unwrap_or_default())
                }
            };
            debug!(key = %key, status = record.status.as_str(), "Ledger entry already present");
            return Ok(outcome);
        }

        Err(PlaneError::Database(format!(
            "ledger entry {key} changed under concurrent release"
        )))
    }

    pub async fn complete(&self, key: &IdempotencyKey, result: &Value) -> PlaneResult<()> {
        if !self.repo.mark_completed(key.as_str(), result).await? {
            warn!(key = %key, "Completed a ledger entry that was not processing");
        }
        Ok(())
    }

    pub async fn fail(&self, key: &IdempotencyKey, error: &str) -> PlaneResult<()> {
        if !self.repo.mark_failed(key.as_str(), error).await? {
            warn!(key = %key, "Failed a ledger entry that was not processing");
        }
        Ok(())
    }

    /// Drop a `processing` entry so a retry can start over. Only valid when
    /// the operation has not produced side effects.
    pub async fn release(&self, key: &IdempotencyKey) -> PlaneResult<()> {
        if self.repo.delete_processing(key.as_str()).await? {
            debug!(key = %key, "Ledger entry released");
        }
        Ok(())
    }

    pub async fn lookup(&self, key: &IdempotencyKey) -> PlaneResult<Option<IdempotencyRecord>> {
        self.repo.get(key.as_str()).await
    }

    /// Delete terminal entries older than `retention`.
    pub async fn purge(&self, retention: Duration) -> PlaneResult<u64> {
        self.repo.purge_terminal(chrono_duration(retention)?).await
    }

    /// Purge expired entries and report `processing` entries older than
    /// `stale_after`. Stuck entries are left alone.
    pub async fn sweep(&self, retention: Duration, stale_after: Duration) -> PlaneResult<SweepReport> {
        let purged = self.purge(retention).await?;

        let stale = self
            .repo
            .list_stale_processing(chrono_duration(stale_after)?)
            .await?;
        for record in &stale {
            warn!(
                key = %record.key,
                operation = %record.operation,
                created_at = %record.created_at,
                "Ledger entry stuck in processing"
            );
        }

        Ok(SweepReport {
            purged,
            stale: stale.len(),
        })
    }
}

/// Run [`IdempotencyLedger::sweep`] every `interval` until the runtime shuts
/// down.
pub fn spawn_janitor<R>(
    ledger: Arc<IdempotencyLedger<R>>,
    interval: Duration,
    retention: Duration,
    stale_after: Duration,
) -> JoinHandle<()>
where
    R: IdempotencyRepository + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match ledger.sweep(retention, stale_after).await {
                Ok(report) => info!(
                    purged = report.purged,
                    stale = report.stale,
                    "Ledger janitor pass complete"
                ),
                Err(e) => error!(error = %e, "Ledger janitor pass failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;

    /// In-memory store with the same first-writer-wins semantics.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<HashMap<String, IdempotencyRecord>>,
        unavailable: bool,
    }

    impl MemoryStore {
        fn check(&self) -> PlaneResult<()> {
            if self.unavailable {
                Err(PlaneError::Database("connection refused".into()))
            } else {
                Ok(())
            }
        }

        fn transition(
            &self,
            key: &str,
            status: IdempotencyStatus,
            result: Option<Value>,
            error: Option<String>,
        ) -> bool {
            let mut rows = self.rows.lock().unwrap();
            match rows.get_mut(key) {
                Some(row) if row.status == IdempotencyStatus::Processing => {
                    row.status = status;
                    row.result = result;
                    row.error = error;
                    row.updated_at = Utc::now();
                    true
                }
                _ => false,
            }
        }
    }

    impl IdempotencyRepository for MemoryStore {
        async fn insert_processing(&self, key: &str, operation: &str) -> PlaneResult<bool> {
            self.check()?;
            let mut rows = self.rows.lock().unwrap();
            if rows.contains_key(key) {
                return Ok(false);
            }
            let now = Utc::now();
            rows.insert(
                key.to_string(),
                IdempotencyRecord {
                    key: key.to_string(),
                    operation: operation.to_string(),
                    status: IdempotencyStatus::Processing,
                    result: None,
                    error: None,
                    created_at: now,
                    updated_at: now,
                    completed_at: None,
                },
            );
            Ok(true)
        }

        async fn get(&self, key: &str) -> PlaneResult<Option<IdempotencyRecord>> {
            self.check()?;
            Ok(self.rows.lock().unwrap().get(key).cloned())
        }

        async fn mark_completed(&self, key: &str, result: &Value) -> PlaneResult<bool> {
            Ok(self.transition(key, IdempotencyStatus::Completed, Some(result.clone()), None))
        }

        async fn mark_failed(&self, key: &str, error: &str) -> PlaneResult<bool> {
            Ok(self.transition(key, IdempotencyStatus::Failed, None, Some(error.into())))
        }

        async fn delete_processing(&self, key: &str) -> PlaneResult<bool> {
            let mut rows = self.rows.lock().unwrap();
            match rows.get(key) {
                Some(row) if row.status == IdempotencyStatus::Processing => {
                    rows.remove(key);
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn purge_terminal(&self, older_than: chrono::Duration) -> PlaneResult<u64> {
            let cutoff = Utc::now() - older_than;
            let mut rows = self.rows.lock().unwrap();
            let before = rows.len();
            rows.retain(|_, r| !r.status.is_terminal() || r.updated_at >= cutoff);
            Ok((before - rows.len()) as u64)
        }

        async fn list_stale_processing(
            &self,
            older_than: chrono::Duration,
        ) -> PlaneResult<Vec<IdempotencyRecord>> {
            let cutoff = Utc::now() - older_than;
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.status == IdempotencyStatus::Processing && r.created_at < cutoff)
                .cloned()
                .collect())
        }
    }

    fn key() -> IdempotencyKey {
        IdempotencyKey::registration("k1")
    }

    #[tokio::test]
    async fn only_first_begin_starts() {
        let ledger = IdempotencyLedger::new(MemoryStore::default());

        assert_eq!(ledger.begin(&key()).await.unwrap(), BeginOutcome::Started);
        assert_eq!(
            ledger.begin(&key()).await.unwrap(),
            BeginOutcome::AlreadyProcessing
        );
    }

    #[tokio::test]
    async fn completed_result_is_replayed() {
        let ledger = IdempotencyLedger::new(MemoryStore::default());
        ledger.begin(&key()).await.unwrap();
        ledger
            .complete(&key(), &serde_json::json!({ "tenant_id": "t1" }))
            .await
            .unwrap();

        assert_eq!(
            ledger.begin(&key()).await.unwrap(),
            BeginOutcome::AlreadyCompleted(serde_json::json!({ "tenant_id": "t1" }))
        );
    }

    #[tokio::test]
    async fn failure_is_replayed_not_retried() {
        let ledger = IdempotencyLedger::new(MemoryStore::default());
        ledger.begin(&key()).await.unwrap();
        ledger.fail(&key(), "slug exhausted").await.unwrap();

        assert_eq!(
            ledger.begin(&key()).await.unwrap(),
            BeginOutcome::PreviouslyFailed("slug exhausted".into())
        );
    }

    #[tokio::test]
    async fn released_key_can_start_again() {
        let ledger = IdempotencyLedger::new(MemoryStore::default());
        ledger.begin(&key()).await.unwrap();
        ledger.release(&key()).await.unwrap();

        assert_eq!(ledger.begin(&key()).await.unwrap(), BeginOutcome::Started);
    }

    #[tokio::test]
    async fn unavailable_store_is_not_a_duplicate() {
        let ledger = IdempotencyLedger::new(MemoryStore {
            unavailable: true,
            ..MemoryStore::default()
        });

        let err = ledger.begin(&key()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn sweep_purges_terminal_and_counts_stuck() {
        let ledger = IdempotencyLedger::new(MemoryStore::default());
        let done = IdempotencyKey::webhook("user.created", "evt_1");
        ledger.begin(&done).await.unwrap();
        ledger.complete(&done, &Value::Null).await.unwrap();
        ledger.begin(&key()).await.unwrap();

        let report = ledger.sweep(Duration::ZERO, Duration::ZERO).await.unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(report.stale, 1);
        assert!(ledger.lookup(&done).await.unwrap().is_none());
        assert!(ledger.lookup(&key()).await.unwrap().is_some());
    }
}
