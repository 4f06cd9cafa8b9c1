//! Connection router: one live handle per tenant store, created lazily.

use std::collections::HashMap;
use std::sync::Arc;

use orgplane_core::downstream::ConnectionFactory;
use orgplane_core::error::PlaneResult;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

/// Cache of tenant store handles keyed by connection descriptor.
///
/// Concurrent `pool` calls for the same descriptor share a single
/// `OnceCell`, so the factory opens each store at most once. A failed open
/// leaves the cell empty and the next caller tries again.
pub struct ConnectionRouter<F: ConnectionFactory> {
    factory: Arc<F>,
    cells: RwLock<HashMap<String, Arc<OnceCell<F::Handle>>>>,
}

impl<F: ConnectionFactory> ConnectionRouter<F> {
    pub fn new(factory: Arc<F>) -> Self {
        Self {
            factory,
            cells: RwLock::new(HashMap::new()),
        }
    }

    pub async fn pool(&self, descriptor: &str) -> PlaneResult<F::Handle> {
        let existing = self.cells.read().await.get(descriptor).cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => self
                .cells
                .write()
                .await
                .entry(descriptor.to_string())
                .or_default()
                .clone(),
        };

        let handle = cell
            .get_or_try_init(|| async {
                debug!(descriptor, "Opening tenant store connection");
                self.factory.open(descriptor).await
            })
            .await?;
        Ok(handle.clone())
    }

    /// Forget the handle for `descriptor`. Returns whether one was cached.
    pub async fn evict(&self, descriptor: &str) -> bool {
        self.cells.write().await.remove(descriptor).is_some()
    }

    pub async fn len(&self) -> usize {
        self.cells.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
