//! In-memory cache implementation.

use async_trait::async_trait;
use forecast_core::{CacheKey, ModelCache, Result, SharedForecaster, TrainFuture};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, instrument};

/// Slot for one key. Empty until its first successful training run.
type Slot = Arc<OnceCell<SharedForecaster>>;

/// Process-lifetime cache of trained forecasters.
///
/// Each key owns a [`OnceCell`] slot. Concurrent misses on the same key
/// await the same slot, so at most one training run per key is in flight.
/// Misses on different keys train in parallel. A failed run leaves the slot
/// empty; the next waiter, or the next request, trains on the same slot.
#[derive(Debug, Default)]
pub struct InMemoryModelCache {
    slots: RwLock<HashMap<CacheKey, Slot>>,
}

impl InMemoryModelCache {
    /// Create a new empty in-memory cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, key: &CacheKey) -> Slot {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key.clone()).or_default())
    }
}

#[async_trait]
impl ModelCache for InMemoryModelCache {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Option<SharedForecaster> {
        let slots = self.slots.read().await;
        let model = slots.get(key).and_then(|slot| slot.get()).map(Arc::clone);
        if model.is_some() {
            debug!("Cache hit for trained model");
        } else {
            debug!("Cache miss for trained model");
        }
        model
    }

    #[instrument(skip(self, train), fields(key = %key))]
    async fn get_or_train<'a>(
        &self,
        key: &CacheKey,
        train: TrainFuture<'a>,
    ) -> Result<SharedForecaster> {
        let slot = self.slot(key).await;
        if let Some(model) = slot.get() {
            debug!("Cache hit for trained model");
            return Ok(Arc::clone(model));
        }

        debug!("Cache miss, training model");
        // The slot stays in the map on failure: a waiter may already be
        // retrying on it, and later callers must queue behind that retry.
        let result = slot.get_or_try_init(|| train).await.map(Arc::clone);
        if result.is_err() {
            debug!("Training failed, nothing cached");
        }
        result
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn invalidate(&self, key: &CacheKey) -> Result<bool> {
        // A slot still training is left in place so that its waiters and
        // any new caller share the run already in flight.
        let mut slots = self.slots.write().await;
        let removed = slots.get(key).is_some_and(|slot| slot.initialized());
        if removed {
            slots.remove(key);
        }
        debug!(removed, "Invalidated cache entry");
        Ok(removed)
    }

    async fn len(&self) -> usize {
        self.slots
            .read()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        self.slots.write().await.clear();
        debug!("Cleared all cache entries");
        Ok(())
    }
}
