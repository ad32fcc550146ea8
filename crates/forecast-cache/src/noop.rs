//! No-op cache implementation.

use async_trait::async_trait;
use forecast_core::{CacheKey, ModelCache, Result, SharedForecaster, TrainFuture};
use tracing::trace;

/// A no-op cache that doesn't store anything.
///
/// `get` always returns `None` and `get_or_train` runs the training future
/// every time. Useful for disabling caching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopModelCache;

impl NoopModelCache {
    /// Create a new no-op cache.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelCache for NoopModelCache {
    async fn get(&self, _key: &CacheKey) -> Option<SharedForecaster> {
        trace!("NoopModelCache: get called, returning None");
        None
    }

    async fn get_or_train<'a>(
        &self,
        _key: &CacheKey,
        train: TrainFuture<'a>,
    ) -> Result<SharedForecaster> {
        trace!("NoopModelCache: get_or_train called, training");
        train.await
    }

    async fn invalidate(&self, _key: &CacheKey) -> Result<bool> {
        Ok(false)
    }

    async fn len(&self) -> usize {
        0
    }

    async fn clear(&self) -> Result<()> {
        trace!("NoopModelCache: clear called, doing nothing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::train_counted;
    use futures::FutureExt;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test]
    async fn test_noop_cache_always_trains() {
        let cache = NoopModelCache::new();
        let key = CacheKey::new("acme", "revenue", 7, false);
        let trained = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            cache
                .get_or_train(&key, train_counted(trained.clone(), 1.0).boxed())
                .await
                .unwrap();
        }

        assert_eq!(trained.load(Ordering::SeqCst), 3);
        assert!(cache.get(&key).await.is_none());
        assert!(cache.is_empty().await);
        assert!(!cache.invalidate(&key).await.unwrap());
        assert!(cache.clear().await.is_ok());
    }
}
