//! Cache trait for trained forecasters.
//!
//! This module defines the [`ModelCache`] trait that memoizes one trained
//! forecaster per [`CacheKey`].

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::{
    error::Result,
    forecaster::SharedForecaster,
    types::CacheKey,
};

/// A deferred training run handed to [`ModelCache::get_or_train`].
///
/// The future is only polled on a cache miss.
pub type TrainFuture<'a> = BoxFuture<'a, Result<SharedForecaster>>;

/// Trait for caching trained forecasters.
///
/// Entries never expire on their own; they live until
/// [`invalidate`](Self::invalidate) or [`clear`](Self::clear) is called or
/// the process ends.
#[async_trait]
pub trait ModelCache: Send + Sync {
    /// Returns the trained forecaster for `key`, if one is cached.
    async fn get(&self, key: &CacheKey) -> Option<SharedForecaster>;

    /// Returns the cached forecaster for `key`, running `train` and storing
    /// its output on a miss.
    ///
    /// A failed training run stores nothing.
    async fn get_or_train<'a>(
        &self,
        key: &CacheKey,
        train: TrainFuture<'a>,
    ) -> Result<SharedForecaster>;

    /// Removes the trained entry for `key`.
    ///
    /// A training run still in flight for `key` is not cancelled; callers
    /// that reach the key afterwards receive its result. Returns `Ok(true)`
    /// if a trained entry was removed, `Ok(false)` otherwise.
    async fn invalidate(&self, key: &CacheKey) -> Result<bool>;

    /// Returns the number of trained entries.
    async fn len(&self) -> usize;

    /// Returns true if no trained entries are cached.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Clears all cached forecasters.
    async fn clear(&self) -> Result<()>;
}
