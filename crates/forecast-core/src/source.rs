//! Source trait for historical metric data.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use crate::{
    error::Result,
    preprocess,
    types::{Series, TenantId},
};

/// Supplies raw history for a tenant's metric.
///
/// Implementations return records in the loose `{"date", "value"}` shape;
/// callers run them through [`preprocess`] before training.
#[async_trait]
pub trait HistoricalDataSource: Send + Sync + Debug {
    /// Returns the name of this source (e.g., "timescale").
    fn name(&self) -> &str;

    /// Fetches up to `days_back` days of history ending today.
    async fn fetch(&self, tenant_id: &TenantId, metric: &str, days_back: u32)
    -> Result<Vec<Value>>;

    /// Fetches history and validates it into a [`Series`].
    async fn fetch_series(
        &self,
        tenant_id: &TenantId,
        metric: &str,
        days_back: u32,
    ) -> Result<Series> {
        let records = self.fetch(tenant_id, metric, days_back).await?;
        preprocess::parse_records(&records)
    }
}
