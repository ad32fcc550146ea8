//! In-memory historical data source.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::debug;

use forecast_core::{HistoricalDataSource, HistoricalPoint, Result, TenantId, preprocess};

type SourceKey = (TenantId, String);

/// Historical records held in memory, keyed by tenant and metric.
///
/// Records are stored as given, so malformed entries reach the
/// preprocessor unchanged. An unknown tenant or metric yields no records.
#[derive(Debug, Default)]
pub struct InMemorySource {
    records: RwLock<HashMap<SourceKey, Vec<Value>>>,
}

impl InMemorySource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw records for a tenant's metric.
    #[must_use]
    pub fn with_records(
        mut self,
        tenant_id: impl Into<TenantId>,
        metric: impl Into<String>,
        records: Vec<Value>,
    ) -> Self {
        self.records
            .get_mut()
            .insert((tenant_id.into(), metric.into()), records);
        self
    }

    /// Add typed points for a tenant's metric.
    #[must_use]
    pub fn with_points(
        self,
        tenant_id: impl Into<TenantId>,
        metric: impl Into<String>,
        points: &[HistoricalPoint],
    ) -> Self {
        self.with_records(tenant_id, metric, to_records(points))
    }

    /// Replace the records for a tenant's metric.
    pub async fn insert(
        &self,
        tenant_id: impl Into<TenantId>,
        metric: impl Into<String>,
        records: Vec<Value>,
    ) {
        self.records
            .write()
            .await
            .insert((tenant_id.into(), metric.into()), records);
    }
}

/// Renders points in the `{"date": "YYYY-MM-DD", "value": n}` record shape.
pub fn to_records(points: &[HistoricalPoint]) -> Vec<Value> {
    points
        .iter()
        .map(|p| {
            json!({
                "date": p.date.format(preprocess::DATE_FORMAT).to_string(),
                "value": p.value,
            })
        })
        .collect()
}

#[async_trait]
impl HistoricalDataSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    /// Returns at most the trailing `days_back` records, one per day.
    async fn fetch(
        &self,
        tenant_id: &TenantId,
        metric: &str,
        days_back: u32,
    ) -> Result<Vec<Value>> {
        let key = (tenant_id.clone(), metric.to_string());
        let records = self.records.read().await;
        let Some(all) = records.get(&key) else {
            debug!(tenant = %tenant_id, metric, "No records for metric");
            return Ok(Vec::new());
        };

        let skip = all.len().saturating_sub(days_back as usize);
        debug!(
            tenant = %tenant_id,
            metric,
            count = all.len() - skip,
            "Fetched historical records"
        );
        Ok(all[skip..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Days, NaiveDate};
    use forecast_core::ForecastError;

    fn points(n: u64) -> Vec<HistoricalPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| HistoricalPoint::new(start + Days::new(i), i as f64))
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_trailing_window() {
        let source = InMemorySource::new().with_points("acme", "revenue", &points(30));
        let tenant = TenantId::new("acme");

        let records = source.fetch(&tenant, "revenue", 10).await.unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(records[0]["date"], "2024-01-21");
        assert_eq!(records[9]["value"], 29.0);

        let series = source.fetch_series(&tenant, "revenue", 90).await.unwrap();
        assert_eq!(series.len(), 30);
    }

    #[tokio::test]
    async fn test_unknown_metric_fails_validation() {
        let source = InMemorySource::new();
        let tenant = TenantId::new("acme");

        assert!(source.fetch(&tenant, "revenue", 90).await.unwrap().is_empty());
        assert!(matches!(
            source.fetch_series(&tenant, "revenue", 90).await,
            Err(ForecastError::InvalidSeries(_))
        ));
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let source = InMemorySource::new();
        source
            .insert("acme", "orders", to_records(&points(8)))
            .await;

        let other = TenantId::new("globex");
        assert!(source.fetch(&other, "orders", 90).await.unwrap().is_empty());
        assert_eq!(
            source
                .fetch(&TenantId::new("acme"), "orders", 90)
                .await
                .unwrap()
                .len(),
            8
        );
    }
}
