//! Repository interface for the persisted catalog
//!
//! The catalog store exclusively owns catalog rows; every other component
//! reads through it and only [`CatalogStore::apply_run`] mutates it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::StoreResult;
use crate::domain::product::{CatalogSummary, ProductRecord, RunMutation, StoredProduct};

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // Reads
    async fn row_count(&self) -> StoreResult<u64>;
    /// Every row, active and inactive, keyed by `sku_id`
    async fn load_snapshot(&self) -> StoreResult<HashMap<String, StoredProduct>>;
    async fn get(&self, sku_id: &str) -> StoreResult<Option<StoredProduct>>;
    async fn summary(&self, deactivation_threshold: u32) -> StoreResult<CatalogSummary>;
    /// Rows with at least `min_percentage` discount, highest discount first
    async fn discounted(&self, min_percentage: u8) -> StoreResult<Vec<StoredProduct>>;

    /// The per-run mutation, applied atomically:
    /// age every active row by one miss, upsert the batch as observed at `now`,
    /// then deactivate active rows whose miss count reached the threshold.
    async fn apply_run(
        &self,
        batch: &[ProductRecord],
        now: DateTime<Utc>,
        deactivation_threshold: u32,
    ) -> StoreResult<RunMutation>;
}
