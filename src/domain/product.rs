use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized product variant as produced by a source adapter.
///
/// `sku_id` is the identity key of a variant; `product_id` groups the
/// variants of one base product (colors, sizes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub sku_id: String,
    pub product_id: String,
    pub name: String,
    pub url: String,
    pub image_url: Option<String>,
    pub list_price: f64,
    pub sale_price: f64,
    pub discount_percentage: u8,
    pub color: Option<String>,
    pub size: Option<String>,
}

/// Persisted catalog row, i.e. a `ProductRecord` plus its liveness state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredProduct {
    pub sku_id: String,
    pub product_id: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub list_price: Option<f64>,
    /// `None` for legacy rows written before the sale price was tracked.
    pub sale_price: Option<f64>,
    pub discount_percentage: u8,
    pub color: Option<String>,
    pub size: Option<String>,
    pub is_active: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub miss_count: u32,
}

/// Row counts of a catalog after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub total: u64,
    pub active: u64,
    /// Rows whose miss count has reached the deactivation threshold
    pub long_absent: u64,
}

/// Outcome of the per-run store mutation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMutation {
    pub upserted: u64,
    pub deactivated: u64,
}

impl ProductRecord {
    /// Builder-style constructor used by adapters once ids and prices are known.
    pub fn new(
        sku_id: impl Into<String>,
        product_id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        pricing: crate::domain::price::Pricing,
    ) -> Self {
        Self {
            sku_id: sku_id.into(),
            product_id: product_id.into(),
            name: name.into(),
            url: url.into(),
            image_url: None,
            list_price: pricing.list_price,
            sale_price: pricing.sale_price,
            discount_percentage: pricing.discount_percentage,
            color: None,
            size: None,
        }
    }

    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_variant(mut self, color: Option<String>, size: Option<String>) -> Self {
        self.color = color;
        self.size = size;
        self
    }
}

impl StoredProduct {
    /// The row a fresh observation of `record` produces.
    pub fn observed(record: &ProductRecord, now: DateTime<Utc>) -> Self {
        Self {
            sku_id: record.sku_id.clone(),
            product_id: record.product_id.clone(),
            name: Some(record.name.clone()),
            url: Some(record.url.clone()),
            image_url: record.image_url.clone(),
            list_price: Some(record.list_price),
            sale_price: Some(record.sale_price),
            discount_percentage: record.discount_percentage,
            color: record.color.clone(),
            size: record.size.clone(),
            is_active: true,
            last_seen: Some(now),
            miss_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::Pricing;

    #[test]
    fn observed_row_resets_liveness() {
        let record = ProductRecord::new("sku-1", "p-1", "Beta Jacket", "https://x/p", Pricing::from_amounts(Some(500.0), Some(400.0)))
            .with_image(Some("   ".to_string()));
        let now = Utc::now();
        let row = StoredProduct::observed(&record, now);

        assert!(row.is_active);
        assert_eq!(row.miss_count, 0);
        assert_eq!(row.last_seen, Some(now));
        assert_eq!(row.sale_price, Some(400.0));
        assert_eq!(row.discount_percentage, 20);
        assert_eq!(row.image_url, None);
    }
}
