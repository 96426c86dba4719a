//! Discount report over a persisted catalog

use std::fmt;

use crate::application::orchestrator::RunError;
use crate::domain::errors::StoreResult;
use crate::domain::product::StoredProduct;
use crate::domain::repositories::CatalogStore;
use crate::infrastructure::catalog_repository::SqliteCatalogStore;
use crate::infrastructure::config::SiteConfig;
use crate::infrastructure::database_connection::DatabaseConnection;

#[derive(Debug, Clone, PartialEq)]
pub struct DiscountReport {
    pub site: String,
    pub min_discount: u8,
    /// Highest discount first
    pub rows: Vec<StoredProduct>,
}

impl DiscountReport {
    pub async fn load(store: &dyn CatalogStore, site: &str, min_discount: u8) -> StoreResult<Self> {
        Ok(Self {
            site: site.to_string(),
            min_discount,
            rows: store.discounted(min_discount).await?,
        })
    }
}

fn amount(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("${v:.2}"))
}

impl fmt::Display for DiscountReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} products at {}% off or more",
            self.site,
            self.rows.len(),
            self.min_discount
        )?;
        for row in &self.rows {
            writeln!(
                f,
                "{:>3}% | {:>10} | {:>10} | {}{} | {}",
                row.discount_percentage,
                amount(row.list_price),
                amount(row.sale_price),
                row.name.as_deref().unwrap_or(&row.sku_id),
                if row.is_active { "" } else { " (inactive)" },
                row.url.as_deref().unwrap_or("-"),
            )?;
        }
        Ok(())
    }
}

/// Open a site's catalog and build its discount report.
pub async fn report_site(site: &SiteConfig, min_discount: u8) -> Result<DiscountReport, RunError> {
    let database = DatabaseConnection::open(&site.db_path()?).await?;
    let store = SqliteCatalogStore::open(database.pool().clone(), &site.table_name()).await?;
    let report = DiscountReport::load(&store, &site.site_name, min_discount).await;
    database.close().await;
    Ok(report?)
}
