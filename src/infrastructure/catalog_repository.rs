//! SQLite-backed catalog store
//!
//! One table per site. The schema only ever grows: opening a store creates
//! the table when missing and adds any column an older database lacks, so
//! rows written by earlier versions survive. Numeric columns are read through
//! `CAST` because legacy rows may hold REAL, INTEGER or NULL interchangeably.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::product::{CatalogSummary, ProductRecord, RunMutation, StoredProduct};
use crate::domain::repositories::CatalogStore;

/// `last_seen` storage format (UTC)
pub const LAST_SEEN_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Every column besides the `sku_id` key, with the type used when adding it
/// to an existing table.
const COLUMNS: &[(&str, &str)] = &[
    ("product_id", "TEXT NOT NULL DEFAULT ''"),
    ("name", "TEXT"),
    ("url", "TEXT"),
    ("image_url", "TEXT"),
    ("list_price", "REAL"),
    ("sale_price", "REAL"),
    ("discount_percentage", "INTEGER DEFAULT 0"),
    ("color", "TEXT"),
    ("size", "TEXT"),
    ("is_active", "INTEGER DEFAULT 1"),
    ("last_seen", "TEXT"),
    ("miss_count", "INTEGER DEFAULT 0"),
];

const SELECT_COLUMNS: &str = "sku_id, \
    COALESCE(product_id, '') AS product_id, \
    name, url, image_url, \
    CAST(list_price AS REAL) AS list_price, \
    CAST(sale_price AS REAL) AS sale_price, \
    CAST(COALESCE(discount_percentage, 0) AS INTEGER) AS discount_percentage, \
    color, size, \
    CAST(COALESCE(is_active, 1) AS INTEGER) AS is_active, \
    last_seen, \
    CAST(COALESCE(miss_count, 0) AS INTEGER) AS miss_count";

#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteCatalogStore {
    /// Open the catalog table, creating it or adding missing columns.
    pub async fn open(pool: SqlitePool, table_name: &str) -> StoreResult<Self> {
        validate_table_name(table_name)?;
        let store = Self {
            pool,
            table: table_name.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let column_defs: Vec<String> = COLUMNS.iter().map(|(name, ty)| format!("{name} {ty}")).collect();
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (sku_id TEXT PRIMARY KEY, {})",
            self.table,
            column_defs.join(", ")
        );
        sqlx::query(&create).execute(&self.pool).await?;

        let existing: HashSet<String> = sqlx::query(&format!("PRAGMA table_info({})", self.table))
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>("name"))
            .collect::<Result<_, _>>()?;

        for (name, ty) in COLUMNS {
            if !existing.contains(*name) {
                sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {name} {ty}", self.table))
                    .execute(&self.pool)
                    .await?;
                info!("🔧 Added missing column '{}' to {}", name, self.table);
            }
        }
        Ok(())
    }

    /// The three run steps, all on one transaction's connection.
    async fn mutate(
        &self,
        conn: &mut SqliteConnection,
        batch: &[ProductRecord],
        now: DateTime<Utc>,
        deactivation_threshold: u32,
    ) -> StoreResult<RunMutation> {
        let seen_at = now.format(LAST_SEEN_FORMAT).to_string();
        let upsert = format!(
            "INSERT INTO {} \
             (sku_id, product_id, name, url, image_url, list_price, sale_price, \
              discount_percentage, color, size, is_active, last_seen, miss_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, 0) \
             ON CONFLICT(sku_id) DO UPDATE SET \
                product_id = excluded.product_id, name = excluded.name, url = excluded.url, \
                image_url = excluded.image_url, list_price = excluded.list_price, \
                sale_price = excluded.sale_price, discount_percentage = excluded.discount_percentage, \
                color = excluded.color, size = excluded.size, is_active = 1, \
                last_seen = excluded.last_seen, miss_count = 0",
            self.table
        );

        // 1. every active row ages by one miss
        sqlx::query(&format!(
            "UPDATE {} SET miss_count = COALESCE(miss_count, 0) + 1 WHERE COALESCE(is_active, 1) = 1",
            self.table
        ))
        .execute(&mut *conn)
        .await?;

        // 2. observed rows are refreshed and revived
        let mut upserted = 0_u64;
        for record in batch {
            let result = sqlx::query(&upsert)
                .bind(&record.sku_id)
                .bind(&record.product_id)
                .bind(&record.name)
                .bind(&record.url)
                .bind(&record.image_url)
                .bind(record.list_price)
                .bind(record.sale_price)
                .bind(i64::from(record.discount_percentage))
                .bind(&record.color)
                .bind(&record.size)
                .bind(&seen_at)
                .execute(&mut *conn)
                .await?;
            upserted += result.rows_affected().min(1);
        }

        // 3. sustained absence deactivates
        let deactivated = sqlx::query(&format!(
            "UPDATE {} SET is_active = 0 WHERE COALESCE(miss_count, 0) >= ? AND COALESCE(is_active, 1) = 1",
            self.table
        ))
        .bind(i64::from(deactivation_threshold))
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(RunMutation { upserted, deactivated })
    }
}

fn validate_table_name(name: &str) -> StoreResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}

fn parse_last_seen(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, LAST_SEEN_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.with_timezone(&Utc)))
}

fn row_to_product(row: &SqliteRow) -> StoreResult<StoredProduct> {
    let last_seen: Option<String> = row.try_get("last_seen")?;
    let discount: i64 = row.try_get("discount_percentage")?;
    let is_active: i64 = row.try_get("is_active")?;
    let miss_count: i64 = row.try_get("miss_count")?;

    Ok(StoredProduct {
        sku_id: row.try_get("sku_id")?,
        product_id: row.try_get("product_id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        image_url: row.try_get("image_url")?,
        list_price: row.try_get("list_price")?,
        sale_price: row.try_get("sale_price")?,
        discount_percentage: discount.clamp(0, 100) as u8,
        color: row.try_get("color")?,
        size: row.try_get("size")?,
        is_active: is_active != 0,
        last_seen: last_seen.as_deref().and_then(parse_last_seen),
        miss_count: miss_count.clamp(0, i64::from(u32::MAX)) as u32,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn row_count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn load_snapshot(&self) -> StoreResult<HashMap<String, StoredProduct>> {
        let rows = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM {}", self.table))
            .fetch_all(&self.pool)
            .await?;

        let mut snapshot = HashMap::with_capacity(rows.len());
        for row in &rows {
            let product = row_to_product(row)?;
            snapshot.insert(product.sku_id.clone(), product);
        }
        debug!("📚 Loaded {} stored rows from {}", snapshot.len(), self.table);
        Ok(snapshot)
    }

    async fn get(&self, sku_id: &str) -> StoreResult<Option<StoredProduct>> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM {} WHERE sku_id = ?", self.table))
            .bind(sku_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_product).transpose()
    }

    async fn summary(&self, deactivation_threshold: u32) -> StoreResult<CatalogSummary> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS total, \
             COALESCE(SUM(CASE WHEN COALESCE(is_active, 1) = 1 THEN 1 ELSE 0 END), 0) AS active, \
             COALESCE(SUM(CASE WHEN COALESCE(miss_count, 0) >= ? THEN 1 ELSE 0 END), 0) AS long_absent \
             FROM {}",
            self.table
        ))
        .bind(i64::from(deactivation_threshold))
        .fetch_one(&self.pool)
        .await?;

        Ok(CatalogSummary {
            total: row.try_get::<i64, _>("total")?.max(0) as u64,
            active: row.try_get::<i64, _>("active")?.max(0) as u64,
            long_absent: row.try_get::<i64, _>("long_absent")?.max(0) as u64,
        })
    }

    async fn discounted(&self, min_percentage: u8) -> StoreResult<Vec<StoredProduct>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM {} \
             WHERE CAST(COALESCE(discount_percentage, 0) AS INTEGER) >= ? \
             ORDER BY CAST(COALESCE(discount_percentage, 0) AS INTEGER) DESC, name ASC",
            self.table
        ))
        .bind(i64::from(min_percentage))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_product).collect()
    }

    async fn apply_run(
        &self,
        batch: &[ProductRecord],
        now: DateTime<Utc>,
        deactivation_threshold: u32,
    ) -> StoreResult<RunMutation> {
        let mut tx = self.pool.begin().await?;

        let mutation = match self.mutate(&mut tx, batch, now, deactivation_threshold).await {
            Ok(mutation) => mutation,
            Err(e) => {
                tx.rollback().await?;
                warn!("↩️ Run mutation on {} rolled back: {}", self.table, e);
                return Err(e);
            }
        };
        tx.commit().await?;

        if mutation.deactivated > 0 {
            info!(
                "💤 Marked {} long-absent rows inactive (miss_count >= {})",
                mutation.deactivated, deactivation_threshold
            );
        }
        Ok(mutation)
    }
}
