//! End-to-end runs against a real SQLite catalog with a scripted source and a
//! recording notification sink.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempfile::{TempDir, tempdir};

use catalog_watch::application::{Orchestrator, RunOutcome, RunReport};
use catalog_watch::domain::errors::{NotifyError, SourceError, SourceResult, StoreError, StoreResult};
use catalog_watch::domain::events::NotificationPayload;
use catalog_watch::domain::price::Pricing;
use catalog_watch::domain::product::{CatalogSummary, ProductRecord, RunMutation, StoredProduct};
use catalog_watch::domain::repositories::CatalogStore;
use catalog_watch::domain::services::{NotificationSink, SourceAdapter, SourcePage};
use catalog_watch::infrastructure::catalog_repository::SqliteCatalogStore;
use catalog_watch::infrastructure::config::RunConfig;
use catalog_watch::infrastructure::database_connection::DatabaseConnection;

/// Serves one batch as a single page, or fails every fetch.
#[derive(Default)]
struct ScriptedSource {
    batch: Mutex<Vec<ProductRecord>>,
    failing: Mutex<bool>,
}

impl ScriptedSource {
    fn serve(&self, batch: Vec<ProductRecord>) {
        *self.batch.lock().unwrap() = batch;
        *self.failing.lock().unwrap() = false;
    }

    fn fail(&self) {
        *self.failing.lock().unwrap() = true;
    }
}

#[async_trait]
impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_page(&self, _page: u32) -> SourceResult<SourcePage> {
        if *self.failing.lock().unwrap() {
            return Err(SourceError::Timeout {
                url: "https://shop.test/listing".into(),
            });
        }
        Ok(SourcePage::new(self.batch.lock().unwrap().clone(), false))
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<NotificationPayload>>,
    unreachable: bool,
}

impl RecordingSink {
    fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|p| p.title.clone()).collect()
    }

    fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(payload.clone());
        if self.unreachable {
            return Err(NotifyError::AllEndpointsFailed {
                attempted: 1,
                last_error: "connection refused".into(),
            });
        }
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    _db: DatabaseConnection,
    store: SqliteCatalogStore,
    source: ScriptedSource,
    sink: RecordingSink,
    config: RunConfig,
}

impl Harness {
    async fn new() -> Self {
        Self::with_sink(RecordingSink::default()).await
    }

    async fn with_sink(sink: RecordingSink) -> Self {
        let dir = tempdir().unwrap();
        let db = DatabaseConnection::open(&dir.path().join("shop.db")).await.unwrap();
        let store = SqliteCatalogStore::open(db.pool().clone(), "shop_products").await.unwrap();
        let run = RunConfig {
            retry_backoff_ms: 0,
            page_delay_ms: 0,
            ..RunConfig::default()
        };
        Self {
            _dir: dir,
            _db: db,
            store,
            source: ScriptedSource::default(),
            sink,
            config: run,
        }
    }

    async fn run(&self, batch: Vec<ProductRecord>) -> RunReport {
        self.source.serve(batch);
        self.run_as_is().await
    }

    async fn run_as_is(&self) -> RunReport {
        Orchestrator::new("Shop", &self.config, &self.source, &self.store, &self.sink)
            .run(Utc::now())
            .await
            .unwrap()
    }
}

fn item(sku: &str, list: f64, sale: f64) -> ProductRecord {
    ProductRecord::new(
        sku,
        sku,
        format!("Item {sku}"),
        format!("https://shop.test/{sku}"),
        Pricing::from_amounts(Some(list), Some(sale)),
    )
}

fn catalog(skus: &[&str]) -> Vec<ProductRecord> {
    skus.iter().map(|sku| item(sku, 100.0, 100.0)).collect()
}

#[tokio::test]
async fn first_run_seeds_without_notifications() {
    let h = Harness::new().await;

    let report = h.run(catalog(&["a", "b", "c", "d", "e"])).await;

    assert_eq!(report.outcome, RunOutcome::Bootstrapped);
    assert_eq!(report.upserted, 5);
    assert_eq!(report.events.total(), 0);
    assert!(h.sink.titles().is_empty());
    assert_eq!(h.store.row_count().await.unwrap(), 5);
}

#[tokio::test]
async fn identical_runs_are_idempotent() {
    let h = Harness::new().await;
    h.run(catalog(&["a", "b"])).await;
    h.run(catalog(&["a", "b"])).await;
    let report = h.run(catalog(&["a", "b"])).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.events.total(), 0);
    for sku in ["a", "b"] {
        let row = h.store.get(sku).await.unwrap().unwrap();
        assert_eq!(row.miss_count, 0);
        assert!(row.is_active);
    }
}

#[tokio::test]
async fn absent_record_decays_and_revives() {
    let h = Harness::new().await;
    h.run(catalog(&["stay", "gone"])).await;

    for _ in 0..79 {
        h.run(catalog(&["stay"])).await;
    }
    let gone = h.store.get("gone").await.unwrap().unwrap();
    assert_eq!(gone.miss_count, 79);
    assert!(gone.is_active);

    let report = h.run(catalog(&["stay"])).await;
    assert_eq!(report.deactivated, 1);
    let gone = h.store.get("gone").await.unwrap().unwrap();
    assert_eq!(gone.miss_count, 80);
    assert!(!gone.is_active);

    // Inactive rows no longer accumulate misses.
    h.run(catalog(&["stay"])).await;
    assert_eq!(h.store.get("gone").await.unwrap().unwrap().miss_count, 80);

    h.sink.clear();
    let report = h.run(catalog(&["stay", "gone"])).await;
    let gone = h.store.get("gone").await.unwrap().unwrap();
    assert!(gone.is_active);
    assert_eq!(gone.miss_count, 0);
    assert_eq!(report.events.restock, 1);
    assert_eq!(h.sink.titles(), vec!["[Shop] Back in stock"]);
    assert_eq!(report.catalog.active, 2);
}

#[tokio::test]
async fn restock_needs_minimum_misses() {
    let mut h = Harness::new().await;

    // Rows stop accumulating misses once inactive, so each row is retired
    // under a different threshold.
    h.config.deactivation_threshold = 2;
    h.run(catalog(&["keep", "short", "long"])).await;
    h.run(catalog(&["keep", "long"])).await;
    h.run(catalog(&["keep", "long"])).await;

    h.config.deactivation_threshold = 3;
    for _ in 0..3 {
        h.run(catalog(&["keep"])).await;
    }

    let short = h.store.get("short").await.unwrap().unwrap();
    let long = h.store.get("long").await.unwrap().unwrap();
    assert!(!short.is_active);
    assert_eq!(short.miss_count, 2);
    assert!(!long.is_active);
    assert_eq!(long.miss_count, 3);

    h.sink.clear();
    let report = h.run(catalog(&["keep", "short", "long"])).await;
    assert_eq!(report.events.restock, 1);
    assert_eq!(h.sink.sent.lock().unwrap()[0].url, "https://shop.test/long");
    assert!(h.store.get("short").await.unwrap().unwrap().is_active);
}

#[tokio::test]
async fn new_discounted_record_raises_new_and_high_discount() {
    let h = Harness::new().await;
    h.run(catalog(&["a"])).await;

    let report = h.run(vec![item("a", 100.0, 100.0), item("deal", 200.0, 50.0)]).await;

    assert_eq!(report.events.new, 1);
    assert_eq!(report.events.high_discount, 1);
    assert_eq!(h.sink.titles(), vec!["[Shop] New arrival", "[Shop] High discount!"]);
    let sent = h.sink.sent.lock().unwrap();
    assert_eq!(sent[1].body, "75% OFF - Item deal\nPrice: $50.00");
    assert_eq!(sent[1].group, "Shop");
}

#[tokio::test]
async fn price_drop_is_reported_once() {
    let h = Harness::new().await;
    h.run(vec![item("a", 500.0, 450.0)]).await;

    let report = h.run(vec![item("a", 500.0, 400.0)]).await;
    assert_eq!(report.events.price_drop, 1);
    assert_eq!(h.sink.sent.lock().unwrap()[0].body, "Item a\nNow $400.00 (was $450.00)");

    let report = h.run(vec![item("a", 500.0, 400.0)]).await;
    assert_eq!(report.events.total(), 0);
}

#[tokio::test]
async fn empty_fetch_leaves_catalog_untouched() {
    let h = Harness::new().await;
    h.run(catalog(&["a", "b"])).await;
    let before = h.store.load_snapshot().await.unwrap();

    let report = h.run(Vec::new()).await;

    assert_eq!(report.outcome, RunOutcome::EmptyFetch);
    assert_eq!(h.store.load_snapshot().await.unwrap(), before);
    assert_eq!(report.catalog.total, 2);
}

#[tokio::test]
async fn first_page_failure_aborts_without_mutation() {
    let h = Harness::new().await;
    h.run(catalog(&["a", "b"])).await;
    let before = h.store.load_snapshot().await.unwrap();

    h.source.fail();
    let report = h.run_as_is().await;

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert!(report.is_failure());
    assert_eq!(h.store.load_snapshot().await.unwrap(), before);
}

#[tokio::test]
async fn unreachable_sink_does_not_block_persistence() {
    let h = Harness::with_sink(RecordingSink {
        unreachable: true,
        ..RecordingSink::default()
    })
    .await;
    h.run(catalog(&["a"])).await;

    let report = h.run(vec![item("a", 100.0, 100.0), item("b", 100.0, 100.0), item("c", 200.0, 20.0)]).await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.dispatch_failures, 3);
    assert_eq!(h.sink.titles().len(), 3);
    assert_eq!(h.store.row_count().await.unwrap(), 3);
}

#[tokio::test]
async fn duplicate_skus_collapse_to_one_row() {
    let h = Harness::new().await;
    h.run(catalog(&["a"])).await;

    let report = h.run(vec![item("a", 100.0, 100.0), item("b", 100.0, 90.0), item("b", 100.0, 80.0)]).await;

    assert_eq!(report.duplicates_dropped, 1);
    assert_eq!(report.events.new, 1);
    let snapshot = h.store.load_snapshot().await.unwrap();
    let ids: HashSet<_> = snapshot.keys().collect();
    assert_eq!(ids.len(), snapshot.len());
    assert_eq!(h.store.get("b").await.unwrap().unwrap().sale_price, Some(90.0));
}

#[tokio::test]
async fn last_seen_tracks_the_run_time() {
    let h = Harness::new().await;
    let earlier = Utc::now() - Duration::days(2);
    h.source.serve(catalog(&["a"]));
    Orchestrator::new("Shop", &h.config, &h.source, &h.store, &h.sink)
        .run(earlier)
        .await
        .unwrap();

    let seen = h.store.get("a").await.unwrap().unwrap().last_seen.unwrap();
    assert!((seen - earlier).num_seconds().abs() <= 1);
}

/// Delegates to the real store but cannot produce a summary
struct SummaryUnavailable<'a>(&'a SqliteCatalogStore);

#[async_trait]
impl CatalogStore for SummaryUnavailable<'_> {
    async fn row_count(&self) -> StoreResult<u64> {
        self.0.row_count().await
    }

    async fn load_snapshot(&self) -> StoreResult<HashMap<String, StoredProduct>> {
        self.0.load_snapshot().await
    }

    async fn get(&self, sku_id: &str) -> StoreResult<Option<StoredProduct>> {
        self.0.get(sku_id).await
    }

    async fn summary(&self, _deactivation_threshold: u32) -> StoreResult<CatalogSummary> {
        Err(StoreError::InvalidTableName("summary unavailable".into()))
    }

    async fn discounted(&self, min_percentage: u8) -> StoreResult<Vec<StoredProduct>> {
        self.0.discounted(min_percentage).await
    }

    async fn apply_run(
        &self,
        batch: &[ProductRecord],
        now: DateTime<Utc>,
        deactivation_threshold: u32,
    ) -> StoreResult<RunMutation> {
        self.0.apply_run(batch, now, deactivation_threshold).await
    }
}

#[tokio::test]
async fn committed_run_survives_a_failed_summary() {
    let h = Harness::new().await;
    h.run(catalog(&["a"])).await;

    let store = SummaryUnavailable(&h.store);
    h.source.serve(catalog(&["a", "b"]));
    let report = Orchestrator::new("Shop", &h.config, &h.source, &store, &h.sink)
        .run(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.upserted, 2);
    assert_eq!(report.events.new, 1);
    assert_eq!(report.catalog, CatalogSummary::default());
    assert_eq!(h.store.row_count().await.unwrap(), 2);
}
