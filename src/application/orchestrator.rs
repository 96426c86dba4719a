//! One monitoring run over one catalog
//!
//! Sequence: fetch every page, stop early on an empty batch, reconcile and
//! notify against the stored snapshot, persist, summarize. [`run_site`] wires
//! the concrete adapter, store and sink for a [`SiteConfig`] and runs the
//! whole sequence under the site's own log scope.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

use crate::application::pager::{FetchOutcome, PagerError, PagerSettings, fetch_all};
use crate::application::reconciliation::{EventCounts, ReconciliationEngine, ReconciliationPolicy};
use crate::domain::errors::{SourceError, StoreError};
use crate::domain::product::CatalogSummary;
use crate::domain::repositories::CatalogStore;
use crate::domain::services::{NotificationSink, SourceAdapter};
use crate::infrastructure::catalog_repository::SqliteCatalogStore;
use crate::infrastructure::config::{ConfigError, LoggingConfig, RunConfig, SiteConfig};
use crate::infrastructure::database_connection::DatabaseConnection;
use crate::infrastructure::http_client::{HttpClient, HttpClientConfig, HttpClientError};
use crate::infrastructure::logging::{LoggingError, RunLogScope};
use crate::infrastructure::notification::{BarkNotifier, LogNotifier};
use crate::infrastructure::sources::build_adapter;

/// Failures that end a run before its report is complete
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] LoggingError),

    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[from] HttpClientError),

    #[error("Source setup failed: {0}")]
    Source(#[from] SourceError),

    #[error("Catalog store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// The store was empty and has been seeded without notifications
    Bootstrapped,
    /// Nothing was fetched; the store was left untouched
    EmptyFetch,
    /// The first page could not be fetched; the store was left untouched
    Aborted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Completed => "completed",
            Self::Bootstrapped => "bootstrapped",
            Self::EmptyFetch => "empty fetch",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub site: String,
    pub fetched: usize,
    pub pages_fetched: u32,
    pub pages_skipped: u32,
    pub duplicates_dropped: usize,
    pub events: EventCounts,
    pub dispatch_failures: u32,
    pub upserted: u64,
    pub deactivated: u64,
    pub catalog: CatalogSummary,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new(site: &str, outcome: RunOutcome) -> Self {
        Self {
            site: site.to_string(),
            fetched: 0,
            pages_fetched: 0,
            pages_skipped: 0,
            duplicates_dropped: 0,
            events: EventCounts::default(),
            dispatch_failures: 0,
            upserted: 0,
            deactivated: 0,
            catalog: CatalogSummary::default(),
            outcome,
        }
    }

    fn with_fetch(mut self, fetch: &FetchOutcome) -> Self {
        self.fetched = fetch.records.len();
        self.pages_fetched = fetch.pages_fetched;
        self.pages_skipped = fetch.pages_skipped;
        self.duplicates_dropped = fetch.duplicates_dropped;
        self
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, RunOutcome::Aborted)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | fetched {} ({} pages, {} skipped) | {} | upserted {} | deactivated {} | active {}/{}",
            self.site,
            self.outcome,
            self.fetched,
            self.pages_fetched,
            self.pages_skipped,
            self.events,
            self.upserted,
            self.deactivated,
            self.catalog.active,
            self.catalog.total,
        )
    }
}

/// Sequences fetch, reconciliation and persistence for one catalog.
pub struct Orchestrator<'a> {
    site_name: &'a str,
    run: &'a RunConfig,
    adapter: &'a dyn SourceAdapter,
    store: &'a dyn CatalogStore,
    sink: &'a dyn NotificationSink,
}

impl<'a> Orchestrator<'a> {
    pub const fn new(
        site_name: &'a str,
        run: &'a RunConfig,
        adapter: &'a dyn SourceAdapter,
        store: &'a dyn CatalogStore,
        sink: &'a dyn NotificationSink,
    ) -> Self {
        Self {
            site_name,
            run,
            adapter,
            store,
            sink,
        }
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport, RunError> {
        info!("🚀 Run started for {}", self.site_name);

        let fetch = match fetch_all(self.adapter, &PagerSettings::from(self.run)).await {
            Ok(fetch) => fetch,
            Err(PagerError::FirstPageFailed { page, source }) => {
                error!("❌ First page {} failed, aborting without touching the catalog: {}", page, source);
                return Ok(RunReport::new(self.site_name, RunOutcome::Aborted));
            }
        };

        if fetch.records.is_empty() {
            warn!("⚠️ No products fetched, catalog left unchanged");
            let mut report = RunReport::new(self.site_name, RunOutcome::EmptyFetch).with_fetch(&fetch);
            report.catalog = self.store.summary(self.run.deactivation_threshold).await?;
            return Ok(report);
        }
        info!("✅ Fetched {} products ({:?})", fetch.records.len(), fetch.stop);

        let engine = ReconciliationEngine::new(
            self.store,
            self.sink,
            ReconciliationPolicy::from(self.run),
            self.site_name,
        );
        let outcome = engine
            .reconcile(&fetch.records, now, self.run.deactivation_threshold)
            .await?;

        let mut report = RunReport::new(
            self.site_name,
            if outcome.bootstrapped {
                RunOutcome::Bootstrapped
            } else {
                RunOutcome::Completed
            },
        )
        .with_fetch(&fetch);
        report.events = outcome.events;
        report.dispatch_failures = outcome.dispatch_failures;
        report.upserted = outcome.mutation.upserted;
        report.deactivated = outcome.mutation.deactivated;
        // The run is committed at this point; a failed read only costs the counts.
        report.catalog = match self.store.summary(self.run.deactivation_threshold).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("⚠️ Catalog summary unavailable after commit: {}", e);
                CatalogSummary::default()
            }
        };

        if report.deactivated > 0 {
            info!("🛑 {} products marked inactive", report.deactivated);
        }
        info!(
            "📊 Catalog: {} total, {} active, {} long absent",
            report.catalog.total, report.catalog.active, report.catalog.long_absent
        );
        Ok(report)
    }
}

/// Run one site end to end with its concrete adapter, store and sink.
///
/// Everything the run logs goes to the site's append log as well as the
/// console; the log file is flushed before this returns.
pub async fn run_site(site: &SiteConfig, logging: &LoggingConfig, dry_run: bool) -> Result<RunReport, RunError> {
    let scope = RunLogScope::open(&site.log_path()?, logging)?;
    let started = Instant::now();

    let result = run_site_inner(site, dry_run).with_subscriber(scope.dispatch()).await;

    let elapsed = started.elapsed();
    tracing::dispatcher::with_default(&scope.dispatch(), || match &result {
        Ok(report) => info!("🏁 {} in {:.1}s", report, elapsed.as_secs_f64()),
        Err(e) => error!("❌ Run for {} failed after {:.1}s: {}", site.site_name, elapsed.as_secs_f64(), e),
    });
    result
}

async fn run_site_inner(site: &SiteConfig, dry_run: bool) -> Result<RunReport, RunError> {
    let client = HttpClient::with_config(&HttpClientConfig::for_site(site))?.with_context_label(&site.site_name);
    let adapter = build_adapter(site, client)?;

    let database = DatabaseConnection::open(&site.db_path()?).await?;
    let store = SqliteCatalogStore::open(database.pool().clone(), &site.table_name()).await?;

    let sink: Box<dyn NotificationSink> = if dry_run {
        info!("📝 Dry run: notifications are only logged");
        Box::new(LogNotifier)
    } else if site.notify.bark_urls.is_empty() {
        warn!("⚠️ No notification endpoints configured, notifications are only logged");
        Box::new(LogNotifier)
    } else {
        let notify_client = HttpClient::with_config(
            &HttpClientConfig::default().with_timeout(Duration::from_secs(site.notify.timeout_secs)),
        )?
        .with_context_label("bark");
        Box::new(BarkNotifier::new(
            notify_client,
            site.notify.bark_urls.clone(),
            site.notify.icon_url.clone(),
        ))
    };

    let result = Orchestrator::new(&site.site_name, &site.run, adapter.as_ref(), &store, sink.as_ref())
        .run(Utc::now())
        .await;
    database.close().await;
    result
}
