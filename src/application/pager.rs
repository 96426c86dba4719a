//! Pagination and retry over a [`SourceAdapter`]
//!
//! Pages are fetched one at a time, starting at the adapter's first page,
//! until one of: an empty page, the page cap, the provider-declared total
//! reached, or the adapter reporting no further pages.
//!
//! A transient failure is retried with a fixed backoff. A page that still
//! fails (or returns a malformed payload) is skipped, except the first page,
//! whose failure aborts the fetch.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::domain::errors::{SourceError, SourceResult};
use crate::domain::identity::dedupe_by_sku;
use crate::domain::product::ProductRecord;
use crate::domain::services::{SourceAdapter, SourcePage};
use crate::infrastructure::config::RunConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerSettings {
    pub max_pages: u32,
    /// Attempts per page, first try included
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
    pub page_delay: Duration,
}

impl From<&RunConfig> for PagerSettings {
    fn from(run: &RunConfig) -> Self {
        Self {
            max_pages: run.max_pages,
            retry_attempts: run.retry_attempts,
            retry_backoff: run.retry_backoff(),
            page_delay: run.page_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EmptyPage,
    PageCap,
    TotalReached,
    LastPage,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Deduplicated records in fetch order
    pub records: Vec<ProductRecord>,
    pub pages_fetched: u32,
    pub pages_skipped: u32,
    pub duplicates_dropped: usize,
    pub stop: StopReason,
}

#[derive(Error, Debug, Clone)]
pub enum PagerError {
    #[error("First page {page} failed: {source}")]
    FirstPageFailed {
        page: u32,
        #[source]
        source: SourceError,
    },
}

async fn fetch_with_retry(adapter: &dyn SourceAdapter, page: u32, settings: &PagerSettings) -> SourceResult<SourcePage> {
    let attempts = settings.retry_attempts.max(1);
    let mut attempt = 1;
    loop {
        match adapter.fetch_page(page).await {
            Ok(result) => {
                if attempt > 1 {
                    info!("✅ Page {} fetched on attempt {}", page, attempt);
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < attempts => {
                warn!(
                    "🔁 Page {} attempt {}/{} failed, retrying in {:?}: {}",
                    page, attempt, attempts, settings.retry_backoff, e
                );
                sleep(settings.retry_backoff).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch every page the source offers within the configured bounds.
pub async fn fetch_all(adapter: &dyn SourceAdapter, settings: &PagerSettings) -> Result<FetchOutcome, PagerError> {
    let first = adapter.first_page();
    let mut page = first;
    let mut pages_visited = 0_u32;
    let mut pages_fetched = 0_u32;
    let mut pages_skipped = 0_u32;
    let mut raw_count = 0_usize;
    let mut declared_total: Option<usize> = None;
    let mut records = Vec::new();

    let stop = loop {
        if pages_visited >= settings.max_pages {
            break StopReason::PageCap;
        }
        pages_visited += 1;
        info!("📦 Fetching page {} ({}/{}) via {}", page, pages_visited, settings.max_pages, adapter.name());

        match fetch_with_retry(adapter, page, settings).await {
            Ok(result) => {
                if result.is_exhausted() {
                    info!("ℹ️ Page {} is empty, stopping", page);
                    break StopReason::EmptyPage;
                }
                pages_fetched += 1;
                raw_count += result.items.len();
                declared_total = result.total_items.or(declared_total);
                debug!("Page {} yielded {} of {} items", page, result.items.len(), result.scanned);
                records.extend(result.items);

                if declared_total.is_some_and(|total| total > 0 && raw_count >= total) {
                    info!("ℹ️ Reached declared total of {} items", raw_count);
                    break StopReason::TotalReached;
                }
                if !result.has_more {
                    break StopReason::LastPage;
                }
                if pages_visited < settings.max_pages {
                    sleep(settings.page_delay).await;
                }
            }
            Err(source) if pages_visited == 1 => {
                return Err(PagerError::FirstPageFailed { page, source });
            }
            Err(e) => {
                warn!("⚠️ Skipping page {}: {}", page, e);
                pages_skipped += 1;
            }
        }
        page += 1;
    };

    let (records, duplicates_dropped) = dedupe_by_sku(records);
    if duplicates_dropped > 0 {
        info!("🧹 Dropped {} duplicate records", duplicates_dropped);
    }

    Ok(FetchOutcome {
        records,
        pages_fetched,
        pages_skipped,
        duplicates_dropped,
        stop,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::Pricing;
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays scripted responses per page; unscripted pages are empty.
    #[derive(Default)]
    struct ScriptedAdapter {
        first: u32,
        script: Mutex<HashMap<u32, VecDeque<SourceResult<SourcePage>>>>,
        calls: Mutex<Vec<u32>>,
    }

    impl ScriptedAdapter {
        fn starting_at(first: u32) -> Self {
            Self {
                first,
                ..Self::default()
            }
        }

        fn on(self, page: u32, response: SourceResult<SourcePage>) -> Self {
            self.script.lock().unwrap().entry(page).or_default().push_back(response);
            self
        }

        fn calls(&self) -> Vec<u32> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn name(&self) -> &str {
            "scripted"
        }

        fn first_page(&self) -> u32 {
            self.first
        }

        async fn fetch_page(&self, page: u32) -> SourceResult<SourcePage> {
            self.calls.lock().unwrap().push(page);
            self.script
                .lock()
                .unwrap()
                .get_mut(&page)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok(SourcePage::default()))
        }
    }

    fn items(ids: &[&str]) -> Vec<ProductRecord> {
        ids.iter()
            .map(|id| ProductRecord::new(*id, *id, *id, "https://shop.test", Pricing::from_amounts(Some(10.0), None)))
            .collect()
    }

    fn page(ids: &[&str]) -> SourceResult<SourcePage> {
        Ok(SourcePage::new(items(ids), true))
    }

    fn timeout() -> SourceResult<SourcePage> {
        Err(SourceError::Timeout { url: "https://shop.test".into() })
    }

    fn settings(max_pages: u32) -> PagerSettings {
        PagerSettings {
            max_pages,
            retry_attempts: 3,
            retry_backoff: Duration::ZERO,
            page_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn empty_page_stops() {
        let adapter = ScriptedAdapter::starting_at(1).on(1, page(&["a", "b"]));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.stop, StopReason::EmptyPage);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(adapter.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn page_cap_stops() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, page(&["a"]))
            .on(2, page(&["b"]))
            .on(3, page(&["c"]));
        let outcome = fetch_all(&adapter, &settings(2)).await.unwrap();

        assert_eq!(outcome.stop, StopReason::PageCap);
        assert_eq!(adapter.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn declared_total_stops() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, Ok(SourcePage::new(items(&["a", "b"]), true).with_total(Some(3))))
            .on(2, page(&["c"]))
            .on(3, page(&["d"]));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.stop, StopReason::TotalReached);
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(adapter.calls(), vec![1, 2]);
    }

    #[tokio::test]
    async fn last_page_flag_stops() {
        let adapter = ScriptedAdapter::starting_at(0).on(0, Ok(SourcePage::new(items(&["a"]), false)));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.stop, StopReason::LastPage);
        assert_eq!(adapter.calls(), vec![0]);
    }

    #[tokio::test]
    async fn transient_failure_is_retried() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, page(&["a"]))
            .on(2, timeout())
            .on(2, page(&["b"]));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.pages_skipped, 0);
        assert_eq!(adapter.calls(), vec![1, 2, 2, 3]);
    }

    #[tokio::test]
    async fn exhausted_middle_page_is_skipped() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, page(&["a"]))
            .on(2, timeout())
            .on(2, timeout())
            .on(2, timeout())
            .on(3, page(&["c"]));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.pages_skipped, 1);
        assert_eq!(outcome.pages_fetched, 2);
        let ids: Vec<_> = outcome.records.iter().map(|r| r.sku_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(adapter.calls(), vec![1, 2, 2, 2, 3, 4]);
    }

    #[tokio::test]
    async fn parse_error_is_not_retried() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, page(&["a"]))
            .on(2, Err(SourceError::parse("page 2", "no product array")))
            .on(3, page(&["c"]));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.pages_skipped, 1);
        assert_eq!(adapter.calls(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn first_page_failure_aborts() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, timeout())
            .on(1, timeout())
            .on(1, timeout())
            .on(2, page(&["b"]));
        let err = fetch_all(&adapter, &settings(10)).await.unwrap_err();

        assert!(matches!(err, PagerError::FirstPageFailed { page: 1, .. }));
        assert_eq!(adapter.calls(), vec![1, 1, 1]);
    }

    #[tokio::test]
    async fn fully_filtered_page_does_not_stop() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, Ok(SourcePage::new(Vec::new(), true).with_scanned(12)))
            .on(2, page(&["b"]));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.stop, StopReason::EmptyPage);
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(adapter.calls(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn duplicates_across_pages_are_dropped() {
        let adapter = ScriptedAdapter::starting_at(1)
            .on(1, page(&["a", "b"]))
            .on(2, page(&["b", "c"]));
        let outcome = fetch_all(&adapter, &settings(10)).await.unwrap();

        assert_eq!(outcome.duplicates_dropped, 1);
        let ids: Vec<_> = outcome.records.iter().map(|r| r.sku_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
