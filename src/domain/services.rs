//! Capabilities the pipeline is written against
//!
//! A [`SourceAdapter`] turns one upstream catalog into pages of normalized
//! records; a [`NotificationSink`] delivers change notifications. Both are
//! implemented in `infrastructure` and replaced by scripted doubles in tests.

use async_trait::async_trait;

use crate::domain::errors::{NotifyError, SourceResult};
use crate::domain::events::NotificationPayload;
use crate::domain::product::ProductRecord;

/// One page of a source listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourcePage {
    pub items: Vec<ProductRecord>,
    /// `false` when the source knows this is the last page
    pub has_more: bool,
    /// Total item count declared by the provider, if it declares one
    pub total_items: Option<usize>,
    /// Upstream entries read before any filtering; a page whose entries were
    /// all filtered out is not the end of the listing
    pub scanned: usize,
}

impl SourcePage {
    pub fn new(items: Vec<ProductRecord>, has_more: bool) -> Self {
        Self {
            scanned: items.len(),
            items,
            has_more,
            total_items: None,
        }
    }

    pub fn with_scanned(mut self, scanned: usize) -> Self {
        self.scanned = scanned.max(self.items.len());
        self
    }

    /// Nothing at all came back, filtered or not
    pub fn is_exhausted(&self) -> bool {
        self.items.is_empty() && self.scanned == 0
    }

    pub fn with_total(mut self, total_items: Option<usize>) -> Self {
        self.total_items = total_items;
        self
    }
}

/// Per-source retrieval capability.
///
/// Page numbers are provider-native and start at [`SourceAdapter::first_page`].
/// Pagination, retry and pacing are owned by the pager, not the adapter.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short label used in logs, e.g. `"html_listing"`
    fn name(&self) -> &str;

    fn first_page(&self) -> u32 {
        1
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<SourcePage>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError>;
}
