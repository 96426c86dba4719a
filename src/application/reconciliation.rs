//! Catalog reconciliation
//!
//! Diffs a freshly fetched batch against the stored catalog as it stood at
//! the end of the previous run, dispatches the resulting change events, and
//! only then hands the batch to the store. Ordering contract:
//!
//! 1. an empty store is only seeded (no diff, no notifications);
//! 2. events are dispatched in batch order, a record's primary event before
//!    its high-discount event, one attempt each;
//! 3. the store mutation starts after the last dispatch returned, whatever
//!    the individual outcomes were.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::domain::errors::StoreResult;
use crate::domain::events::{ChangeEvent, ChangeKind};
use crate::domain::product::{ProductRecord, RunMutation, StoredProduct};
use crate::domain::repositories::CatalogStore;
use crate::domain::services::NotificationSink;
use crate::infrastructure::config::RunConfig;

/// Thresholds that decide which changes are worth an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationPolicy {
    /// A discount strictly above this raises a high-discount event
    pub discount_threshold: u8,
    /// An inactive row must have missed at least this many runs to count as restocked
    pub restock_min_misses: u32,
}

impl From<&RunConfig> for ReconciliationPolicy {
    fn from(run: &RunConfig) -> Self {
        Self {
            discount_threshold: run.discount_threshold,
            restock_min_misses: run.restock_min_misses,
        }
    }
}

/// Events raised for one record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    pub primary: Option<ChangeKind>,
    pub high_discount: bool,
}

/// Classify one fetched record against its stored row.
///
/// The primary event is the first of New, PriceDrop, Restock that applies.
/// The high-discount event is independent of it and only fires for new
/// records or records whose price went down.
pub fn classify(record: &ProductRecord, old: Option<&StoredProduct>, policy: &ReconciliationPolicy) -> Classification {
    let price_dropped = old
        .and_then(|old| old.sale_price)
        .is_some_and(|previous| record.sale_price < previous);

    let primary = match old {
        None => Some(ChangeKind::New),
        Some(_) if price_dropped => Some(ChangeKind::PriceDrop),
        Some(old) if !old.is_active && old.miss_count >= policy.restock_min_misses => Some(ChangeKind::Restock),
        Some(_) => None,
    };

    let high_discount =
        record.discount_percentage > policy.discount_threshold && (old.is_none() || price_dropped);

    Classification { primary, high_discount }
}

/// All events for a batch, in dispatch order.
pub fn compute_events(
    batch: &[ProductRecord],
    snapshot: &HashMap<String, StoredProduct>,
    policy: &ReconciliationPolicy,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    for record in batch {
        let old = snapshot.get(&record.sku_id);
        let previous_sale_price = old.and_then(|o| o.sale_price);
        let classification = classify(record, old, policy);

        if let Some(kind) = classification.primary {
            events.push(ChangeEvent::new(kind, record.clone(), previous_sale_price));
        }
        if classification.high_discount {
            events.push(ChangeEvent::new(ChangeKind::HighDiscount, record.clone(), previous_sale_price));
        }
    }
    events
}

/// Per-kind event tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub new: u32,
    pub price_drop: u32,
    pub restock: u32,
    pub high_discount: u32,
}

impl EventCounts {
    pub fn record(&mut self, kind: ChangeKind) {
        match kind {
            ChangeKind::New => self.new += 1,
            ChangeKind::PriceDrop => self.price_drop += 1,
            ChangeKind::Restock => self.restock += 1,
            ChangeKind::HighDiscount => self.high_discount += 1,
        }
    }

    pub const fn total(&self) -> u32 {
        self.new + self.price_drop + self.restock + self.high_discount
    }
}

impl std::fmt::Display for EventCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "new: {} | price drop: {} | restock: {} | high discount: {}",
            self.new, self.price_drop, self.restock, self.high_discount
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub counts: EventCounts,
    pub failures: u32,
}

/// Send every event once, in order. Failures are logged and counted.
pub async fn dispatch_events(events: &[ChangeEvent], sink: &dyn NotificationSink, site_name: &str) -> DispatchSummary {
    let mut summary = DispatchSummary::default();
    for event in events {
        summary.counts.record(event.kind);
        let payload = event.to_payload(site_name);
        if let Err(e) = sink.deliver(&payload).await {
            summary.failures += 1;
            warn!("📵 Notification '{}' for {} not delivered: {}", payload.title, event.record.sku_id, e);
        }
    }
    summary
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    /// The store was empty: seeded without diffing or notifying
    pub bootstrapped: bool,
    pub events: EventCounts,
    pub dispatch_failures: u32,
    pub mutation: RunMutation,
}

pub struct ReconciliationEngine<'a> {
    store: &'a dyn CatalogStore,
    sink: &'a dyn NotificationSink,
    policy: ReconciliationPolicy,
    site_name: &'a str,
}

impl<'a> ReconciliationEngine<'a> {
    pub const fn new(
        store: &'a dyn CatalogStore,
        sink: &'a dyn NotificationSink,
        policy: ReconciliationPolicy,
        site_name: &'a str,
    ) -> Self {
        Self {
            store,
            sink,
            policy,
            site_name,
        }
    }

    /// Reconcile a non-empty, deduplicated batch and persist it.
    pub async fn reconcile(
        &self,
        batch: &[ProductRecord],
        now: DateTime<Utc>,
        deactivation_threshold: u32,
    ) -> StoreResult<ReconciliationOutcome> {
        if self.store.row_count().await? == 0 {
            info!("🌱 Empty catalog: seeding {} records without notifications", batch.len());
            let mutation = self.store.apply_run(batch, now, deactivation_threshold).await?;
            return Ok(ReconciliationOutcome {
                bootstrapped: true,
                mutation,
                ..ReconciliationOutcome::default()
            });
        }

        let snapshot = self.store.load_snapshot().await?;
        info!(
            "🔍 Comparing {} fetched records with {} stored rows",
            batch.len(),
            snapshot.len()
        );

        let events = compute_events(batch, &snapshot, &self.policy);
        let dispatch = dispatch_events(&events, self.sink, self.site_name).await;
        info!("🔔 Events → {}", dispatch.counts);

        let mutation = self.store.apply_run(batch, now, deactivation_threshold).await?;
        Ok(ReconciliationOutcome {
            bootstrapped: false,
            events: dispatch.counts,
            dispatch_failures: dispatch.failures,
            mutation,
        })
    }
}
