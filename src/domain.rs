//! Domain module - catalog records, pricing, identity and the capabilities
//! the monitoring pipeline is written against.

pub mod errors;
pub mod events;
pub mod identity;
pub mod price;
pub mod product;
pub mod repositories;
pub mod services;

pub use errors::{NotifyError, SourceError, StoreError};
pub use events::{ChangeEvent, ChangeKind, NotificationPayload};
pub use price::Pricing;
pub use product::{CatalogSummary, ProductRecord, RunMutation, StoredProduct};
pub use repositories::CatalogStore;
pub use services::{NotificationSink, SourceAdapter, SourcePage};
