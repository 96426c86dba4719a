//! Change events and the notification payloads rendered from them

use serde::{Deserialize, Serialize};

use crate::domain::product::ProductRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    New,
    PriceDrop,
    Restock,
    HighDiscount,
}

impl ChangeKind {
    pub const fn title_suffix(self) -> &'static str {
        match self {
            Self::New => "New arrival",
            Self::PriceDrop => "Price drop",
            Self::Restock => "Back in stock",
            Self::HighDiscount => "High discount!",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::PriceDrop => "price_drop",
            Self::Restock => "restock",
            Self::HighDiscount => "high_discount",
        };
        f.write_str(label)
    }
}

/// One detected change for one fetched record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: ProductRecord,
    /// Stored sale price before this run, when known
    pub previous_sale_price: Option<f64>,
}

impl ChangeEvent {
    pub const fn new(kind: ChangeKind, record: ProductRecord, previous_sale_price: Option<f64>) -> Self {
        Self {
            kind,
            record,
            previous_sale_price,
        }
    }

    /// Render the payload handed to a notification sink.
    pub fn to_payload(&self, site_name: &str) -> NotificationPayload {
        let record = &self.record;
        let body = match (self.kind, self.previous_sale_price) {
            (ChangeKind::PriceDrop, Some(previous)) => format!(
                "{}\nNow ${:.2} (was ${:.2})",
                record.name, record.sale_price, previous
            ),
            (ChangeKind::HighDiscount, _) => format!(
                "{}% OFF - {}\nPrice: ${:.2}",
                record.discount_percentage, record.name, record.sale_price
            ),
            _ => format!("{}\nPrice: ${:.2}", record.name, record.sale_price),
        };

        NotificationPayload {
            title: format!("[{site_name}] {}", self.kind.title_suffix()),
            body,
            url: record.url.clone(),
            image_url: record.image_url.clone(),
            group: site_name.to_string(),
        }
    }
}

/// What a [`crate::domain::services::NotificationSink`] receives, one per event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub url: String,
    pub image_url: Option<String>,
    pub group: String,
}
