//! Notification sinks
//!
//! [`BarkNotifier`] pushes every payload to each configured Bark-compatible
//! endpoint once. [`LogNotifier`] only logs, for dry runs.

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, warn};

use crate::domain::errors::NotifyError;
use crate::domain::events::NotificationPayload;
use crate::domain::services::NotificationSink;
use crate::infrastructure::http_client::HttpClient;

pub struct BarkNotifier {
    client: HttpClient,
    endpoints: Vec<String>,
    icon_url: Option<String>,
}

impl BarkNotifier {
    pub const fn new(client: HttpClient, endpoints: Vec<String>, icon_url: Option<String>) -> Self {
        Self {
            client,
            endpoints,
            icon_url,
        }
    }

    fn body(&self, payload: &NotificationPayload) -> serde_json::Value {
        json!({
            "title": payload.title,
            "body": payload.body,
            "icon": self.icon_url.clone().unwrap_or_default(),
            "url": payload.url,
            "image": payload.image_url.clone().unwrap_or_default(),
            "group": payload.group,
        })
    }
}

#[async_trait]
impl NotificationSink for BarkNotifier {
    /// Succeeds when at least one endpoint accepted the payload.
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        if self.endpoints.is_empty() {
            return Err(NotifyError::NoEndpoints);
        }

        let body = self.body(payload);
        let mut delivered = 0_usize;
        let mut last_error = None;

        for endpoint in &self.endpoints {
            match self.client.post_json_text(endpoint, &body).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!("📵 Bark push to {} failed: {}", endpoint, e);
                    last_error = Some(e.to_string());
                }
            }
        }

        if delivered == 0 {
            return Err(NotifyError::AllEndpointsFailed {
                attempted: self.endpoints.len(),
                last_error: last_error.unwrap_or_default(),
            });
        }
        info!("📨 Sent: {}", payload.title);
        Ok(())
    }
}

/// Sink that only records what would have been sent
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), NotifyError> {
        info!(
            "📝 [dry-run] {} | {} | {}",
            payload.title,
            payload.body.replace('\n', " / "),
            payload.url
        );
        Ok(())
    }
}
