//! Rendered markup for sources that build their listings client-side
//!
//! Browser automation is not done in-process. [`RemoteRenderer`] asks a
//! headless-browser service for the page content; [`HttpRenderer`] is a plain
//! GET for storefronts that pre-render their tiles.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use crate::domain::errors::SourceResult;
use crate::infrastructure::config::RendererConfig;
use crate::infrastructure::http_client::HttpClient;

#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Markup of `url` once an element matching `wait_for` is present.
    async fn render(&self, url: &str, wait_for: &str) -> SourceResult<String>;
}

pub struct HttpRenderer {
    client: HttpClient,
}

impl HttpRenderer {
    pub const fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str, _wait_for: &str) -> SourceResult<String> {
        self.client.request_text(Method::GET, url).await
    }
}

/// Client of a browserless-style `/content` endpoint
pub struct RemoteRenderer {
    client: HttpClient,
    endpoint: String,
}

impl RemoteRenderer {
    pub fn new(client: HttpClient, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/content", endpoint.trim_end_matches('/')),
        }
    }

    fn request_body(url: &str, wait_for: &str) -> serde_json::Value {
        json!({
            "url": url,
            "waitForSelector": { "selector": wait_for },
            "gotoOptions": { "waitUntil": "domcontentloaded" },
        })
    }
}

#[async_trait]
impl PageRenderer for RemoteRenderer {
    async fn render(&self, url: &str, wait_for: &str) -> SourceResult<String> {
        debug!("🖥️ Rendering {} via {}", url, self.endpoint);
        self.client
            .post_json_text(&self.endpoint, &Self::request_body(url, wait_for))
            .await
    }
}

pub fn build_renderer(config: &RendererConfig, client: HttpClient) -> Box<dyn PageRenderer> {
    match config {
        RendererConfig::Http => Box::new(HttpRenderer::new(client)),
        RendererConfig::Remote { endpoint } => Box::new(RemoteRenderer::new(client, endpoint)),
    }
}
