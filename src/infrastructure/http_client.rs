//! HTTP client shared by the source adapters, renderers and notifiers
//!
//! One client per site: configured headers and cookies are installed once and
//! the cookie jar keeps whatever session cookies the first page hands out.
//! Failures map onto [`SourceError`] so the pager can tell transient
//! conditions (network, timeout, HTTP status) from malformed payloads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, Response, cookie::Jar};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::errors::{SourceError, SourceResult};
use crate::infrastructure::config::{SiteConfig, defaults};

#[derive(Error, Debug)]
pub enum HttpClientError {
    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Cookies configured but base_url '{0}' is not a valid URL")]
    InvalidCookieUrl(String),

    #[error("Failed to create HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub follow_redirects: bool,
    /// Default headers sent with every request
    pub headers: HashMap<String, String>,
    /// Cookies pre-seeded into the jar for `cookie_url`
    pub cookies: HashMap<String, String>,
    pub cookie_url: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECONDS),
            user_agent: defaults::USER_AGENT.to_string(),
            follow_redirects: true,
            headers: HashMap::new(),
            cookies: HashMap::new(),
            cookie_url: None,
        }
    }
}

impl HttpClientConfig {
    pub fn for_site(site: &SiteConfig) -> Self {
        let user_agent = site
            .headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("user-agent"))
            .map_or_else(|| defaults::USER_AGENT.to_string(), |(_, value)| value.clone());

        Self {
            timeout: site.run.request_timeout(),
            user_agent,
            follow_redirects: true,
            headers: site.headers.clone(),
            cookies: site.cookies.clone(),
            cookie_url: (!site.base_url.is_empty()).then(|| site.base_url.clone()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn header_map(&self) -> Result<HeaderMap, HttpClientError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("user-agent") {
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| HttpClientError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| HttpClientError::InvalidHeader {
                name: name.clone(),
                reason: e.to_string(),
            })?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }

    fn cookie_jar(&self) -> Result<Jar, HttpClientError> {
        let jar = Jar::default();
        if self.cookies.is_empty() {
            return Ok(jar);
        }
        let raw_url = self.cookie_url.clone().unwrap_or_default();
        let url = url::Url::parse(&raw_url).map_err(|_| HttpClientError::InvalidCookieUrl(raw_url.clone()))?;
        for (name, value) in &self.cookies {
            jar.add_cookie_str(&format!("{name}={value}"), &url);
        }
        Ok(jar)
    }
}

/// HTTP client with per-site defaults and typed error mapping
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    /// Optional context label for provenance in logs (e.g. a site name)
    context_label: Option<String>,
}

impl HttpClient {
    pub fn with_config(config: &HttpClientConfig) -> Result<Self, HttpClientError> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(config.header_map()?)
            .cookie_provider(Arc::new(config.cookie_jar()?))
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()?;

        Ok(Self {
            client,
            context_label: None,
        })
    }

    /// Set a human-readable context label for logging provenance
    pub fn with_context_label(mut self, label: &str) -> Self {
        self.context_label = Some(label.to_string());
        self
    }

    fn label(&self) -> &str {
        self.context_label.as_deref().unwrap_or("-")
    }

    async fn send(&self, method: Method, url: &str, query: &[(&str, String)], body: Option<&Value>) -> SourceResult<Response> {
        debug!("🌐 HTTP {} [{}]: {}", method, self.label(), url);

        let mut request = self.client.request(method, url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| map_reqwest_error(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    async fn read_text(url: &str, response: Response) -> SourceResult<String> {
        response.text().await.map_err(|e| map_reqwest_error(url, &e))
    }

    pub async fn request_text(&self, method: Method, url: &str) -> SourceResult<String> {
        let response = self.send(method, url, &[], None).await?;
        Self::read_text(url, response).await
    }

    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> SourceResult<String> {
        let response = self.send(Method::GET, url, query, None).await?;
        Self::read_text(url, response).await
    }

    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> SourceResult<Value> {
        let text = self.get_text(url, query).await?;
        parse_json(url, &text)
    }

    pub async fn post_json(&self, url: &str, body: &Value) -> SourceResult<Value> {
        let text = self.post_json_text(url, body).await?;
        parse_json(url, &text)
    }

    pub async fn post_json_text(&self, url: &str, body: &Value) -> SourceResult<String> {
        let response = self.send(Method::POST, url, &[], Some(body)).await?;
        Self::read_text(url, response).await
    }
}

fn parse_json(url: &str, text: &str) -> SourceResult<Value> {
    serde_json::from_str(text).map_err(|e| SourceError::parse(url, format!("invalid JSON: {e}")))
}

/// Timeouts, status errors and connection failures are transient; a body
/// that fails to decode is a malformed payload.
fn map_reqwest_error(url: &str, error: &reqwest::Error) -> SourceError {
    if error.is_timeout() {
        SourceError::Timeout { url: url.to_string() }
    } else if let Some(status) = error.status() {
        SourceError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        }
    } else if error.is_decode() {
        SourceError::parse(url, error.to_string())
    } else {
        SourceError::transport(url, error.to_string())
    }
}
