//! Configuration infrastructure
//!
//! Two layers of configuration:
//! 1. Process-level settings ([`AppConfig`]: logging), from an optional
//!    `catalog-watch.json` in the user config directory plus environment.
//! 2. One [`SiteConfig`] JSON file per monitored catalog. The `run` tuning
//!    knobs of a site can be overridden from the environment
//!    (`CATALOG_WATCH_RUN_MAX_PAGES=3`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config file {path:?} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to layer configuration: {source}")]
    Layer {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("Could not determine the local data directory")]
    NoDataDir,
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Process-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable the process-wide log file (per-site run logs are separate)
    pub file_output: bool,

    /// Directory of the process-wide log file; defaults to the app data dir
    pub log_dir: Option<PathBuf>,

    /// Module-specific log level filters (e.g., "sqlx": "warn", "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Layer the optional config file (explicit path, or the default location)
    /// and `CATALOG_WATCH_*` environment variables over the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => paths::app_config_file(),
        };

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(explicit.is_some()),
            );
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Per-run tuning knobs, consumed uniformly by the pager, the reconciliation
/// engine and the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Discount percentage a record must exceed to raise a high-discount event
    pub discount_threshold: u8,
    /// Consecutive misses after which a row is deactivated
    pub deactivation_threshold: u32,
    /// Minimum misses of an inactive row before its return counts as a restock
    pub restock_min_misses: u32,
    pub page_size: u32,
    pub max_pages: u32,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub page_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            discount_threshold: defaults::DISCOUNT_THRESHOLD,
            deactivation_threshold: defaults::DEACTIVATION_THRESHOLD,
            restock_min_misses: defaults::RESTOCK_MIN_MISSES,
            page_size: defaults::PAGE_SIZE,
            max_pages: defaults::MAX_PAGES,
            retry_attempts: defaults::RETRY_ATTEMPTS,
            retry_backoff_ms: defaults::RETRY_BACKOFF_MS,
            page_delay_ms: defaults::PAGE_DELAY_MS,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECONDS,
        }
    }
}

impl RunConfig {
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub const fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discount_threshold > 100 {
            return Err(ConfigError::invalid("discount_threshold must be at most 100"));
        }
        if self.deactivation_threshold == 0 {
            return Err(ConfigError::invalid("deactivation_threshold must be at least 1"));
        }
        if self.restock_min_misses == 0 {
            return Err(ConfigError::invalid("restock_min_misses must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::invalid("retry_attempts must be at least 1"));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::invalid("max_pages must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::invalid("page_size must be at least 1"));
        }
        Ok(())
    }
}

/// Notification settings of one site
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Bark-compatible push endpoints; every endpoint receives every event
    pub bark_urls: Vec<String>,
    pub icon_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            bark_urls: Vec::new(),
            icon_url: None,
            timeout_secs: defaults::NOTIFY_TIMEOUT_SECONDS,
        }
    }
}

/// One monitored catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub site_name: String,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub run: RunConfig,
    pub source: SourceConfig,
}

impl SiteConfig {
    /// Load a site file, apply `CATALOG_WATCH_RUN_*` overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Same as [`SiteConfig::load`] with an explicit environment map instead
    /// of the process environment.
    pub fn load_with_env(path: &Path, env: Option<config::Map<String, String>>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, path, env)
    }

    fn from_json_str(
        raw: &str,
        path: &Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        // Headers, cookies and payload templates are case-sensitive, so the
        // file itself goes through serde_json; only `run` is layered.
        let mut site: Self = serde_json::from_str(raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        let run_json = serde_json::to_string(&site.run).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        site.run = config::Config::builder()
            .add_source(config::File::from_str(&run_json, config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix(defaults::RUN_ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        site.validate()?;
        Ok(site)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.site_name.trim().is_empty() {
            return Err(ConfigError::invalid("site_name must not be empty"));
        }
        self.run.validate()
    }

    /// `site_name` lowercased with runs of non-alphanumerics folded to `_`.
    pub fn slug(&self) -> String {
        let mut slug = String::with_capacity(self.site_name.len());
        for c in self.site_name.trim().chars() {
            if c.is_ascii_alphanumeric() {
                slug.push(c.to_ascii_lowercase());
            } else if !slug.ends_with('_') {
                slug.push('_');
            }
        }
        slug.trim_matches('_').to_string()
    }

    pub fn table_name(&self) -> String {
        self.table_name
            .clone()
            .unwrap_or_else(|| format!("{}_products", self.slug()))
    }

    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(paths::data_dir()?.join("database").join(format!("{}.db", self.slug()))),
        }
    }

    pub fn log_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.log_path {
            Some(path) => Ok(path.clone()),
            None => Ok(paths::data_dir()?.join("logs").join(format!("{}.log", self.slug()))),
        }
    }
}

/// Which adapter serves a site, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    GraphqlListing(GraphqlListingConfig),
    HtmlListing(HtmlListingConfig),
    PagedMarkupApi(PagedMarkupConfig),
    SearchApi(SearchApiConfig),
    RenderedVariants(RenderedVariantsConfig),
    RenderedTiles(RenderedTilesConfig),
}

impl SourceConfig {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::GraphqlListing(_) => "graphql_listing",
            Self::HtmlListing(_) => "html_listing",
            Self::PagedMarkupApi(_) => "paged_markup_api",
            Self::SearchApi(_) => "search_api",
            Self::RenderedVariants(_) => "rendered_variants",
            Self::RenderedTiles(_) => "rendered_tiles",
        }
    }
}

/// POSTed JSON listing; `variables.page` is set per page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlListingConfig {
    pub api_url: String,
    #[serde(default)]
    pub payload_template: Value,
    /// JSON pointer to the product array in the response
    #[serde(default = "defaults::graphql_products_pointer")]
    pub products_pointer: String,
    /// Appended to every product URL (tracking or locale parameters)
    #[serde(default)]
    pub url_suffix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlListingConfig {
    pub page_url: String,
    #[serde(default = "defaults::get_method")]
    pub request_method: String,
    #[serde(default)]
    pub selectors: HtmlTileSelectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlTileSelectors {
    pub tile: String,
    pub id_attribute: String,
    pub name: String,
    pub link: String,
    pub image: String,
    pub list_price: String,
    pub sale_price: String,
}

impl Default for HtmlTileSelectors {
    fn default() -> Self {
        Self {
            tile: "div.product-tile".into(),
            id_attribute: "data-itemid".into(),
            name: "span.product-name".into(),
            link: "a.thumb-link".into(),
            image: "a.thumb-link img".into(),
            list_price: "span.price-standard".into(),
            sale_price: "span.price-sales".into(),
        }
    }
}

/// Server-rendered first page, JSON-wrapped markup fragments afterwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedMarkupConfig {
    pub listing_url: String,
    #[serde(default = "defaults::sku_element_prefix")]
    pub id_prefix: String,
    #[serde(default)]
    pub selectors: MarkupItemSelectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupItemSelectors {
    pub item: String,
    pub name: String,
    pub link: String,
    pub image: String,
    pub final_price: String,
    pub old_price: String,
    pub total_count: String,
}

impl Default for MarkupItemSelectors {
    fn default() -> Self {
        Self {
            item: "li.product-item".into(),
            name: "a.product-item-link".into(),
            link: "a.product-item-photo".into(),
            image: "img.product-image-photo".into(),
            final_price: ".price-final_price .price".into(),
            old_price: ".old-price .price".into(),
            total_count: "p.toolbar-amount".into(),
        }
    }
}

/// Server-rendered first page, then a POSTed search API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchApiConfig {
    pub main_page_url: String,
    pub api_url: String,
    #[serde(default)]
    pub payload_template: Value,
    #[serde(default)]
    pub selectors: SearchTileSelectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchTileSelectors {
    pub tile: String,
    pub name: String,
    pub price: String,
    pub link: String,
    pub image: String,
}

impl Default for SearchTileSelectors {
    fn default() -> Self {
        Self {
            tile: "div.product-tile[data-product-id]".into(),
            name: r#"a[data-qa="search-product-title"]"#.into(),
            price: r#"span[data-qa="search-product-price"]"#.into(),
            link: "a.product-tile-media".into(),
            image: "img.img-fluid".into(),
        }
    }
}

/// Rendered storefront whose tiles embed product JSON with variants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedVariantsConfig {
    pub main_page_url: String,
    /// Explicit page numbers to visit; empty means `1..=max_pages`
    #[serde(default)]
    pub pages: Vec<u32>,
    /// Keep only products with a tag containing this text (case-insensitive)
    #[serde(default)]
    pub tag_filter: Option<String>,
    #[serde(default = "defaults::product_path")]
    pub product_path: String,
    #[serde(default)]
    pub selectors: VariantTileSelectors,
    #[serde(default)]
    pub renderer: RendererConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantTileSelectors {
    pub item: String,
    pub data_attribute: String,
    pub title: String,
}

impl Default for VariantTileSelectors {
    fn default() -> Self {
        Self {
            item: "div.boost-sd__product-item".into(),
            data_attribute: "data-product".into(),
            title: ".boost-sd__product-title".into(),
        }
    }
}

/// Rendered search results without natural ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedTilesConfig {
    /// Search URL with its query; `&page=N` is appended
    pub search_url: String,
    #[serde(default)]
    pub selectors: ArticleTileSelectors,
    #[serde(default)]
    pub renderer: RendererConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArticleTileSelectors {
    pub tile: String,
    pub link: String,
    pub name: String,
    pub special_price: String,
    pub normal_price: String,
    pub color: String,
    pub swatch: String,
    pub image: String,
}

impl Default for ArticleTileSelectors {
    fn default() -> Self {
        Self {
            tile: "article.item-root-Fmc".into(),
            link: "a.item-name-YL8".into(),
            name: "h3".into(),
            special_price: "span.price-specialPrice-6Lo".into(),
            normal_price: "span.price-normalPrice-zvG".into(),
            color: "dd".into(),
            swatch: "button.swatch-button-cZb[title]".into(),
            image: "img".into(),
        }
    }
}

/// Where rendered markup comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RendererConfig {
    /// Plain GET; enough when the page is server-rendered
    #[default]
    Http,
    /// Headless-browser service exposing a `/content` endpoint
    Remote { endpoint: String },
}

/// Default locations under the user directories
pub mod paths {
    use super::ConfigError;
    use std::path::PathBuf;

    pub const APP_DIR_NAME: &str = "catalog-watch";

    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::NoDataDir)
    }

    pub fn app_config_file() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("catalog-watch.json"))
    }
}

/// Default configuration values
pub mod defaults {
    /// Environment prefix of process-level settings
    pub const ENV_PREFIX: &str = "CATALOG_WATCH";

    /// Environment prefix of per-site run overrides
    pub const RUN_ENV_PREFIX: &str = "CATALOG_WATCH_RUN";

    pub const DISCOUNT_THRESHOLD: u8 = 50;

    pub const DEACTIVATION_THRESHOLD: u32 = 80;

    pub const RESTOCK_MIN_MISSES: u32 = 3;

    pub const PAGE_SIZE: u32 = 24;

    pub const MAX_PAGES: u32 = 10;

    /// Attempts per page, first try included
    pub const RETRY_ATTEMPTS: u32 = 3;

    pub const RETRY_BACKOFF_MS: u64 = 5000;

    /// Delay between successful pages
    pub const PAGE_DELAY_MS: u64 = 1000;

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 20;

    pub const NOTIFY_TIMEOUT_SECONDS: u64 = 10;

    pub const USER_AGENT: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

    // Log configuration defaults
    pub const LOG_LEVEL: &str = "info";

    pub const LOG_JSON_FORMAT: bool = false;

    pub const LOG_CONSOLE_OUTPUT: bool = true;

    pub const LOG_FILE_OUTPUT: bool = false;

    pub fn graphql_products_pointer() -> String {
        "/data/categoryPageData/products".to_string()
    }

    pub fn get_method() -> String {
        "GET".to_string()
    }

    pub fn sku_element_prefix() -> String {
        "product-sku-".to_string()
    }

    pub fn product_path() -> String {
        "/en/products/".to_string()
    }
}
