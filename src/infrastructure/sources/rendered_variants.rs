//! Rendered storefront whose product tiles embed their product JSON
//!
//! Each tile carries the product as HTML-escaped JSON in an attribute, with
//! the variant list itself serialized as a JSON string inside it. Every
//! variant becomes one record.

use async_trait::async_trait;
use scraper::{ElementRef, Selector};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::errors::SourceResult;
use crate::domain::price::Pricing;
use crate::domain::product::ProductRecord;
use crate::domain::services::{SourceAdapter, SourcePage};
use crate::infrastructure::config::RenderedVariantsConfig;
use crate::infrastructure::parsing::{compile_selector, first_text, json_string, own_attr, parse_document, resolve_url};
use crate::infrastructure::renderer::PageRenderer;

/// Pull the product object out of a `data-product` attribute value.
///
/// The markup may still carry `&quot;` entities and stray control
/// characters; anything outside the outermost braces is ignored.
pub fn decode_product_json(raw: &str) -> Option<Value> {
    let cleaned: String = raw
        .replace("&quot;", "\"")
        .chars()
        .filter(|c| !c.is_control())
        .collect();
    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end < start {
        return None;
    }
    let mut product: Value = serde_json::from_str(&cleaned[start..=end]).ok()?;

    let variants = match product.get("variants") {
        Some(Value::String(s)) if s.trim_start().starts_with('[') => {
            serde_json::from_str::<Value>(s.trim()).ok().filter(Value::is_array)
        }
        Some(Value::Array(items)) => Some(Value::Array(items.clone())),
        _ => None,
    };
    product["variants"] = variants.unwrap_or_else(|| Value::Array(Vec::new()));
    Some(product)
}

pub struct RenderedVariantsAdapter {
    renderer: Box<dyn PageRenderer>,
    main_page_url: String,
    pages: Vec<u32>,
    tag_filter: Option<String>,
    product_path: String,
    base_url: String,
    item_selector_text: String,
    data_attribute: String,
    item: Selector,
    title: Selector,
}

impl RenderedVariantsAdapter {
    pub fn new(renderer: Box<dyn PageRenderer>, config: &RenderedVariantsConfig, base_url: String) -> SourceResult<Self> {
        let s = &config.selectors;
        Ok(Self {
            renderer,
            main_page_url: config.main_page_url.clone(),
            pages: config.pages.clone(),
            tag_filter: config
                .tag_filter
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_lowercase),
            product_path: config.product_path.clone(),
            base_url,
            item_selector_text: s.item.clone(),
            data_attribute: s.data_attribute.clone(),
            item: compile_selector(&s.item)?,
            title: compile_selector(&s.title)?,
        })
    }

    /// Provider page for the pager's page index, and whether more follow.
    ///
    /// Without an explicit page list the index is the provider page.
    fn resolve_page(&self, index: u32) -> Option<(u32, bool)> {
        if self.pages.is_empty() {
            return Some((index, true));
        }
        let position = usize::try_from(index).ok()?.checked_sub(1)?;
        self.pages
            .get(position)
            .map(|page| (*page, position + 1 < self.pages.len()))
    }

    fn keeps(&self, product: &Value) -> bool {
        let Some(filter) = &self.tag_filter else {
            return true;
        };
        let tags = product
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| json_string(Some(t)))
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase()
            })
            .unwrap_or_default();
        tags.contains(filter.as_str())
    }

    /// Records of every kept tile, and the number of tiles on the page.
    fn parse_listing(&self, markup: &str) -> (Vec<ProductRecord>, usize) {
        let document = parse_document(markup);
        let mut tiles = 0;
        let records = document
            .select(&self.item)
            .inspect(|_| tiles += 1)
            .flat_map(|item| self.parse_item(item))
            .collect();
        (records, tiles)
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Vec<ProductRecord> {
        let Some(product) = own_attr(item, &self.data_attribute).and_then(|raw| decode_product_json(&raw)) else {
            debug!("Skipping tile without readable product data");
            return Vec::new();
        };
        if !self.keeps(&product) {
            return Vec::new();
        }

        let name = first_text(item, &self.title)
            .or_else(|| json_string(product.get("title")))
            .unwrap_or_else(|| "Unknown".to_string());
        let handle = json_string(product.get("handle")).unwrap_or_default();
        let url = resolve_url(&self.base_url, &format!("{}{}", self.product_path, handle));
        let product_id = json_string(product.get("id")).unwrap_or_default();
        let pricing = Pricing::from_json(
            product.get("compareAtPriceMin").filter(|v| !is_falsy(v)),
            product.get("priceMin"),
        );
        let image = json_string(product.pointer("/images/0/src")).map(|src| resolve_url(&self.base_url, &src));

        let variants = product.get("variants").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
        variants
            .iter()
            .filter_map(|variant| {
                let sku_id = json_string(variant.get("id"))?;
                let title = json_string(variant.get("title")).unwrap_or_default();
                let mut parts = title.split('/').map(str::trim).filter(|p| !p.is_empty());
                let color = parts.next().map(str::to_string);
                let size = parts.next().map(str::to_string);
                let display_name = if title.is_empty() {
                    name.clone()
                } else {
                    format!("{name} - {title}")
                };

                Some(
                    ProductRecord::new(sku_id, product_id.clone(), display_name, url.clone(), pricing)
                        .with_image(image.clone())
                        .with_variant(color, size),
                )
            })
            .collect()
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[async_trait]
impl SourceAdapter for RenderedVariantsAdapter {
    fn name(&self) -> &str {
        "rendered_variants"
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<SourcePage> {
        let Some((provider_page, has_more)) = self.resolve_page(page) else {
            return Ok(SourcePage::new(Vec::new(), false));
        };
        let url = format!("{}?page={}", self.main_page_url, provider_page);
        let markup = self.renderer.render(&url, &self.item_selector_text).await?;

        let (items, tiles) = self.parse_listing(&markup);
        if tiles == 0 {
            warn!("⚠️ No product tiles found on {}", url);
        } else if items.is_empty() {
            info!("ℹ️ All {} tiles on {} were filtered out", tiles, url);
        }
        Ok(SourcePage::new(items, has_more).with_scanned(tiles))
    }
}
