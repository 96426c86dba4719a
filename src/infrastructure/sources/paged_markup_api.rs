//! Server-rendered first page followed by an AJAX endpoint that returns the
//! next pages as markup fragments wrapped in JSON.

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, info};

use crate::domain::errors::{SourceError, SourceResult};
use crate::domain::price::Pricing;
use crate::domain::product::ProductRecord;
use crate::domain::services::{SourceAdapter, SourcePage};
use crate::infrastructure::config::PagedMarkupConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::{
    compile_selector, element_text, first_attr, first_image, first_text, own_attr, parse_document, parse_fragment,
    resolve_url,
};

struct ItemSelectors {
    item: Selector,
    name: Selector,
    link: Selector,
    image: Selector,
    final_price: Selector,
    old_price: Selector,
    total_count: Selector,
}

pub struct PagedMarkupAdapter {
    client: HttpClient,
    listing_url: String,
    base_url: String,
    id_prefix: String,
    page_size: u32,
    selectors: ItemSelectors,
    total_pattern: Regex,
}

impl PagedMarkupAdapter {
    pub fn new(client: HttpClient, config: &PagedMarkupConfig, base_url: String, page_size: u32) -> SourceResult<Self> {
        let s = &config.selectors;
        let total_pattern =
            Regex::new(r"of\s+(\d+)").map_err(|e| SourceError::parse("total count pattern", e.to_string()))?;

        Ok(Self {
            client,
            listing_url: config.listing_url.clone(),
            base_url,
            id_prefix: config.id_prefix.clone(),
            page_size,
            selectors: ItemSelectors {
                item: compile_selector(&s.item)?,
                name: compile_selector(&s.name)?,
                link: compile_selector(&s.link)?,
                image: compile_selector(&s.image)?,
                final_price: compile_selector(&s.final_price)?,
                old_price: compile_selector(&s.old_price)?,
                total_count: compile_selector(&s.total_count)?,
            },
            total_pattern,
        })
    }

    /// Declared item count from the toolbar ("Items 1-36 of 157").
    fn total_count(&self, document: &Html) -> Option<usize> {
        let toolbar = document.select(&self.selectors.total_count).next()?;
        let text = element_text(toolbar);
        self.total_pattern
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    fn parse_items(&self, document: &Html) -> Vec<ProductRecord> {
        document
            .select(&self.selectors.item)
            .filter_map(|item| self.parse_item(item))
            .collect()
    }

    fn parse_item(&self, item: ElementRef<'_>) -> Option<ProductRecord> {
        let s = &self.selectors;
        let (Some(raw_id), Some(name), Some(href), Some(final_price)) = (
            own_attr(item, "id"),
            first_text(item, &s.name),
            first_attr(item, &s.link, "href"),
            first_text(item, &s.final_price),
        ) else {
            debug!("Skipping incomplete product item");
            return None;
        };

        let sku_id = raw_id.strip_prefix(&self.id_prefix).unwrap_or(&raw_id).to_string();
        let pricing = Pricing::from_text(first_text(item, &s.old_price).as_deref(), Some(&final_price));
        let image = first_image(item, &s.image);

        Some(
            ProductRecord::new(sku_id.clone(), sku_id, name, resolve_url(&self.base_url, &href), pricing)
                .with_image(image),
        )
    }

    fn parse_first_page(&self, markup: &str) -> SourcePage {
        let document = parse_document(markup);
        let total = self.total_count(&document);
        if let Some(total) = total {
            info!("ℹ️ Listing declares {} items", total);
        }
        SourcePage::new(self.parse_items(&document), true).with_total(total)
    }

    /// A response without markup means there is nothing left.
    fn parse_ajax_page(&self, body: &Value) -> SourcePage {
        match body.get("categoryProducts").and_then(Value::as_str) {
            Some(fragment) if !fragment.trim().is_empty() => {
                SourcePage::new(self.parse_items(&parse_fragment(fragment)), true)
            }
            _ => SourcePage::new(Vec::new(), false),
        }
    }
}

#[async_trait]
impl SourceAdapter for PagedMarkupAdapter {
    fn name(&self) -> &str {
        "paged_markup_api"
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<SourcePage> {
        let limit = ("product_list_limit", self.page_size.to_string());
        if page <= 1 {
            let markup = self.client.get_text(&self.listing_url, &[limit]).await?;
            return Ok(self.parse_first_page(&markup));
        }

        let query = [("p", page.to_string()), limit, ("shopbyAjax", "1".to_string())];
        let body = self.client.get_json(&self.listing_url, &query).await?;
        Ok(self.parse_ajax_page(&body))
    }
}
