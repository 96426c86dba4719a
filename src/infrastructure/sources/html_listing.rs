//! Single server-rendered listing page

use async_trait::async_trait;
use reqwest::Method;
use scraper::{ElementRef, Selector};
use tracing::debug;

use crate::domain::errors::{SourceError, SourceResult};
use crate::domain::price::Pricing;
use crate::domain::product::ProductRecord;
use crate::domain::services::{SourceAdapter, SourcePage};
use crate::infrastructure::config::HtmlListingConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::{
    compile_selector, first_attr, first_image, first_text, own_attr, parse_document, resolve_url,
};

struct TileSelectors {
    tile: Selector,
    name: Selector,
    link: Selector,
    image: Selector,
    list_price: Selector,
    sale_price: Selector,
}

pub struct HtmlListingAdapter {
    client: HttpClient,
    page_url: String,
    method: Method,
    base_url: String,
    id_attribute: String,
    selectors: TileSelectors,
}

impl HtmlListingAdapter {
    pub fn new(client: HttpClient, config: &HtmlListingConfig, base_url: String) -> SourceResult<Self> {
        let method = Method::from_bytes(config.request_method.to_uppercase().as_bytes())
            .map_err(|e| SourceError::parse("request_method", e.to_string()))?;
        let s = &config.selectors;

        Ok(Self {
            client,
            page_url: config.page_url.clone(),
            method,
            base_url,
            id_attribute: s.id_attribute.clone(),
            selectors: TileSelectors {
                tile: compile_selector(&s.tile)?,
                name: compile_selector(&s.name)?,
                link: compile_selector(&s.link)?,
                image: compile_selector(&s.image)?,
                list_price: compile_selector(&s.list_price)?,
                sale_price: compile_selector(&s.sale_price)?,
            },
        })
    }

    fn parse_listing(&self, markup: &str) -> Vec<ProductRecord> {
        let document = parse_document(markup);
        document
            .select(&self.selectors.tile)
            .filter_map(|tile| self.parse_tile(tile))
            .collect()
    }

    fn parse_tile(&self, tile: ElementRef<'_>) -> Option<ProductRecord> {
        let s = &self.selectors;
        let (Some(item_id), Some(name), Some(href)) = (
            own_attr(tile, &self.id_attribute),
            first_text(tile, &s.name),
            first_attr(tile, &s.link, "href"),
        ) else {
            debug!("Skipping incomplete product tile");
            return None;
        };

        let product_id = item_id.split('-').next().unwrap_or(&item_id).to_string();
        let pricing = Pricing::from_text(
            first_text(tile, &s.list_price).as_deref(),
            first_text(tile, &s.sale_price).as_deref(),
        );
        let image = first_image(tile, &s.image).map(|src| resolve_url(&self.base_url, &src));

        Some(
            ProductRecord::new(item_id.clone(), product_id, name, resolve_url(&self.base_url, &href), pricing)
                .with_image(image),
        )
    }
}

#[async_trait]
impl SourceAdapter for HtmlListingAdapter {
    fn name(&self) -> &str {
        "html_listing"
    }

    /// The whole listing is one page.
    async fn fetch_page(&self, _page: u32) -> SourceResult<SourcePage> {
        let markup = self.client.request_text(self.method.clone(), &self.page_url).await?;
        Ok(SourcePage::new(self.parse_listing(&markup), false))
    }
}
