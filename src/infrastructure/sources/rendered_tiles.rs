//! Rendered search results whose tiles carry no usable product id
//!
//! Identity is a surrogate hashed from the product name and color, so a
//! variant keeps its id when the storefront reshuffles its URLs.

use async_trait::async_trait;
use scraper::{ElementRef, Selector};
use tracing::debug;

use crate::domain::errors::SourceResult;
use crate::domain::identity::{canonical_attribute, surrogate_product_id, surrogate_sku_id};
use crate::domain::price::{Pricing, parse_amount};
use crate::domain::product::ProductRecord;
use crate::domain::services::{SourceAdapter, SourcePage};
use crate::infrastructure::config::RenderedTilesConfig;
use crate::infrastructure::parsing::{
    compile_selector, first_attr, first_image, first_text, parse_document, resolve_url, strip_query,
};
use crate::infrastructure::renderer::PageRenderer;

struct TileSelectors {
    tile: Selector,
    link: Selector,
    name: Selector,
    special_price: Selector,
    normal_price: Selector,
    color: Selector,
    swatch: Selector,
    image: Selector,
}

pub struct RenderedTilesAdapter {
    renderer: Box<dyn PageRenderer>,
    search_url: String,
    base_url: String,
    tile_selector_text: String,
    selectors: TileSelectors,
}

impl RenderedTilesAdapter {
    pub fn new(renderer: Box<dyn PageRenderer>, config: &RenderedTilesConfig, base_url: String) -> SourceResult<Self> {
        let s = &config.selectors;
        Ok(Self {
            renderer,
            search_url: config.search_url.clone(),
            base_url,
            tile_selector_text: s.tile.clone(),
            selectors: TileSelectors {
                tile: compile_selector(&s.tile)?,
                link: compile_selector(&s.link)?,
                name: compile_selector(&s.name)?,
                special_price: compile_selector(&s.special_price)?,
                normal_price: compile_selector(&s.normal_price)?,
                color: compile_selector(&s.color)?,
                swatch: compile_selector(&s.swatch)?,
                image: compile_selector(&s.image)?,
            },
        })
    }

    fn page_url(&self, page: u32) -> String {
        let separator = if self.search_url.contains('?') { '&' } else { '?' };
        format!("{}{}page={}", self.search_url, separator, page)
    }

    fn parse_listing(&self, markup: &str) -> Vec<ProductRecord> {
        let document = parse_document(markup);
        document
            .select(&self.selectors.tile)
            .filter_map(|tile| self.parse_tile(tile))
            .collect()
    }

    /// Color label of a tile: the detail list, else the selected swatch.
    fn color(&self, tile: ElementRef<'_>) -> Option<String> {
        first_text(tile, &self.selectors.color)
            .filter(|c| !canonical_attribute(Some(c)).is_empty())
            .or_else(|| first_attr(tile, &self.selectors.swatch, "title"))
            .filter(|c| !canonical_attribute(Some(c)).is_empty())
    }

    fn parse_tile(&self, tile: ElementRef<'_>) -> Option<ProductRecord> {
        let s = &self.selectors;
        let Some(name) = first_text(tile, &s.name) else {
            debug!("Skipping tile without a product name");
            return None;
        };
        let color = self.color(tile);

        let url = first_attr(tile, &s.link, "href")
            .map(|href| {
                strip_query(&resolve_url(&self.base_url, &href))
                    .trim_end_matches('/')
                    .to_lowercase()
            })
            .unwrap_or_default();

        let special = first_text(tile, &s.special_price).map(|t| parse_amount(&t));
        let normal = first_text(tile, &s.normal_price).map(|t| parse_amount(&t));
        let pricing = Pricing::from_amounts(normal, special);

        let image = first_image(tile, &s.image).map(|src| resolve_url(&self.base_url, strip_query(&src)));
        let display_name = match &color {
            Some(color) => format!("{name} - {color}"),
            None => name.clone(),
        };

        Some(
            ProductRecord::new(
                surrogate_sku_id(&name, color.as_deref()),
                surrogate_product_id(&name),
                display_name,
                url,
                pricing,
            )
            .with_image(image)
            .with_variant(color, None),
        )
    }
}

#[async_trait]
impl SourceAdapter for RenderedTilesAdapter {
    fn name(&self) -> &str {
        "rendered_tiles"
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<SourcePage> {
        let markup = self.renderer.render(&self.page_url(page), &self.tile_selector_text).await?;
        Ok(SourcePage::new(self.parse_listing(&markup), true))
    }
}
