//! Search results page followed by a POSTed search API
//!
//! The first page is the server-rendered results page, which also seeds the
//! session cookies the API expects. Later pages come from the API, which
//! returns one entry per variant and the total hit count.

use async_trait::async_trait;
use scraper::{ElementRef, Selector};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::domain::errors::{SourceError, SourceResult};
use crate::domain::price::Pricing;
use crate::domain::product::ProductRecord;
use crate::domain::services::{SourceAdapter, SourcePage};
use crate::infrastructure::config::SearchApiConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::{
    compile_selector, first_attr, first_image, first_text, json_string, own_attr, parse_document, resolve_url,
};

struct TileSelectors {
    tile: Selector,
    name: Selector,
    price: Selector,
    link: Selector,
    image: Selector,
}

pub struct SearchApiAdapter {
    client: HttpClient,
    main_page_url: String,
    api_url: String,
    payload_template: Value,
    base_url: String,
    page_size: u32,
    selectors: TileSelectors,
}

impl SearchApiAdapter {
    pub fn new(client: HttpClient, config: &SearchApiConfig, base_url: String, page_size: u32) -> SourceResult<Self> {
        let s = &config.selectors;
        Ok(Self {
            client,
            main_page_url: config.main_page_url.clone(),
            api_url: config.api_url.clone(),
            payload_template: config.payload_template.clone(),
            base_url,
            page_size,
            selectors: TileSelectors {
                tile: compile_selector(&s.tile)?,
                name: compile_selector(&s.name)?,
                price: compile_selector(&s.price)?,
                link: compile_selector(&s.link)?,
                image: compile_selector(&s.image)?,
            },
        })
    }

    fn parse_results_page(&self, markup: &str) -> Vec<ProductRecord> {
        let document = parse_document(markup);
        document
            .select(&self.selectors.tile)
            .filter_map(|tile| self.parse_tile(tile))
            .collect()
    }

    fn parse_tile(&self, tile: ElementRef<'_>) -> Option<ProductRecord> {
        let s = &self.selectors;
        let (Some(product_id), Some(name), Some(price), Some(href)) = (
            own_attr(tile, "data-product-id"),
            first_text(tile, &s.name),
            first_text(tile, &s.price),
            first_attr(tile, &s.link, "href"),
        ) else {
            debug!("Skipping incomplete search tile");
            return None;
        };

        // The link ends with the variant code; fall back to the product id.
        let sku_id = if href.contains('/') {
            href.trim_end_matches('/').rsplit('/').next().unwrap_or(&product_id).to_string()
        } else {
            product_id.clone()
        };
        let pricing = Pricing::from_text(Some(&price), Some(&price));
        let image = first_image(tile, &s.image);

        Some(
            ProductRecord::new(sku_id, product_id, name, resolve_url(&self.base_url, &href), pricing)
                .with_image(image),
        )
    }

    fn payload_for(&self, page: u32) -> Value {
        let mut payload = match &self.payload_template {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        payload.insert("Page".to_string(), json!(page));
        payload.insert("StartIndex".to_string(), json!((page - 1) * self.page_size));
        Value::Object(payload)
    }

    fn parse_api_page(&self, body: &Value) -> SourceResult<SourcePage> {
        let results = body
            .get("ProductSearchResults")
            .filter(|r| r.is_object())
            .ok_or_else(|| SourceError::parse(&self.api_url, "no ProductSearchResults object"))?;

        let items: Vec<ProductRecord> = results
            .get("SearchResults")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|item| self.parse_result(item)).collect())
            .unwrap_or_default();

        let total = results
            .get("TotalCount")
            .and_then(Value::as_u64)
            .filter(|count| *count > 0)
            .map(|count| count as usize);

        Ok(SourcePage::new(items, true).with_total(total))
    }

    fn parse_result(&self, item: &Value) -> Option<ProductRecord> {
        let Some(sku_id) = json_string(item.get("VariantId")) else {
            debug!("Skipping search result without VariantId");
            return None;
        };
        let product_id = json_string(item.get("ProductId")).unwrap_or_else(|| sku_id.clone());
        let name = json_string(item.get("DisplayName")).unwrap_or_default();
        let url = json_string(item.get("Url"))
            .map(|path| resolve_url(&self.base_url, &path))
            .unwrap_or_default();
        let pricing = Pricing::from_json(item.pointer("/Pricing/ListPrice"), item.pointer("/Pricing/Price"));

        Some(ProductRecord::new(sku_id, product_id, name, url, pricing).with_image(json_string(item.get("ImageUrl"))))
    }
}

#[async_trait]
impl SourceAdapter for SearchApiAdapter {
    fn name(&self) -> &str {
        "search_api"
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<SourcePage> {
        if page <= 1 {
            let markup = self.client.get_text(&self.main_page_url, &[]).await?;
            return Ok(SourcePage::new(self.parse_results_page(&markup), true));
        }
        let body = self.client.post_json(&self.api_url, &self.payload_for(page)).await?;
        self.parse_api_page(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;

    fn adapter() -> SearchApiAdapter {
        let config: SearchApiConfig = serde_json::from_value(json!({
            "main_page_url": "https://shop.test/en/search?keywords=arcteryx",
            "api_url": "https://shop.test/api/search",
            "payload_template": {"Keywords": "arcteryx", "Page": 1, "StartIndex": 0},
        }))
        .unwrap();
        let client = HttpClient::with_config(&HttpClientConfig::default()).unwrap();
        SearchApiAdapter::new(client, &config, "https://shop.test".into(), 24).unwrap()
    }

    #[test]
    fn results_page_tiles() {
        let markup = r#"
            <div class="product-tile" data-product-id="P-1">
              <a class="product-tile-media" href="/en/p/beta-jacket/V-11"><img class="img-fluid" src="/img/b.jpg"></a>
              <a data-qa="search-product-title">Beta Jacket</a>
              <span data-qa="search-product-price">$1,099.99</span>
            </div>
            <div class="product-tile" data-product-id="P-2">
              <a class="product-tile-media" href="atom"></a>
              <a data-qa="search-product-title">Atom Hoody</a>
              <span data-qa="search-product-price">$300.00</span>
            </div>
            <div class="product-tile" data-product-id="P-3">
              <a data-qa="search-product-title">No link</a>
            </div>"#;

        let items = adapter().parse_results_page(markup);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sku_id, "V-11");
        assert_eq!(items[0].product_id, "P-1");
        assert_eq!(items[0].list_price, 1099.99);
        assert_eq!(items[0].sale_price, 1099.99);
        assert_eq!(items[0].discount_percentage, 0);
        assert_eq!(items[1].sku_id, "P-2");
    }

    #[test]
    fn payload_sets_page_and_offset() {
        let payload = adapter().payload_for(3);
        assert_eq!(payload["Page"], 3);
        assert_eq!(payload["StartIndex"], 48);
        assert_eq!(payload["Keywords"], "arcteryx");
    }

    #[test]
    fn api_page_variants_and_total() {
        let body = json!({"ProductSearchResults": {
            "TotalCount": 57,
            "SearchResults": [
                {
                    "VariantId": "V-21", "ProductId": "P-2", "DisplayName": "Gamma Pant",
                    "Url": "/en/p/gamma/V-21", "ImageUrl": "https://cdn.test/g.jpg",
                    "Pricing": {"ListPrice": 250.0, "Price": 175.0}
                },
                {
                    "VariantId": "V-22", "ProductId": "P-2", "DisplayName": "Gamma Pant",
                    "Url": "/en/p/gamma/V-22", "Pricing": {"ListPrice": 250.0, "Price": null}
                },
                {"ProductId": "P-9"}
            ]
        }});

        let page = adapter().parse_api_page(&body).unwrap();
        assert_eq!(page.total_items, Some(57));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].discount_percentage, 30);
        assert_eq!(page.items[0].url, "https://shop.test/en/p/gamma/V-21");
        assert_eq!(page.items[1].sale_price, 250.0);
        assert_eq!(page.items[1].product_id, "P-2");
    }

    #[test]
    fn api_page_without_results_object_is_malformed() {
        assert!(adapter().parse_api_page(&json!({"Message": "error"})).is_err());
    }
}
