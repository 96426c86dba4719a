//! JSON listing API queried with a POSTed payload per page

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::domain::errors::{SourceError, SourceResult};
use crate::domain::price::{Pricing, amount_from_json};
use crate::domain::product::ProductRecord;
use crate::domain::services::{SourceAdapter, SourcePage};
use crate::infrastructure::config::GraphqlListingConfig;
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::parsing::{json_string, resolve_url};

pub struct GraphqlListingAdapter {
    client: HttpClient,
    config: GraphqlListingConfig,
    base_url: String,
}

impl GraphqlListingAdapter {
    pub const fn new(client: HttpClient, config: GraphqlListingConfig, base_url: String) -> Self {
        Self {
            client,
            config,
            base_url,
        }
    }

    /// The configured template with `variables.page` set.
    fn payload_for(&self, page: u32) -> Value {
        let mut payload = match &self.config.payload_template {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        let variables = payload.entry("variables").or_insert_with(|| json!({}));
        if !variables.is_object() {
            *variables = json!({});
        }
        if let Some(variables) = variables.as_object_mut() {
            variables.insert("page".to_string(), json!(page));
        }
        Value::Object(payload)
    }

    fn parse_products(&self, body: &Value) -> SourceResult<Vec<ProductRecord>> {
        let items = body
            .pointer(&self.config.products_pointer)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SourceError::parse(
                    &self.config.api_url,
                    format!("no product array at '{}'", self.config.products_pointer),
                )
            })?;

        Ok(items.iter().filter_map(|item| self.parse_item(item)).collect())
    }

    fn parse_item(&self, item: &Value) -> Option<ProductRecord> {
        let Some(id) = json_string(item.get("productId")) else {
            debug!("Skipping listing item without productId");
            return None;
        };
        let name = json_string(item.get("displayName")).unwrap_or_else(|| id.clone());

        let mut url = match json_string(item.get("pdpUrl")) {
            Some(path) if !self.base_url.is_empty() => resolve_url(&self.base_url, &path),
            Some(path) => path,
            None => String::new(),
        };
        if let Some(suffix) = &self.config.url_suffix {
            url.push_str(suffix);
        }

        let list = item.get("listPrice").and_then(amount_from_json);
        let sale = item
            .get("productSalePrice")
            .and_then(amount_from_json)
            .filter(|amount| *amount > 0.0)
            .or_else(|| item.get("salePrice").and_then(amount_from_json));
        let image = json_string(item.pointer("/swatches/0/primaryImage"));

        Some(ProductRecord::new(id.clone(), id, name, url, Pricing::from_amounts(list, sale)).with_image(image))
    }
}

#[async_trait]
impl SourceAdapter for GraphqlListingAdapter {
    fn name(&self) -> &str {
        "graphql_listing"
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<SourcePage> {
        let body = self.client.post_json(&self.config.api_url, &self.payload_for(page)).await?;
        let items = self.parse_products(&body)?;
        Ok(SourcePage::new(items, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;

    fn adapter(template: Value, suffix: Option<&str>) -> GraphqlListingAdapter {
        let config: GraphqlListingConfig = serde_json::from_value(json!({
            "api_url": "https://shop.test/graphql",
            "payload_template": template,
            "url_suffix": suffix,
        }))
        .unwrap();
        let client = HttpClient::with_config(&HttpClientConfig::default()).unwrap();
        GraphqlListingAdapter::new(client, config, "https://shop.test".into())
    }

    #[test]
    fn page_is_written_into_variables() {
        let adapter = adapter(json!({"query": "q", "variables": {"slug": "arcteryx", "page": 1}}), None);
        let payload = adapter.payload_for(3);

        assert_eq!(payload["variables"]["page"], 3);
        assert_eq!(payload["variables"]["slug"], "arcteryx");
        assert_eq!(payload["query"], "q");
    }

    #[test]
    fn template_without_variables_gets_them() {
        let adapter = adapter(Value::Null, None);
        assert_eq!(adapter.payload_for(2), json!({"variables": {"page": 2}}));
    }

    #[test]
    fn parses_products() {
        let adapter = adapter(json!({}), Some("?lang=en"));
        let body = json!({"data": {"categoryPageData": {"products": [
            {
                "productId": "P100", "displayName": "Beta Jacket", "pdpUrl": "/p/beta",
                "listPrice": ["CA$500.00"], "productSalePrice": "", "salePrice": "400.00",
                "swatches": [{"primaryImage": "https://cdn.test/beta.jpg"}]
            },
            {"productId": 200, "displayName": "Atom Hoody", "listPrice": 300},
            {"displayName": "No id"}
        ]}}});

        let items = adapter.parse_products(&body).unwrap();
        assert_eq!(items.len(), 2);

        let beta = &items[0];
        assert_eq!(beta.sku_id, "P100");
        assert_eq!(beta.product_id, "P100");
        assert_eq!(beta.url, "https://shop.test/p/beta?lang=en");
        assert_eq!(beta.list_price, 500.0);
        assert_eq!(beta.sale_price, 400.0);
        assert_eq!(beta.discount_percentage, 20);
        assert_eq!(beta.image_url.as_deref(), Some("https://cdn.test/beta.jpg"));

        let atom = &items[1];
        assert_eq!(atom.sku_id, "200");
        assert_eq!(atom.sale_price, 300.0);
        assert_eq!(atom.discount_percentage, 0);
    }

    #[test]
    fn empty_product_array_is_an_empty_page() {
        let adapter = adapter(json!({}), None);
        let body = json!({"data": {"categoryPageData": {"products": []}}});
        assert!(adapter.parse_products(&body).unwrap().is_empty());
    }

    #[test]
    fn missing_product_array_is_a_parse_error() {
        let adapter = adapter(json!({}), None);
        let err = adapter.parse_products(&json!({"errors": ["boom"]})).unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }
}
