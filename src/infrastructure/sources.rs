//! Source adapters, one per upstream catalog shape
//!
//! Every adapter maps provider pages onto [`SourcePage`]s of normalized
//! [`ProductRecord`](crate::domain::product::ProductRecord)s. They know how to
//! fetch and read a single page; stopping, retrying and pacing belong to the
//! pager.

pub mod graphql_listing;
pub mod html_listing;
pub mod paged_markup_api;
pub mod rendered_tiles;
pub mod rendered_variants;
pub mod search_api;

pub use graphql_listing::GraphqlListingAdapter;
pub use html_listing::HtmlListingAdapter;
pub use paged_markup_api::PagedMarkupAdapter;
pub use rendered_tiles::RenderedTilesAdapter;
pub use rendered_variants::RenderedVariantsAdapter;
pub use search_api::SearchApiAdapter;

use tracing::info;

use crate::domain::errors::SourceResult;
use crate::domain::services::SourceAdapter;
use crate::infrastructure::config::{SiteConfig, SourceConfig};
use crate::infrastructure::http_client::HttpClient;
use crate::infrastructure::renderer::build_renderer;

/// Build the adapter a site's `source.kind` asks for.
///
/// Fails when a configured selector does not compile.
pub fn build_adapter(site: &SiteConfig, client: HttpClient) -> SourceResult<Box<dyn SourceAdapter>> {
    let base_url = site.base_url.clone();
    let page_size = site.run.page_size;
    info!("🔌 Source '{}' for {}", site.source.kind(), site.site_name);

    let adapter: Box<dyn SourceAdapter> = match &site.source {
        SourceConfig::GraphqlListing(config) => Box::new(GraphqlListingAdapter::new(client, config.clone(), base_url)),
        SourceConfig::HtmlListing(config) => Box::new(HtmlListingAdapter::new(client, config, base_url)?),
        SourceConfig::PagedMarkupApi(config) => {
            Box::new(PagedMarkupAdapter::new(client, config, base_url, page_size)?)
        }
        SourceConfig::SearchApi(config) => Box::new(SearchApiAdapter::new(client, config, base_url, page_size)?),
        SourceConfig::RenderedVariants(config) => {
            let renderer = build_renderer(&config.renderer, client);
            Box::new(RenderedVariantsAdapter::new(renderer, config, base_url)?)
        }
        SourceConfig::RenderedTiles(config) => {
            let renderer = build_renderer(&config.renderer, client);
            Box::new(RenderedTilesAdapter::new(renderer, config, base_url)?)
        }
    };
    Ok(adapter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::HttpClientConfig;

    fn site(source: serde_json::Value) -> SiteConfig {
        serde_json::from_value(serde_json::json!({
            "site_name": "Shop",
            "base_url": "https://shop.test",
            "source": source,
        }))
        .unwrap()
    }

    fn client() -> HttpClient {
        HttpClient::with_config(&HttpClientConfig::default()).unwrap()
    }

    #[test]
    fn builds_adapter_per_kind() {
        let cases = [
            (serde_json::json!({"kind": "graphql_listing", "api_url": "https://shop.test/graphql"}), "graphql_listing"),
            (serde_json::json!({"kind": "html_listing", "page_url": "https://shop.test/c"}), "html_listing"),
            (serde_json::json!({"kind": "paged_markup_api", "listing_url": "https://shop.test/c"}), "paged_markup_api"),
            (
                serde_json::json!({"kind": "search_api", "main_page_url": "https://shop.test/s", "api_url": "https://shop.test/api"}),
                "search_api",
            ),
            (serde_json::json!({"kind": "rendered_variants", "main_page_url": "https://shop.test/c"}), "rendered_variants"),
            (serde_json::json!({"kind": "rendered_tiles", "search_url": "https://shop.test/s?q=a"}), "rendered_tiles"),
        ];

        for (source, expected) in cases {
            let adapter = build_adapter(&site(source), client()).unwrap();
            assert_eq!(adapter.name(), expected);
        }
    }

    #[test]
    fn bad_selector_fails_the_build() {
        let site = site(serde_json::json!({
            "kind": "html_listing",
            "page_url": "https://shop.test/c",
            "selectors": {"tile": "div["},
        }));
        assert!(build_adapter(&site, client()).is_err());
    }
}
