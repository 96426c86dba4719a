//! Markup and JSON extraction helpers shared by the source adapters
//!
//! Selectors come from site configuration, so they are compiled once when an
//! adapter is built and a bad selector surfaces as
//! [`SourceError::InvalidSelector`] instead of a silent empty page.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use url::Url;

use crate::domain::errors::{SourceError, SourceResult};

/// Compile one CSS selector from configuration.
pub fn compile_selector(selector: &str) -> SourceResult<Selector> {
    Selector::parse(selector).map_err(|e| SourceError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

pub fn parse_document(markup: &str) -> Html {
    Html::parse_document(markup)
}

pub fn parse_fragment(markup: &str) -> Html {
    Html::parse_fragment(markup)
}

/// Visible text of an element, whitespace collapsed.
pub fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of the first descendant matching `selector`, if non-empty.
pub fn first_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    element
        .select(selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Attribute of the first descendant matching `selector`, if non-empty.
pub fn first_attr(element: ElementRef<'_>, selector: &Selector, attribute: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attribute))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Non-empty attribute of the element itself.
pub fn own_attr(element: ElementRef<'_>, attribute: &str) -> Option<String> {
    element
        .value()
        .attr(attribute)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Image source of the first matching `img`, lazy-load attribute as fallback.
pub fn first_image(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
    first_attr(element, selector, "src").or_else(|| first_attr(element, selector, "data-src"))
}

/// Resolve `href` against `base`.
///
/// Absolute links pass through; an unparseable base degrades to plain
/// concatenation.
pub fn resolve_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("//") {
        return format!("https:{href}");
    }
    if let Ok(absolute) = Url::parse(href) {
        return absolute.to_string();
    }
    match Url::parse(base).and_then(|base| base.join(href)) {
        Ok(joined) => joined.to_string(),
        Err(_) if href.starts_with('/') => format!("{}{}", base.trim_end_matches('/'), href),
        Err(_) if base.is_empty() => href.to_string(),
        Err(_) => format!("{}/{}", base.trim_end_matches('/'), href),
    }
}

/// Drop the query string and fragment of a URL.
pub fn strip_query(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// A JSON value as a non-empty string; numbers are stringified.
pub fn json_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn invalid_selector_is_reported() {
        let err = compile_selector("div[").unwrap_err();
        assert!(matches!(err, SourceError::InvalidSelector { ref selector, .. } if selector == "div["));
    }

    #[test]
    fn text_and_attributes() {
        let doc = parse_fragment(
            r#"<div class="tile" data-id=" 42 "><span class="name">  Beta
                 Jacket </span><img src="" data-src="/img/b.jpg"></div>"#,
        );
        let tile = doc.select(&compile_selector("div.tile").unwrap()).next().unwrap();

        assert_eq!(first_text(tile, &compile_selector("span.name").unwrap()).as_deref(), Some("Beta Jacket"));
        assert_eq!(own_attr(tile, "data-id").as_deref(), Some("42"));
        assert_eq!(first_image(tile, &compile_selector("img").unwrap()).as_deref(), Some("/img/b.jpg"));
        assert_eq!(first_text(tile, &compile_selector("span.price").unwrap()), None);
    }

    #[rstest]
    #[case("https://shop.test/en/", "/p/1", "https://shop.test/p/1")]
    #[case("https://shop.test/en/", "p/1", "https://shop.test/en/p/1")]
    #[case("https://shop.test", "https://cdn.test/a.jpg", "https://cdn.test/a.jpg")]
    #[case("https://shop.test", "//cdn.test/a.jpg", "https://cdn.test/a.jpg")]
    #[case("", "/p/1", "/p/1")]
    fn resolves_urls(#[case] base: &str, #[case] href: &str, #[case] expected: &str) {
        assert_eq!(resolve_url(base, href), expected);
    }

    #[test]
    fn strips_query_and_fragment() {
        assert_eq!(strip_query("https://shop.test/a.jpg?w=300#top"), "https://shop.test/a.jpg");
        assert_eq!(strip_query("https://shop.test/a"), "https://shop.test/a");
    }

    #[test]
    fn json_strings_accept_numbers() {
        assert_eq!(json_string(Some(&json!(12345))).as_deref(), Some("12345"));
        assert_eq!(json_string(Some(&json!(" v1 "))).as_deref(), Some("v1"));
        assert_eq!(json_string(Some(&json!(""))), None);
        assert_eq!(json_string(None), None);
    }
}
