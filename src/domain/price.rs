//! Price normalization
//!
//! Turns the price text and values the upstream catalogs emit
//! (`"$1,100.00"`, `"1 100,00 $"`, `"CA$49.99"`, `["129.00"]`, `89.5`)
//! into plain amounts plus a derived discount percentage.
//!
//! Nothing in here fails: text that cannot be read as a number is worth 0.0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// List/sale amounts of one record together with the derived discount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub list_price: f64,
    pub sale_price: f64,
    pub discount_percentage: u8,
}

impl Pricing {
    /// Build pricing from optional amounts.
    ///
    /// A missing (or zero) sale price falls back to the list price, and a
    /// missing list price falls back to the sale price.
    pub fn from_amounts(list: Option<f64>, sale: Option<f64>) -> Self {
        let list = list.filter(|v| v.is_finite() && *v > 0.0);
        let sale = sale.filter(|v| v.is_finite() && *v > 0.0);

        let (list_price, sale_price) = match (list, sale) {
            (Some(l), Some(s)) => (l, s),
            (Some(l), None) => (l, l),
            (None, Some(s)) => (s, s),
            (None, None) => (0.0, 0.0),
        };

        Self {
            list_price,
            sale_price,
            discount_percentage: discount_percentage(list_price, sale_price),
        }
    }

    /// Same as [`Pricing::from_amounts`] for raw price text.
    pub fn from_text(list: Option<&str>, sale: Option<&str>) -> Self {
        Self::from_amounts(list.map(parse_amount), sale.map(parse_amount))
    }

    /// Same as [`Pricing::from_amounts`] for JSON price values.
    pub fn from_json(list: Option<&Value>, sale: Option<&Value>) -> Self {
        Self::from_amounts(list.and_then(amount_from_json), sale.and_then(amount_from_json))
    }
}

/// `round((1 - sale/list) * 100)` when the list price is positive and above
/// the sale price, otherwise 0.
pub fn discount_percentage(list_price: f64, sale_price: f64) -> u8 {
    if list_price > 0.0 && list_price > sale_price {
        let pct = ((1.0 - sale_price / list_price) * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

/// Parse a localized price string into an amount.
///
/// Currency symbols, letters and whitespace (including the non-breaking
/// space used as a thousands separator) are dropped. When both `,` and `.`
/// appear, the right-most one is the decimal separator. A lone separator kind
/// followed by exactly three digits is a thousands separator, unless the
/// integer part is zero.
pub fn parse_amount(text: &str) -> f64 {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let Some(split_at) = kept.rfind([',', '.']) else {
        return kept.parse::<f64>().map_or(0.0, f64::abs);
    };

    let (int_part, frac_part) = kept.split_at(split_at);
    let frac_part = frac_part.trim_start_matches([',', '.']);
    let mixed = kept.contains(',') && kept.contains('.');
    let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
    // "0.125" has no thousands to group
    let zero_int = int_digits.chars().all(|c| c == '0');
    let is_decimal = mixed || zero_int || frac_part.len() != 3;

    let normalized = if is_decimal {
        format!("{int_digits}.{frac_part}")
    } else {
        format!("{int_digits}{frac_part}")
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite()).map_or(0.0, f64::abs)
}

/// Read an amount out of a JSON value: a number, a numeric string, or an
/// array whose first element is one of those.
pub fn amount_from_json(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(parse_amount(s)),
        Value::Array(items) => items.first().and_then(amount_from_json),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("$1,100.00", 1100.00)]
    #[case("1 100,00 $", 1100.00)]
    #[case("1\u{a0}100,00\u{a0}$", 1100.00)]
    #[case("CA$49.99", 49.99)]
    #[case("$ 1,234,567.89", 1_234_567.89)]
    #[case("1.234,56 €", 1234.56)]
    #[case("1,100", 1100.0)]
    #[case("0.125", 0.125)]
    #[case("$0,750", 0.75)]
    #[case("12,5", 12.5)]
    #[case("89.", 89.0)]
    #[case("129", 129.0)]
    #[case("Call for price", 0.0)]
    #[case("", 0.0)]
    fn parses_localized_prices(#[case] text: &str, #[case] expected: f64) {
        let amount = parse_amount(text);
        assert!((amount - expected).abs() < 1e-9, "{text:?} -> {amount}, expected {expected}");
    }

    #[test]
    fn discount_is_rounded_and_only_for_real_markdowns() {
        assert_eq!(discount_percentage(200.0, 50.0), 75);
        assert_eq!(discount_percentage(300.0, 199.99), 33);
        assert_eq!(discount_percentage(100.0, 100.0), 0);
        assert_eq!(discount_percentage(80.0, 100.0), 0);
        assert_eq!(discount_percentage(0.0, 0.0), 0);
    }

    #[test]
    fn missing_sale_price_means_no_discount() {
        let pricing = Pricing::from_text(Some("$250.00"), None);
        assert_eq!(pricing.sale_price, 250.0);
        assert_eq!(pricing.discount_percentage, 0);

        let unparseable_sale = Pricing::from_text(Some("$250.00"), Some("N/A"));
        assert_eq!(unparseable_sale.sale_price, 250.0);
    }

    #[test]
    fn missing_list_price_falls_back_to_sale() {
        let pricing = Pricing::from_amounts(None, Some(80.0));
        assert_eq!(pricing.list_price, 80.0);
        assert_eq!(pricing.discount_percentage, 0);
    }

    #[test]
    fn json_amounts() {
        assert_eq!(amount_from_json(&json!(89.5)), Some(89.5));
        assert_eq!(amount_from_json(&json!("$1,100.00")), Some(1100.0));
        assert_eq!(amount_from_json(&json!(["129.00", "99.00"])), Some(129.0));
        assert_eq!(amount_from_json(&json!(null)), None);
        assert_eq!(amount_from_json(&json!("  ")), None);

        let pricing = Pricing::from_json(Some(&json!([200])), Some(&json!("50")));
        assert_eq!(pricing.discount_percentage, 75);
    }

    proptest! {
        #[test]
        fn parse_never_negative_or_nan(text in "\\PC{0,24}") {
            let amount = parse_amount(&text);
            prop_assert!(amount.is_finite());
            prop_assert!(amount >= 0.0);
        }

        #[test]
        fn discount_stays_in_range(list in 0.0f64..10_000.0, sale in 0.0f64..10_000.0) {
            let pct = discount_percentage(list, sale);
            prop_assert!(pct <= 100);
        }
    }
}
