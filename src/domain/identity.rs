//! Record identity
//!
//! Sources that expose a stable SKU or variant id use it directly. The rest get
//! a surrogate id hashed from the canonical product name and a distinguishing
//! attribute (usually the color). A surrogate survives URL changes but follows
//! the name/attribute text: renaming a product upstream yields a new identity.

use std::collections::HashSet;

use crate::domain::product::ProductRecord;

/// Hex length of a surrogate `sku_id`
pub const SKU_DIGEST_LEN: usize = 12;
/// Hex length of a surrogate `product_id`
pub const PRODUCT_DIGEST_LEN: usize = 10;

/// Lowercase, trimmed, internal whitespace collapsed to one space.
pub fn canonical_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Lowercase with whitespace removed and `/` folded to `-`, so
/// `"Black / Heather"` and `"black/heather"` agree.
///
/// Placeholder values such as `"Unknown"` count as no attribute.
pub fn canonical_attribute(attribute: Option<&str>) -> String {
    let Some(raw) = attribute else {
        return String::new();
    };
    let canonical: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == '/' { '-' } else { c })
        .collect::<String>()
        .to_lowercase();

    if canonical == "unknown" { String::new() } else { canonical }
}

fn digest(input: &str, len: usize) -> String {
    let hex = blake3::hash(input.as_bytes()).to_hex();
    hex.as_str()[..len].to_string()
}

/// Surrogate variant id: digest of `"<name>|<attribute>"`.
pub fn surrogate_sku_id(name: &str, attribute: Option<&str>) -> String {
    let key = format!("{}|{}", canonical_name(name), canonical_attribute(attribute));
    digest(&key, SKU_DIGEST_LEN)
}

/// Surrogate product id: digest of the name alone so variants group together.
pub fn surrogate_product_id(name: &str) -> String {
    digest(&canonical_name(name), PRODUCT_DIGEST_LEN)
}

/// Drop repeated `sku_id`s from a fetched batch, keeping the first occurrence.
///
/// Returns the surviving records in their original order and the number of
/// records dropped.
pub fn dedupe_by_sku(records: Vec<ProductRecord>) -> (Vec<ProductRecord>, usize) {
    let before = records.len();
    let mut seen = HashSet::with_capacity(before);
    let unique: Vec<ProductRecord> = records
        .into_iter()
        .filter(|record| seen.insert(record.sku_id.clone()))
        .collect();
    let dropped = before - unique.len();
    (unique, dropped)
}
