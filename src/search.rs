//! Client-side shop search: normalized substring match over a fixed field set.

use std::sync::Arc;

use serde::Deserialize;

use crate::models::shop::Shop;

// Joins haystack fields. A normalized query never contains it, so a match
// can not straddle two fields.
const FIELD_SEPARATOR: &str = "\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchFields {
    /// name, area, genre, address, brands
    #[default]
    Standard,
    /// standard fields plus instagram and comment
    Extended,
}

/// Lower-cases, trims and collapses whitespace runs to one space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn haystack(shop: &Shop, fields: SearchFields) -> String {
    let mut parts = vec![
        shop.name.as_str(),
        shop.area.as_str(),
        shop.genre.as_str(),
        shop.address.as_str(),
    ];
    parts.extend(shop.brand_list());
    if fields == SearchFields::Extended {
        parts.push(shop.instagram.as_str());
        parts.push(shop.comment.as_str());
    }
    parts
        .into_iter()
        .map(normalize)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(FIELD_SEPARATOR)
}

/// Whether `shop` matches an already normalized, non-empty query.
pub fn matches(shop: &Shop, normalized_query: &str, fields: SearchFields) -> bool {
    haystack(shop, fields).contains(normalized_query)
}

/// Filters `shops` by `query`, keeping input order.
///
/// A blank query returns the very same list.
pub fn filter(shops: &Arc<[Shop]>, query: &str, fields: SearchFields) -> Arc<[Shop]> {
    let q = normalize(query);
    if q.is_empty() {
        return shops.clone();
    }
    shops
        .iter()
        .filter(|s| matches(s, &q, fields))
        .cloned()
        .collect()
}

/// Result of one search over the current list.
#[derive(Debug, Clone)]
pub struct ShopSearch {
    pub query: String,
    pub total: usize,
    pub count: usize,
    pub shops: Arc<[Shop]>,
}

pub fn search(shops: &Arc<[Shop]>, query: &str, fields: SearchFields) -> ShopSearch {
    let filtered = filter(shops, query, fields);
    ShopSearch {
        query: normalize(query),
        total: shops.len(),
        count: filtered.len(),
        shops: filtered,
    }
}
