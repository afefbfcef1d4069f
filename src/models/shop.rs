use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::store::{parse_timestamp, Fields, WriteMap};

/// Stored field names of a shop document.
pub mod field {
    pub const NAME: &str = "name";
    pub const LAT: &str = "lat";
    pub const LNG: &str = "lng";
    pub const AREA: &str = "area";
    pub const GENRE: &str = "genre";
    pub const ADDRESS: &str = "address";
    pub const BRANDS: &str = "brands";
    pub const INSTAGRAM: &str = "instagram";
    pub const COMMENT: &str = "comment";
    pub const IMAGE_URL: &str = "imageUrl";
    pub const CREATED_AT: &str = "createdAt";
    pub const UPDATED_AT: &str = "updatedAt";
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub area: String,
    pub genre: String,
    pub address: String,
    /// Comma separated, e.g. "CELINE, YSL".
    pub brands: String,
    pub instagram: String,
    pub comment: String,
    pub image_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Shop {
    pub fn brand_list(&self) -> impl Iterator<Item = &str> {
        self.brands.split(',').map(str::trim).filter(|b| !b.is_empty())
    }
}

/// Text form of a raw field; absent, null and structured values read as "".
pub(crate) fn coerce_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| coerce_text(Some(v)))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Some(Value::Null) | Some(Value::Object(_)) | None => String::new(),
    }
}

/// Numeric form of a raw field; anything that does not parse to a finite number is 0.
pub(crate) fn coerce_number(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Builds a typed shop from a raw document. Never fails.
pub fn map_shop(id: &str, raw: &Fields) -> Shop {
    let text = |key: &str| coerce_text(raw.get(key));
    Shop {
        id: id.to_string(),
        name: text(field::NAME),
        lat: coerce_number(raw.get(field::LAT)),
        lng: coerce_number(raw.get(field::LNG)),
        area: text(field::AREA),
        genre: text(field::GENRE),
        address: text(field::ADDRESS),
        brands: text(field::BRANDS),
        instagram: text(field::INSTAGRAM),
        comment: text(field::COMMENT),
        image_url: text(field::IMAGE_URL),
        created_at: raw.get(field::CREATED_AT).and_then(parse_timestamp),
        updated_at: raw.get(field::UPDATED_AT).and_then(parse_timestamp),
    }
}

/// Input of a shop creation. `None` fields are written as unset markers and
/// stripped before the store sees them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewShop {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub area: Option<String>,
    pub genre: Option<String>,
    pub address: Option<String>,
    pub brands: Option<String>,
    pub instagram: Option<String>,
    pub comment: Option<String>,
    pub image_url: Option<String>,
}

impl NewShop {
    pub fn to_write_map(&self) -> WriteMap {
        WriteMap::new()
            .set(field::NAME, self.name.clone())
            .set(field::LAT, self.lat)
            .set(field::LNG, self.lng)
            .set_maybe(field::AREA, self.area.clone())
            .set_maybe(field::GENRE, self.genre.clone())
            .set_maybe(field::ADDRESS, self.address.clone())
            .set_maybe(field::BRANDS, self.brands.clone())
            .set_maybe(field::INSTAGRAM, self.instagram.clone())
            .set_maybe(field::COMMENT, self.comment.clone())
            .set_maybe(field::IMAGE_URL, self.image_url.clone())
    }
}

/// Partial update: `None` leaves a field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShopPatch {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub area: Option<Option<String>>,
    pub genre: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub brands: Option<Option<String>>,
    pub instagram: Option<Option<String>>,
    pub comment: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
}

fn patch_text(map: WriteMap, key: &str, value: &Option<Option<String>>) -> WriteMap {
    match value {
        None => map,
        Some(None) => map.clear(key),
        Some(Some(v)) => map.set(key, v.clone()),
    }
}

impl ShopPatch {
    pub fn to_write_map(&self) -> WriteMap {
        let map = WriteMap::new()
            .set_opt(field::NAME, self.name.clone())
            .set_opt(field::LAT, self.lat)
            .set_opt(field::LNG, self.lng);
        let map = patch_text(map, field::AREA, &self.area);
        let map = patch_text(map, field::GENRE, &self.genre);
        let map = patch_text(map, field::ADDRESS, &self.address);
        let map = patch_text(map, field::BRANDS, &self.brands);
        let map = patch_text(map, field::INSTAGRAM, &self.instagram);
        let map = patch_text(map, field::COMMENT, &self.comment);
        patch_text(map, field::IMAGE_URL, &self.image_url)
    }
}
