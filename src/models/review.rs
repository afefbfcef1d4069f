use chrono::{DateTime, Utc};
use serde_json::Value;

use super::shop::coerce_text;
use crate::store::{parse_timestamp, Fields, WriteMap};

pub mod field {
    pub const RATING: &str = "rating";
    pub const TEXT: &str = "text";
    pub const CREATED_AT: &str = "createdAt";
}

/// Rating used when a stored review carries none.
pub const DEFAULT_RATING: i64 = 5;
pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    pub id: String,
    pub shop_id: String,
    pub rating: i64,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

fn coerce_rating(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(DEFAULT_RATING),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(DEFAULT_RATING),
        _ => DEFAULT_RATING,
    }
}

pub fn map_review(id: &str, shop_id: &str, raw: &Fields) -> Review {
    Review {
        id: id.to_string(),
        shop_id: shop_id.to_string(),
        rating: coerce_rating(raw.get(field::RATING)),
        text: coerce_text(raw.get(field::TEXT)),
        created_at: raw.get(field::CREATED_AT).and_then(parse_timestamp),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub rating: i64,
    pub text: Option<String>,
}

impl NewReview {
    pub fn to_write_map(&self) -> WriteMap {
        WriteMap::new()
            .set(field::RATING, self.rating)
            .set_maybe(field::TEXT, self.text.clone())
            .server_timestamp(field::CREATED_AT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{strip_unset, FieldWrite};
    use serde_json::json;

    fn raw(v: Value) -> Fields {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let review = map_review("r1", "S1", &Fields::new());
        assert_eq!(review.rating, DEFAULT_RATING);
        assert_eq!(review.text, "");
        assert_eq!(review.shop_id, "S1");
        assert!(review.created_at.is_none());
    }

    #[test]
    fn stored_values_pass_through() {
        let review = map_review(
            "r1",
            "S1",
            &raw(json!({"rating": 4, "text": "Good", "createdAt": "2024-05-01T10:00:00.000000Z"})),
        );
        assert_eq!(review.rating, 4);
        assert_eq!(review.text, "Good");
        assert!(review.created_at.is_some());
    }

    #[test]
    fn rating_is_coerced_to_an_integer() {
        assert_eq!(map_review("r", "s", &raw(json!({"rating": 3.7}))).rating, 3);
        assert_eq!(map_review("r", "s", &raw(json!({"rating": "2"}))).rating, 2);
        assert_eq!(map_review("r", "s", &raw(json!({"rating": "lots"}))).rating, 5);
    }

    #[test]
    fn new_review_is_stamped_by_the_store() {
        let map = strip_unset(NewReview { rating: 4, text: None }.to_write_map());
        assert_eq!(map.get(field::CREATED_AT), Some(&FieldWrite::ServerTimestamp));
        assert!(!map.contains_key(field::TEXT));
    }
}
