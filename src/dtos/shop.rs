use serde::{Deserialize, Deserializer, Serialize};
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::feed::{FeedStatus, FeedView};
use crate::models::shop::{NewShop, Shop, ShopPatch};
use crate::search::{SearchFields, ShopSearch};

/// Absent key -> `None`, explicit `null` -> `Some(None)`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn trimmed_patch(value: Option<Option<String>>) -> Option<Option<String>> {
    value.map(trimmed)
}

fn require_finite(value: f64, name: &str) -> Result<f64, AppError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AppError::validation(format!("{name} must be a finite number")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopRequest {
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

impl CreateShopRequest {
    /// Validates required fields; blank optional fields are dropped.
    pub fn into_new_shop(self) -> Result<NewShop, AppError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Shop name is required"));
        }
        Ok(NewShop {
            name,
            lat: require_finite(self.lat, "lat")?,
            lng: require_finite(self.lng, "lng")?,
            area: trimmed(self.area),
            genre: trimmed(self.genre),
            address: trimmed(self.address),
            brands: trimmed(self.brands),
            instagram: trimmed(self.instagram),
            comment: trimmed(self.comment),
            image_url: trimmed(self.image_url),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShopRequest {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    #[serde(default, deserialize_with = "double_option")]
    pub area: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub genre: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub address: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub brands: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub instagram: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub comment: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
}

impl UpdateShopRequest {
    /// Blank strings clear the field, like an explicit `null`.
    pub fn into_patch(self) -> Result<ShopPatch, AppError> {
        let name = match self.name {
            Some(n) if n.trim().is_empty() => {
                return Err(AppError::validation("Shop name cannot be empty"))
            }
            Some(n) => Some(n.trim().to_string()),
            None => None,
        };
        Ok(ShopPatch {
            name,
            lat: self.lat.map(|v| require_finite(v, "lat")).transpose()?,
            lng: self.lng.map(|v| require_finite(v, "lng")).transpose()?,
            area: trimmed_patch(self.area),
            genre: trimmed_patch(self.genre),
            address: trimmed_patch(self.address),
            brands: trimmed_patch(self.brands),
            instagram: trimmed_patch(self.instagram),
            comment: trimmed_patch(self.comment),
            image_url: trimmed_patch(self.image_url),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ShopSearchQuery {
    pub q: Option<String>,
    pub fields: Option<SearchFields>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopResponse {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub area: String,
    pub genre: String,
    pub address: String,
    pub brands: String,
    pub instagram: String,
    pub comment: String,
    pub image_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Shop> for ShopResponse {
    fn from(s: &Shop) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            lat: s.lat,
            lng: s.lng,
            area: s.area.clone(),
            genre: s.genre.clone(),
            address: s.address.clone(),
            brands: s.brands.clone(),
            instagram: s.instagram.clone(),
            comment: s.comment.clone(),
            image_url: s.image_url.clone(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub status: FeedStatus,
    pub error: Option<String>,
    pub loading: bool,
    pub total: usize,
}

impl From<&FeedView> for FeedResponse {
    fn from(v: &FeedView) -> Self {
        Self {
            status: v.status,
            error: v.error.clone(),
            loading: v.loading,
            total: v.shops.len(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ShopListResponse {
    pub query: String,
    pub total: usize,
    pub count: usize,
    pub feed: FeedResponse,
    pub shops: Vec<ShopResponse>,
}

impl ShopListResponse {
    pub fn new(search: &ShopSearch, view: &FeedView) -> Self {
        Self {
            query: search.query.clone(),
            total: search.total,
            count: search.count,
            feed: FeedResponse::from(view),
            shops: search.shops.iter().map(ShopResponse::from).collect(),
        }
    }
}
