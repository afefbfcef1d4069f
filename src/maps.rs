//! Destination links for handing a shop off to an external map app.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Walking,
    Driving,
    Transit,
}

impl TravelMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TravelMode::Walking => "walking",
            TravelMode::Driving => "driving",
            TravelMode::Transit => "transit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// The app deep links per platform plus the browser fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapLinks {
    pub ios_app: String,
    pub android_app: String,
    pub web: String,
}

pub fn directions_links(
    dest: LatLng,
    name: Option<&str>,
    mode: TravelMode,
) -> Result<MapLinks, AppError> {
    if !dest.lat.is_finite() || !dest.lng.is_finite() {
        return Err(AppError::validation("Destination has no usable coordinates"));
    }
    let coords = format!("{},{}", dest.lat, dest.lng);
    let label = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(&coords);
    let q = urlencoding::encode(label);
    let mode = mode.as_str();

    Ok(MapLinks {
        ios_app: format!("comgooglemaps://?daddr={coords}&directionsmode={mode}"),
        android_app: format!("google.navigation:q={coords}"),
        web: format!(
            "https://www.google.com/maps/dir/?api=1&destination={coords}&travelmode={mode}&query={q}"
        ),
    })
}

pub fn search_links(query: &str) -> Result<MapLinks, AppError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::validation("Search query is empty"));
    }
    let q = urlencoding::encode(query);
    Ok(MapLinks {
        ios_app: format!("comgooglemaps://?q={q}"),
        android_app: format!("geo:0,0?q={q}"),
        web: format!("https://www.google.com/maps/search/?api=1&query={q}"),
    })
}
