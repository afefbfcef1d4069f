use serde::{Deserialize, Serialize};

use crate::maps::TravelMode;

#[derive(Debug, Default, Deserialize)]
pub struct DirectionsQuery {
    pub mode: Option<TravelMode>,
}

#[derive(Debug, Deserialize)]
pub struct MapSearchQuery {
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct ImageUploadResponse {
    pub url: String,
}
