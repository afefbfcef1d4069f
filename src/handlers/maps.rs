use axum::{body::Bytes, extract::{Path, Query, State}, Json};
use axum::http::StatusCode;
use crate::state::AppState;
use crate::error::AppError;
use crate::dtos::maps::{DirectionsQuery, ImageUploadResponse, MapSearchQuery};
use crate::maps::{directions_links, search_links, LatLng, MapLinks};
use tracing::{info, instrument};

// GET /shops/{id}/directions?mode= - Deep links to the shop
#[instrument(skip(state))]
pub async fn shop_directions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DirectionsQuery>,
) -> Result<Json<MapLinks>, AppError> {
    let shop = state
        .shops
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Shop not found"))?;

    let dest = LatLng { lat: shop.lat, lng: shop.lng };
    let links = directions_links(dest, Some(&shop.name), params.mode.unwrap_or_default())?;
    Ok(Json(links))
}

// GET /maps/search?q=
pub async fn map_search(Query(params): Query<MapSearchQuery>) -> Result<Json<MapLinks>, AppError> {
    Ok(Json(search_links(&params.q)?))
}

// POST /images - Store a shop photo (admin)
#[instrument(skip(state, body), fields(size = body.len()))]
pub async fn upload_image(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ImageUploadResponse>), AppError> {
    let url = state.blobs.upload_image(&body).await?;
    info!(%url, "Image uploaded");
    Ok((StatusCode::CREATED, Json(ImageUploadResponse { url })))
}
