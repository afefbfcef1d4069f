use axum::{extract::{Path, State}, Json};
use axum::http::StatusCode;
use crate::state::AppState;
use crate::error::AppError;
use crate::dtos::review::{CreateReviewRequest, CreatedResponse, ReviewResponse};
use tracing::{info, instrument};

// GET /shops/{id}/reviews - Newest first
#[instrument(skip(state))]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
) -> Result<Json<Vec<ReviewResponse>>, AppError> {
    let reviews = state.reviews.list(&shop_id).await?;
    Ok(Json(reviews.into_iter().map(ReviewResponse::from).collect()))
}

// POST /shops/{id}/reviews - Post a rating
#[instrument(skip(state, req))]
pub async fn create_review(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Json(req): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let input = req.into_new_review()?;

    // reviews hang off an existing shop
    if state.shops.get_by_id(&shop_id).await?.is_none() {
        return Err(AppError::not_found("Shop not found"));
    }

    let id = state.reviews.add(&shop_id, &input).await?;
    info!(%shop_id, %id, rating = input.rating, "Review posted");
    Ok((StatusCode::CREATED, Json(CreatedResponse { id })))
}

// DELETE /shops/{id}/reviews/{review_id}
#[instrument(skip(state))]
pub async fn delete_review(
    State(state): State<AppState>,
    Path((shop_id, review_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.reviews.remove(&shop_id, &review_id).await?;
    info!(%shop_id, %review_id, "Review deleted");
    Ok(StatusCode::NO_CONTENT)
}
