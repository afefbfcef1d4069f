use axum::{extract::{Path, Query, State}, Json, Extension};
use axum::http::StatusCode;
use crate::state::AppState;
use crate::error::AppError;
use crate::dtos::shop::{
    CreateShopRequest, UpdateShopRequest, ShopResponse, ShopListResponse, ShopSearchQuery,
    FeedResponse,
};
use crate::middleware::auth::AuthContext;
use crate::search::search;
use tracing::{error, info, instrument};

// GET /shops?q=&fields= - Search the live shop list
#[instrument(skip(state))]
pub async fn list_shops(
    State(state): State<AppState>,
    Query(params): Query<ShopSearchQuery>,
) -> Json<ShopListResponse> {
    let view = state.feed.current();
    let result = search(
        &view.shops,
        params.q.as_deref().unwrap_or_default(),
        params.fields.unwrap_or_default(),
    );
    Json(ShopListResponse::new(&result, &view))
}

// POST /shops/refresh - Resync the live list without waiting for a push
#[instrument(skip(state))]
pub async fn refresh_shops(
    State(state): State<AppState>,
) -> Result<Json<ShopListResponse>, AppError> {
    let shops = state.feed.refresh().await.map_err(|e| {
        error!(?e, "Failed to refresh shops");
        e
    })?;
    let result = search(&shops, "", Default::default());
    Ok(Json(ShopListResponse::new(&result, &state.feed.current())))
}

// GET /shops/feed - Live feed status
pub async fn feed_status(State(state): State<AppState>) -> Json<FeedResponse> {
    Json(FeedResponse::from(&state.feed.current()))
}

// POST /shops/feed - Reopen the live listener, e.g. after a listener failure (admin)
#[instrument(skip(state, auth))]
pub async fn restart_feed(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<FeedResponse>, AppError> {
    state.feed.start().await?;
    info!(admin = %auth.subject, "Shop feed restarted");
    Ok(Json(FeedResponse::from(&state.feed.current())))
}

// GET /shops/{id} - Get single shop
#[instrument(skip(state))]
pub async fn get_shop(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ShopResponse>, AppError> {
    let shop = state
        .shops
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Shop not found"))?;

    Ok(Json(ShopResponse::from(&shop)))
}

// POST /shops - Create new shop (admin)
#[instrument(skip(state, auth, req))]
pub async fn create_shop(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateShopRequest>,
) -> Result<(StatusCode, Json<ShopResponse>), AppError> {
    let input = req.into_new_shop()?;
    let id = state.shops.create(&input).await?;
    info!(%id, admin = %auth.subject, "Shop created");

    let shop = state
        .shops
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::internal("Created shop could not be read back"))?;

    Ok((StatusCode::CREATED, Json(ShopResponse::from(&shop))))
}

// PUT /shops/{id} - Patch shop fields (admin)
#[instrument(skip(state, auth, req))]
pub async fn update_shop(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(req): Json<UpdateShopRequest>,
) -> Result<Json<ShopResponse>, AppError> {
    let patch = req.into_patch()?;
    state.shops.update(&id, &patch).await?;
    info!(%id, admin = %auth.subject, "Shop updated");

    let shop = state
        .shops
        .get_by_id(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Shop not found"))?;

    Ok(Json(ShopResponse::from(&shop)))
}

// DELETE /shops/{id} - Hard delete (admin)
#[instrument(skip(state, auth))]
pub async fn delete_shop(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.shops.remove(&id).await?;
    info!(%id, admin = %auth.subject, "Shop deleted");
    Ok(StatusCode::NO_CONTENT)
}
