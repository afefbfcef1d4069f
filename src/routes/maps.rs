use axum::{
    routing::{get, post},
    Router, middleware,
};
use crate::state::AppState;
use crate::handlers::maps::{map_search, shop_directions, upload_image};
use crate::middleware::auth::require_admin;

/// Largest accepted photo upload.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub fn routes(state: &AppState) -> Router<AppState> {
    let open = Router::new()
        .route("/shops/{id}/directions", get(shop_directions))
        .route("/maps/search", get(map_search));

    let protected = Router::new()
        .route("/images", post(upload_image))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_IMAGE_BYTES))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    open.merge(protected)
}
