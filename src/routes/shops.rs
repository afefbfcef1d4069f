use axum::{
    routing::{get, post, put},
    Router, middleware,
};
use crate::state::AppState;
use crate::handlers::shop::{
    create_shop, delete_shop, feed_status, get_shop, list_shops, refresh_shops, restart_feed,
    update_shop,
};
use crate::middleware::auth::require_admin;

pub fn routes(state: &AppState) -> Router<AppState> {
    // Browsing and searching shops is open
    let open_routes = Router::new()
        .route("/shops", get(list_shops))
        .route("/shops/feed", get(feed_status))
        .route("/shops/refresh", post(refresh_shops))
        .route("/shops/{id}", get(get_shop));

    // Only the admin can create, update, delete and reopen the live feed
    let protected_routes = Router::new()
        .route("/shops", post(create_shop))
        .route("/shops/feed", post(restart_feed))
        .route("/shops/{id}", put(update_shop).delete(delete_shop))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    open_routes.merge(protected_routes)
}
