use axum::{
    routing::{delete, get},
    Router,
};
use crate::state::AppState;
use crate::handlers::review::{create_review, delete_review, list_reviews};

pub fn routes() -> Router<AppState> {
    // Visitors read, post and delete ratings
    Router::new()
        .route("/shops/{id}/reviews", get(list_reviews).post(create_review))
        .route("/shops/{id}/reviews/{review_id}", delete(delete_review))
}
