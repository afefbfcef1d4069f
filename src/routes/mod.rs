pub mod auth;
pub mod maps;
pub mod reviews;
pub mod shops;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use crate::config::BASE_PATH;
use crate::state::AppState;

pub fn create_router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(shops::routes(state))
        .merge(reviews::routes())
        .merge(maps::routes(state))
        .merge(auth::routes())
}

fn cors(state: &AppState) -> CorsLayer {
    let origin = match state.config.cors_allow_origin.as_deref().map(HeaderValue::from_str) {
        Some(Ok(value)) => AllowOrigin::exact(value),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Ignoring invalid CORS_ALLOW_ORIGIN");
            AllowOrigin::from(Any)
        }
        None => AllowOrigin::from(Any),
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Complete application under the base path.
pub fn app(state: AppState) -> Router {
    let api = create_router(&state)
        .route("/", get(|| async { "ShopMap API" }))
        .route("/health", get(health_check))
        .nest_service("/uploads", ServeDir::new(&state.config.upload_dir));

    Router::new()
        .nest(BASE_PATH, api)
        .layer(cors(&state))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::jwt::{sign_token, ADMIN_ROLE};
    use crate::blob::LocalBlobStore;
    use crate::config::Config;
    use crate::store::MemoryStore;

    const SECRET: &str = "test-secret";

    async fn setup() -> (Router, TempDir) {
        let uploads = TempDir::new().unwrap();
        let mut config = Config::local();
        config.jwt_secret = Some(SECRET.into());
        config.admin_password_hash = Some(bcrypt::hash("letmein", 4).unwrap());
        config.upload_dir = uploads.path().to_path_buf();

        let blobs = Arc::new(LocalBlobStore::new(uploads.path(), &config.public_base_url));
        let state = AppState::new(config, Arc::new(MemoryStore::new()), blobs);
        state.feed.start().await.unwrap();
        (app(state), uploads)
    }

    fn admin_token() -> String {
        sign_token("admin", ADMIN_ROLE, SECRET).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn send_json(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_json(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &Router, body: Value) -> Value {
        let token = admin_token();
        let res = app
            .clone()
            .oneshot(send_json("POST", "/shopmap/shops", body, Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        read_json(res).await
    }

    #[tokio::test]
    async fn health_is_served_under_the_base_path() {
        let (app, _dir) = setup().await;
        let res = app.oneshot(get("/shopmap/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn creating_a_shop_requires_a_token() {
        let (app, _dir) = setup().await;
        let body = json!({"name": "Test", "lat": 35.0, "lng": 139.0});
        let res = app
            .clone()
            .oneshot(send_json("POST", "/shopmap/shops", body.clone(), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .oneshot(send_json("POST", "/shopmap/shops", body, Some("garbage")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn non_admin_tokens_are_forbidden() {
        let (app, _dir) = setup().await;
        let token = sign_token("someone", "viewer", SECRET).unwrap();
        let res = app
            .oneshot(send_json(
                "POST",
                "/shopmap/shops",
                json!({"name": "Test", "lat": 35.0, "lng": 139.0}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn created_shops_appear_in_search() {
        let (app, _dir) = setup().await;
        let created = create(
            &app,
            json!({"name": "Test Shop", "lat": 35.0, "lng": 139.0, "genre": "Vintage"}),
        )
        .await;
        assert_eq!(created["name"], "Test Shop");
        assert!(created["createdAt"].is_string());
        create(&app, json!({"name": "Other", "lat": 34.0, "lng": 135.0})).await;

        let res = app.clone().oneshot(get("/shopmap/shops?q=vintage")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = read_json(res).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["count"], 1);
        assert_eq!(body["shops"][0]["id"], created["id"]);
        assert_eq!(body["feed"]["status"], "subscribed");

        let res = app.oneshot(get("/shopmap/shops")).await.unwrap();
        let body = read_json(res).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["shops"][0]["name"], "Other");
    }

    #[tokio::test]
    async fn blank_name_is_a_bad_request() {
        let (app, _dir) = setup().await;
        let token = admin_token();
        let res = app
            .oneshot(send_json(
                "POST",
                "/shopmap/shops",
                json!({"name": "  ", "lat": 35.0, "lng": 139.0}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(read_json(res).await["error"].is_string());
    }

    #[tokio::test]
    async fn update_and_delete_round_through_the_feed() {
        let (app, _dir) = setup().await;
        let token = admin_token();
        let created = create(&app, json!({"name": "Test", "lat": 35.0, "lng": 139.0})).await;
        let uri = format!("/shopmap/shops/{}", created["id"].as_str().unwrap());

        let res = app
            .clone()
            .oneshot(send_json("PUT", &uri, json!({"area": "Shibuya"}), Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let updated = read_json(res).await;
        assert_eq!(updated["area"], "Shibuya");
        assert_eq!(updated["name"], "Test");

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(&uri)
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let res = app.oneshot(get("/shopmap/shops")).await.unwrap();
        assert_eq!(read_json(res).await["total"], 0);
    }

    #[tokio::test]
    async fn unknown_shop_is_not_found() {
        let (app, _dir) = setup().await;
        let res = app.oneshot(get("/shopmap/shops/missing")).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reviews_are_posted_and_listed() {
        let (app, _dir) = setup().await;
        let created = create(&app, json!({"name": "Test", "lat": 35.0, "lng": 139.0})).await;
        let uri = format!("/shopmap/shops/{}/reviews", created["id"].as_str().unwrap());

        let res = app
            .clone()
            .oneshot(send_json("POST", &uri, json!({"rating": 4, "text": " nice "}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert!(read_json(res).await["id"].is_string());

        let res = app
            .clone()
            .oneshot(send_json("POST", &uri, json!({"rating": 9}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app.clone().oneshot(get(&uri)).await.unwrap();
        let reviews = read_json(res).await;
        assert_eq!(reviews.as_array().unwrap().len(), 1);
        assert_eq!(reviews[0]["rating"], 4);
        assert_eq!(reviews[0]["text"], "nice");

        let res = app
            .oneshot(send_json(
                "POST",
                "/shopmap/shops/missing/reviews",
                json!({"rating": 5}),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn visitors_can_delete_a_review() {
        let (app, _dir) = setup().await;
        let created = create(&app, json!({"name": "Test", "lat": 35.0, "lng": 139.0})).await;
        let uri = format!("/shopmap/shops/{}/reviews", created["id"].as_str().unwrap());
        let res = app
            .clone()
            .oneshot(send_json("POST", &uri, json!({"rating": 2}), None))
            .await
            .unwrap();
        let review_id = read_json(res).await["id"].as_str().unwrap().to_string();

        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("{uri}/{review_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);

        let res = app.oneshot(get(&uri)).await.unwrap();
        assert!(read_json(res).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn restarting_the_feed_requires_admin() {
        let (app, _dir) = setup().await;
        let res = app
            .clone()
            .oneshot(send_json("POST", "/shopmap/shops/feed", json!({}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let token = admin_token();
        let res = app
            .clone()
            .oneshot(send_json("POST", "/shopmap/shops/feed", json!({}), Some(&token)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(read_json(res).await["status"], "subscribed");

        let res = app.oneshot(get("/shopmap/shops/feed")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn directions_link_to_the_shop() {
        let (app, _dir) = setup().await;
        let created = create(&app, json!({"name": "Test Shop", "lat": 35.5, "lng": 139.5})).await;
        let uri = format!(
            "/shopmap/shops/{}/directions?mode=driving",
            created["id"].as_str().unwrap()
        );

        let res = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let links = read_json(res).await;
        let web = links["web"].as_str().unwrap();
        assert!(web.contains("35.5"));
        assert!(web.contains("driving"));
        assert!(links["iosApp"].is_string());

        let res = app.oneshot(get("/shopmap/maps/search?q=%20")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn login_exchanges_the_password_for_a_token() {
        let (app, _dir) = setup().await;
        let res = app
            .clone()
            .oneshot(send_json("POST", "/shopmap/auth/login", json!({"password": "nope"}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app
            .clone()
            .oneshot(send_json("POST", "/shopmap/auth/login", json!({"password": "letmein"}), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let token = read_json(res).await["access_token"].as_str().unwrap().to_string();

        let res = app
            .oneshot(send_json(
                "POST",
                "/shopmap/shops",
                json!({"name": "Test", "lat": 35.0, "lng": 139.0}),
                Some(&token),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn uploaded_images_are_served_back() {
        let (app, _dir) = setup().await;
        let token = admin_token();
        let res = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/shopmap/images")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::from(vec![0xFFu8, 0xD8, 0xFF]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let url = read_json(res).await["url"].as_str().unwrap().to_string();
        let path = url.split("/shopmap").nth(1).unwrap().to_string();
        assert!(path.starts_with("/uploads/shops/"));

        let res = app.oneshot(get(&format!("/shopmap{path}"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[0xFF, 0xD8, 0xFF]);
    }
}
