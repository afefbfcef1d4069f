// src/main.rs
mod routes;
mod handlers;
mod models;
mod database;
mod middleware;
mod state;
mod dtos;
mod error;
mod auth;
mod config;
mod store;
mod repository;
mod feed;
mod search;
mod maps;
mod blob;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use tokio::net::TcpListener;
use dotenvy::dotenv;

use crate::blob::LocalBlobStore;
use crate::config::Config;
use crate::store::{DocumentStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();

    // Pick the document store
    let store: Arc<dyn DocumentStore> = match config.database_url.as_deref() {
        Some(url) => match database::create_pool(url).await {
            Ok(pool) => Arc::new(PgStore::new(pool)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to create database pool");
                return;
            }
        },
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory document store");
            Arc::new(MemoryStore::new())
        }
    };
    let blobs = Arc::new(LocalBlobStore::new(&config.upload_dir, &config.public_base_url));
    tracing::info!(dir = %blobs.root().display(), "Serving uploads");

    let (host, base_port) = (config.host, config.port);

    // Create application state
    let app_state = state::AppState::new(config, store, blobs);
    if let Err(e) = app_state.feed.start().await {
        // stays in the error state until POST /shops/feed
        tracing::error!(error = %e, "Live shop feed failed to start");
    }
    let feed = app_state.feed.clone();

    let app = routes::app(app_state);

    // Try base_port..base_port+20 to avoid crash when address is in use
    let listener = {
        let mut bound = None;
        for offset in 0u16..=20 {
            let port = base_port.saturating_add(offset);
            let addr = SocketAddr::from((host, port));
            match TcpListener::bind(addr).await {
                Ok(l) => { bound = Some((l, addr)); break; }
                Err(e) => {
                    if offset == 0 { tracing::warn!(%addr, error=%e, "Port in use, trying next"); }
                }
            }
        }
        match bound {
            Some((l, addr)) => {
                tracing::info!("Server running on {}{}", addr, config::BASE_PATH);
                l
            }
            None => {
                tracing::error!("Failed to bind to any port starting at {} on {}", base_port, host);
                return;
            }
        }
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
    };

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!(error=%e, "Server error");
    }
    feed.stop();
    tracing::info!("Server stopped");
}
