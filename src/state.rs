// src/state.rs
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::feed::LiveShopFeed;
use crate::repository::{ReviewRepository, ShopRepository};
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub shops: ShopRepository,
    pub reviews: ReviewRepository,
    pub feed: Arc<LiveShopFeed>,
    pub blobs: Arc<dyn BlobStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DocumentStore>, blobs: Arc<dyn BlobStore>) -> Self {
        let shops = ShopRepository::new(store.clone());
        Self {
            config: Arc::new(config),
            feed: Arc::new(LiveShopFeed::new(shops.clone())),
            reviews: ReviewRepository::new(store),
            shops,
            blobs,
        }
    }
}
