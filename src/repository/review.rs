use std::sync::Arc;

use tracing::{debug, instrument};

use super::require_id;
use super::shop::ShopRepository;
use crate::error::AppError;
use crate::models::review::{field, map_review, NewReview, Review};
use crate::store::{strip_unset, CollectionPath, Direction, DocumentStore, Query};

pub const COLLECTION: &str = "reviews";

/// Reviews live in the `shops/{shopId}/reviews` sub-collection.
#[derive(Clone)]
pub struct ReviewRepository {
    store: Arc<dyn DocumentStore>,
}

impl ReviewRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn collection(shop_id: &str) -> CollectionPath {
        ShopRepository::collection().child(shop_id, COLLECTION)
    }

    /// All reviews of a shop, newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, shop_id: &str) -> Result<Vec<Review>, AppError> {
        require_id(shop_id, "getReviews: shopId")?;
        let query = Query::ordered(
            Self::collection(shop_id),
            field::CREATED_AT,
            Direction::Desc,
        );
        let docs = self.store.query(&query).await?;
        Ok(docs
            .iter()
            .map(|d| map_review(&d.id, shop_id, &d.fields))
            .collect())
    }

    /// Stores the review as given; the rating range is checked by the caller.
    #[instrument(skip(self, input), fields(rating = input.rating))]
    pub async fn add(&self, shop_id: &str, input: &NewReview) -> Result<String, AppError> {
        require_id(shop_id, "addReview: shopId")?;
        let id = self
            .store
            .add(&Self::collection(shop_id), strip_unset(input.to_write_map()))
            .await?;
        debug!(%id, "review added");
        Ok(id)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, shop_id: &str, review_id: &str) -> Result<(), AppError> {
        require_id(shop_id, "removeReview: shopId")?;
        require_id(review_id, "removeReview: reviewId")?;
        self.store
            .delete(&Self::collection(shop_id), review_id)
            .await?;
        debug!(%review_id, "review removed");
        Ok(())
    }
}
