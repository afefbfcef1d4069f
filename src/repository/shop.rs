use std::sync::Arc;

use tracing::{debug, error, instrument};

use super::require_id;
use crate::error::AppError;
use crate::models::shop::{field, map_shop, NewShop, Shop, ShopPatch};
use crate::store::{strip_unset, CollectionPath, Direction, DocumentStore, Query, StoreError};

pub const COLLECTION: &str = "shops";

#[derive(Clone)]
pub struct ShopRepository {
    store: Arc<dyn DocumentStore>,
}

impl ShopRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn collection() -> CollectionPath {
        CollectionPath::root(COLLECTION)
    }

    /// The one query defining the shop list: every shop ordered by name.
    pub fn ordered_query() -> Query {
        Query::ordered(Self::collection(), field::NAME, Direction::Asc)
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Shop>, AppError> {
        let docs = self
            .store
            .query(&Self::ordered_query())
            .await
            .map_err(|e| {
                error!(?e, "Failed to fetch shops");
                AppError::from(e)
            })?;
        Ok(docs.iter().map(|d| map_shop(&d.id, &d.fields)).collect())
    }

    /// `Ok(None)` when no shop has this id; errors only on store failure.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Shop>, AppError> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        let doc = self.store.get(&Self::collection(), id).await?;
        Ok(doc.map(|d| map_shop(&d.id, &d.fields)))
    }

    /// Stores a new shop with server-assigned timestamps and returns its id.
    ///
    /// Name and coordinates are validated by the caller.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: &NewShop) -> Result<String, AppError> {
        let payload = input
            .to_write_map()
            .server_timestamp(field::CREATED_AT)
            .server_timestamp(field::UPDATED_AT);
        let id = self.store.add(&Self::collection(), strip_unset(payload)).await?;
        debug!(%id, "shop created");
        Ok(id)
    }

    /// Applies only the fields present in `patch` and refreshes `updatedAt`.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: &str, patch: &ShopPatch) -> Result<(), AppError> {
        require_id(id, "updateShop: id")?;
        let payload = patch.to_write_map().server_timestamp(field::UPDATED_AT);
        self.store
            .update(&Self::collection(), id, strip_unset(payload))
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AppError::not_found("Shop not found"),
                other => other.into(),
            })?;
        debug!(%id, "shop updated");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<(), AppError> {
        require_id(id, "removeShop: id")?;
        self.store.delete(&Self::collection(), id).await?;
        debug!(%id, "shop removed");
        Ok(())
    }
}
