//! Typed CRUD over the document store.

pub mod review;
pub mod shop;

pub use review::ReviewRepository;
pub use shop::ShopRepository;

use crate::error::AppError;

/// Rejects blank ids before they reach the store.
pub(crate) fn require_id(id: &str, what: &str) -> Result<(), AppError> {
    if id.trim().is_empty() {
        return Err(AppError::validation(format!("{what} is empty")));
    }
    Ok(())
}
