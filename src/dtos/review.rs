use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::review::{NewReview, Review, MAX_RATING, MIN_RATING};

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub rating: i64,
    pub text: Option<String>,
}

impl CreateReviewRequest {
    pub fn into_new_review(self) -> Result<NewReview, AppError> {
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(AppError::validation(format!(
                "Rating must be between {MIN_RATING} and {MAX_RATING}"
            )));
        }
        Ok(NewReview {
            rating: self.rating,
            text: self.text.map(|t| t.trim().to_string()),
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub id: String,
    pub shop_id: String,
    pub rating: i64,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Review> for ReviewResponse {
    fn from(r: Review) -> Self {
        Self {
            id: r.id,
            shop_id: r.shop_id,
            rating: r.rating,
            text: r.text,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: String,
}
