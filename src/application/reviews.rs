use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    CreateReviewParams, RepoError, ReviewsRepo, ReviewsWriteRepo, UpdateReviewParams,
};
use crate::cache::{BookCache, CacheInvalidator};
use crate::domain::entities::ReviewRecord;
use crate::domain::rating::{Rating, RatingError};
use crate::domain::validation::{FieldErrors, required};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("invalid review: {0}")]
    Validation(FieldErrors),
    #[error("review not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Review fields exactly as submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewInput {
    pub review: String,
    pub rating: String,
}

/// Checks the submitted fields, collecting one message per failing field.
pub fn validate_review(input: &ReviewInput) -> Result<(String, Rating), FieldErrors> {
    let mut errors = FieldErrors::new();
    let review = required(&mut errors, "review", &input.review);
    let rating = required(&mut errors, "rating", &input.rating).and_then(|raw| {
        match raw.parse::<Rating>() {
            Ok(rating) => Some(rating),
            Err(RatingError::NotAnInteger) => {
                errors.insert("rating", "The rating field must be an integer.");
                None
            }
            Err(RatingError::OutOfRange { .. }) => {
                errors.insert(
                    "rating",
                    format!(
                        "The rating field must be between {} and {}.",
                        Rating::MIN,
                        Rating::MAX
                    ),
                );
                None
            }
        }
    });

    match (review, rating) {
        (Some(review), Some(rating)) => Ok((review, rating)),
        _ => Err(errors),
    }
}

#[derive(Clone)]
pub struct ReviewService {
    reader: Arc<dyn ReviewsRepo>,
    writer: Arc<dyn ReviewsWriteRepo>,
    invalidator: CacheInvalidator,
}

impl ReviewService {
    pub fn new(reader: Arc<dyn ReviewsRepo>, writer: Arc<dyn ReviewsWriteRepo>) -> Self {
        Self {
            reader,
            writer,
            invalidator: CacheInvalidator::disabled(),
        }
    }

    pub fn with_cache(self, cache: Arc<dyn BookCache>) -> Self {
        self.with_cache_opt(Some(cache))
    }

    pub fn with_cache_opt(mut self, cache: Option<Arc<dyn BookCache>>) -> Self {
        self.invalidator = CacheInvalidator::from_option(cache);
        self
    }

    pub async fn list_for_book(&self, book_id: i64) -> Result<Vec<ReviewRecord>, ReviewError> {
        self.reader
            .list_for_book(book_id)
            .await
            .map_err(ReviewError::from)
    }

    pub async fn create_review(
        &self,
        book_id: i64,
        input: ReviewInput,
    ) -> Result<ReviewRecord, ReviewError> {
        let (review, rating) = validate_review(&input).map_err(ReviewError::Validation)?;
        let record = self
            .writer
            .create_review(CreateReviewParams {
                book_id,
                review,
                rating,
            })
            .await?;

        // Trigger cache invalidation
        self.invalidator.review_created(&record);

        info!(
            target: "bookshelf::reviews",
            review_id = record.id,
            book_id = record.book_id,
            rating = record.rating.get(),
            "Created review"
        );
        Ok(record)
    }

    pub async fn update_review(
        &self,
        book_id: i64,
        review_id: i64,
        input: ReviewInput,
    ) -> Result<ReviewRecord, ReviewError> {
        self.owned_review(book_id, review_id).await?;
        let (review, rating) = validate_review(&input).map_err(ReviewError::Validation)?;

        let record = self
            .writer
            .update_review(UpdateReviewParams {
                id: review_id,
                review,
                rating,
            })
            .await
            .map_err(not_found)?;

        // Trigger cache invalidation
        self.invalidator.review_updated(&record);

        info!(
            target: "bookshelf::reviews",
            review_id = record.id,
            book_id = record.book_id,
            "Updated review"
        );
        Ok(record)
    }

    pub async fn delete_review(
        &self,
        book_id: i64,
        review_id: i64,
    ) -> Result<ReviewRecord, ReviewError> {
        self.owned_review(book_id, review_id).await?;
        let record = self
            .writer
            .delete_review(review_id)
            .await
            .map_err(not_found)?;

        // Trigger cache invalidation
        self.invalidator.review_deleted(&record);

        info!(
            target: "bookshelf::reviews",
            review_id = record.id,
            book_id = record.book_id,
            "Deleted review"
        );
        Ok(record)
    }

    /// The review, provided it belongs to `book_id`.
    async fn owned_review(&self, book_id: i64, review_id: i64) -> Result<ReviewRecord, ReviewError> {
        self.reader
            .find_by_id(review_id)
            .await?
            .filter(|review| review.book_id == book_id)
            .ok_or(ReviewError::NotFound)
    }
}

fn not_found(err: RepoError) -> ReviewError {
    match err {
        RepoError::NotFound => ReviewError::NotFound,
        other => ReviewError::Repo(other),
    }
}
