use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateReviewParams, RepoError, ReviewsRepo, ReviewsWriteRepo, UpdateReviewParams,
    },
    domain::{entities::ReviewRecord, rating::Rating},
};

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const REVIEW_COLUMNS: &str = "id, book_id, review, rating, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: i64,
    book_id: i64,
    review: String,
    rating: i16,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ReviewRow> for ReviewRecord {
    type Error = RepoError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let rating = Rating::try_from(row.rating).map_err(|err| RepoError::Integrity {
            message: format!("review {} has invalid rating: {err}", row.id),
        })?;
        Ok(Self {
            id: row.id,
            book_id: row.book_id,
            review: row.review,
            rating,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ReviewsRepo for PostgresRepositories {
    async fn list_for_book(&self, book_id: i64) -> Result<Vec<ReviewRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE book_id = $1 \
             ORDER BY created_at DESC, id DESC"
        ))
        .bind(book_id)
        .fetch_all(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        rows.into_iter().map(ReviewRecord::try_from).collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ReviewRecord>, RepoError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        row.map(ReviewRecord::try_from).transpose()
    }
}

#[async_trait]
impl ReviewsWriteRepo for PostgresRepositories {
    async fn create_review(&self, params: CreateReviewParams) -> Result<ReviewRecord, RepoError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "INSERT INTO reviews (book_id, review, rating) VALUES ($1, $2, $3) \
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(params.book_id)
        .bind(params.review)
        .bind(i16::from(params.rating))
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn update_review(&self, params: UpdateReviewParams) -> Result<ReviewRecord, RepoError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "UPDATE reviews SET review = $2, rating = $3, updated_at = now() \
             WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.review)
        .bind(i16::from(params.rating))
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.ok_or(RepoError::NotFound)?.try_into()
    }

    async fn delete_review(&self, id: i64) -> Result<ReviewRecord, RepoError> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "DELETE FROM reviews WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.ok_or(RepoError::NotFound)?.try_into()
    }
}
