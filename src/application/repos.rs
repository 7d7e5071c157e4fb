//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::query::{BookListing, BookQuery};
use crate::domain::entities::{BookRecord, ReviewRecord};
use crate::domain::rating::Rating;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateBookParams {
    pub book_id: String,
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct UpdateBookParams {
    pub id: i64,
    pub book_id: String,
    pub title: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct CreateReviewParams {
    pub book_id: i64,
    pub review: String,
    pub rating: Rating,
}

#[derive(Debug, Clone)]
pub struct UpdateReviewParams {
    pub id: i64,
    pub review: String,
    pub rating: Rating,
}

#[async_trait]
pub trait BooksRepo: Send + Sync {
    /// Materializes a listing query. Ordering and annotations follow the query.
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<BookListing>, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<BookRecord>, RepoError>;
}

#[async_trait]
pub trait BooksWriteRepo: Send + Sync {
    async fn create_book(&self, params: CreateBookParams) -> Result<BookRecord, RepoError>;

    async fn update_book(&self, params: UpdateBookParams) -> Result<BookRecord, RepoError>;

    /// Removes the book together with its reviews and returns the removed row.
    async fn delete_book(&self, id: i64) -> Result<BookRecord, RepoError>;
}

#[async_trait]
pub trait ReviewsRepo: Send + Sync {
    /// Reviews of one book, newest first.
    async fn list_for_book(&self, book_id: i64) -> Result<Vec<ReviewRecord>, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<ReviewRecord>, RepoError>;
}

#[async_trait]
pub trait ReviewsWriteRepo: Send + Sync {
    async fn create_review(&self, params: CreateReviewParams) -> Result<ReviewRecord, RepoError>;

    async fn update_review(&self, params: UpdateReviewParams) -> Result<ReviewRecord, RepoError>;

    async fn delete_review(&self, id: i64) -> Result<ReviewRecord, RepoError>;
}
