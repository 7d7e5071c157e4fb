//! Volatile in-process repositories.
//!
//! Shares the listing semantics of the Postgres adapter through
//! [`BookQuery::apply`] and mirrors its constraints: unique `book_id`,
//! review foreign key and cascading book deletes.

use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::query::{BookListing, BookQuery};
use crate::application::repos::{
    BooksRepo, BooksWriteRepo, CreateBookParams, CreateReviewParams, RepoError, ReviewsRepo,
    ReviewsWriteRepo, UpdateBookParams, UpdateReviewParams,
};
use crate::domain::entities::{BookRecord, ReviewRecord};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::memory";
const BOOK_ID_CONSTRAINT: &str = "books_book_id_key";

#[derive(Default)]
struct MemoryState {
    books: Vec<BookRecord>,
    reviews: Vec<ReviewRecord>,
    last_book_id: i64,
    last_review_id: i64,
}

impl MemoryState {
    fn book(&self, id: i64) -> Option<&BookRecord> {
        self.books.iter().find(|book| book.id == id)
    }

    fn ensure_unique_code(&self, code: &str, except: Option<i64>) -> Result<(), RepoError> {
        let taken = self
            .books
            .iter()
            .any(|book| book.book_id == code && Some(book.id) != except);
        if taken {
            return Err(RepoError::Duplicate {
                constraint: BOOK_ID_CONSTRAINT.to_string(),
            });
        }
        Ok(())
    }

    fn ensure_book_exists(&self, id: i64) -> Result<(), RepoError> {
        if self.book(id).is_none() {
            return Err(RepoError::InvalidInput {
                message: format!("review references unknown book {id}"),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRepositories {
    state: RwLock<MemoryState>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a review with caller-provided timestamps. A zero id is
    /// replaced by the next sequence value.
    pub fn insert_review(&self, mut review: ReviewRecord) -> Result<ReviewRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "insert_review");
        state.ensure_book_exists(review.book_id)?;
        if review.id == 0 {
            state.last_review_id += 1;
            review.id = state.last_review_id;
        } else {
            state.last_review_id = state.last_review_id.max(review.id);
        }
        state.reviews.push(review.clone());
        Ok(review)
    }

    pub fn review_count(&self) -> usize {
        rw_read(&self.state, SOURCE, "review_count").reviews.len()
    }
}

#[async_trait]
impl BooksRepo for MemoryRepositories {
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<BookListing>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "list_books");
        Ok(query.apply(&state.books, &state.reviews))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<BookRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_book");
        Ok(state.book(id).cloned())
    }
}

#[async_trait]
impl BooksWriteRepo for MemoryRepositories {
    async fn create_book(&self, params: CreateBookParams) -> Result<BookRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "create_book");
        state.ensure_unique_code(&params.book_id, None)?;

        let now = OffsetDateTime::now_utc();
        state.last_book_id += 1;
        let book = BookRecord {
            id: state.last_book_id,
            book_id: params.book_id,
            title: params.title,
            author: params.author,
            created_at: now,
            updated_at: now,
        };
        state.books.push(book.clone());
        Ok(book)
    }

    async fn update_book(&self, params: UpdateBookParams) -> Result<BookRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "update_book");
        state.ensure_unique_code(&params.book_id, Some(params.id))?;

        let book = state
            .books
            .iter_mut()
            .find(|book| book.id == params.id)
            .ok_or(RepoError::NotFound)?;
        book.book_id = params.book_id;
        book.title = params.title;
        book.author = params.author;
        book.updated_at = OffsetDateTime::now_utc();
        Ok(book.clone())
    }

    async fn delete_book(&self, id: i64) -> Result<BookRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "delete_book");
        let index = state
            .books
            .iter()
            .position(|book| book.id == id)
            .ok_or(RepoError::NotFound)?;
        let book = state.books.remove(index);
        state.reviews.retain(|review| review.book_id != id);
        Ok(book)
    }
}

#[async_trait]
impl ReviewsRepo for MemoryRepositories {
    async fn list_for_book(&self, book_id: i64) -> Result<Vec<ReviewRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "list_reviews");
        let mut reviews: Vec<ReviewRecord> = state
            .reviews
            .iter()
            .filter(|review| review.book_id == book_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(reviews)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<ReviewRecord>, RepoError> {
        let state = rw_read(&self.state, SOURCE, "find_review");
        Ok(state.reviews.iter().find(|review| review.id == id).cloned())
    }
}

#[async_trait]
impl ReviewsWriteRepo for MemoryRepositories {
    async fn create_review(&self, params: CreateReviewParams) -> Result<ReviewRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        self.insert_review(ReviewRecord {
            id: 0,
            book_id: params.book_id,
            review: params.review,
            rating: params.rating,
            created_at: now,
            updated_at: now,
        })
    }

    async fn update_review(&self, params: UpdateReviewParams) -> Result<ReviewRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "update_review");
        let review = state
            .reviews
            .iter_mut()
            .find(|review| review.id == params.id)
            .ok_or(RepoError::NotFound)?;
        review.review = params.review;
        review.rating = params.rating;
        review.updated_at = OffsetDateTime::now_utc();
        Ok(review.clone())
    }

    async fn delete_review(&self, id: i64) -> Result<ReviewRecord, RepoError> {
        let mut state = rw_write(&self.state, SOURCE, "delete_review");
        let index = state
            .reviews
            .iter()
            .position(|review| review.id == id)
            .ok_or(RepoError::NotFound)?;
        Ok(state.reviews.remove(index))
    }
}
