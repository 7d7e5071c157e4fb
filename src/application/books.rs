use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::query::{AverageRating, BookListing, BookQuery};
use crate::application::repos::{
    BooksRepo, BooksWriteRepo, CreateBookParams, RepoError, ReviewsRepo, UpdateBookParams,
};
use crate::cache::{BookCache, CacheInvalidator, CacheKey};
use crate::domain::entities::{BookRecord, ReviewRecord};
use crate::domain::validation::{FieldErrors, max_chars, required};

const MAX_BOOK_ID_CHARS: usize = 64;
const MAX_TEXT_CHARS: usize = 255;

#[derive(Debug, Error)]
pub enum BookError {
    #[error("invalid book: {0}")]
    Validation(FieldErrors),
    #[error("book not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl BookError {
    fn from_write(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::NotFound,
            RepoError::Duplicate { .. } => {
                let mut errors = FieldErrors::new();
                errors.insert("book_id", "The book id has already been taken.");
                Self::Validation(errors)
            }
            other => Self::Repo(other),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BookCommand {
    pub book_id: String,
    pub title: String,
    pub author: String,
}

/// Computed per-book view cached under `book:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookDetail {
    pub book: BookRecord,
    /// Newest first.
    pub reviews: Vec<ReviewRecord>,
    pub reviews_count: u64,
    pub reviews_avg_rating: AverageRating,
}

impl BookDetail {
    pub fn new(book: BookRecord, reviews: Vec<ReviewRecord>) -> Self {
        let reviews_count = reviews.len() as u64;
        let reviews_avg_rating =
            AverageRating::from_ratings(reviews.iter().map(|review| review.rating.get()));
        Self {
            book,
            reviews,
            reviews_count,
            reviews_avg_rating,
        }
    }
}

#[derive(Clone)]
pub struct BookService {
    reader: Arc<dyn BooksRepo>,
    writer: Arc<dyn BooksWriteRepo>,
    reviews: Arc<dyn ReviewsRepo>,
    cache: Option<Arc<dyn BookCache>>,
    invalidator: CacheInvalidator,
}

impl BookService {
    pub fn new(
        reader: Arc<dyn BooksRepo>,
        writer: Arc<dyn BooksWriteRepo>,
        reviews: Arc<dyn ReviewsRepo>,
    ) -> Self {
        Self {
            reader,
            writer,
            reviews,
            cache: None,
            invalidator: CacheInvalidator::disabled(),
        }
    }

    pub fn with_cache(self, cache: Arc<dyn BookCache>) -> Self {
        self.with_cache_opt(Some(cache))
    }

    pub fn with_cache_opt(mut self, cache: Option<Arc<dyn BookCache>>) -> Self {
        self.invalidator = CacheInvalidator::from_option(cache.clone());
        self.cache = cache;
        self
    }

    pub async fn list(&self, query: &BookQuery) -> Result<Vec<BookListing>, BookError> {
        self.reader.list_books(query).await.map_err(BookError::from)
    }

    pub async fn find(&self, id: i64) -> Result<Option<BookRecord>, BookError> {
        self.reader.find_by_id(id).await.map_err(BookError::from)
    }

    /// Detail view, served from cache when present. A fill computed while a
    /// write evicted the key is returned but not stored.
    pub async fn detail(&self, id: i64) -> Result<Option<BookDetail>, BookError> {
        let key = CacheKey::book(id);
        let mut generation = None;
        if let Some(cache) = self.cache.as_ref() {
            match cache.get(&key).and_then(|hit| Ok((hit, cache.generation(&key)?))) {
                Ok((Some(detail), _)) => return Ok(Some(detail)),
                Ok((None, current)) => generation = Some(current),
                Err(err) => {
                    counter!(crate::cache::METRIC_CACHE_ERROR_TOTAL).increment(1);
                    warn!(
                        target: "bookshelf::cache",
                        key = %key,
                        error = %err,
                        "Cache read failed; recomputing"
                    );
                }
            }
        }

        let Some(book) = self.reader.find_by_id(id).await? else {
            return Ok(None);
        };
        let reviews = self.reviews.list_for_book(id).await?;
        let detail = BookDetail::new(book, reviews);

        if let (Some(cache), Some(generation)) = (self.cache.as_ref(), generation) {
            match cache.put_if_generation(key, generation, detail.clone()) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        target: "bookshelf::cache",
                        key = %key,
                        "Skipped cache fill; key was evicted during the read"
                    );
                }
                Err(err) => {
                    counter!(crate::cache::METRIC_CACHE_ERROR_TOTAL).increment(1);
                    warn!(
                        target: "bookshelf::cache",
                        key = %key,
                        error = %err,
                        "Cache write failed"
                    );
                }
            }
        }

        Ok(Some(detail))
    }

    pub async fn create_book(&self, command: BookCommand) -> Result<BookRecord, BookError> {
        let command = validate_book(command)?;
        let book = self
            .writer
            .create_book(CreateBookParams {
                book_id: command.book_id,
                title: command.title,
                author: command.author,
            })
            .await
            .map_err(BookError::from_write)?;

        info!(
            target: "bookshelf::books",
            book_id = book.id,
            code = %book.book_id,
            "Created book"
        );
        Ok(book)
    }

    pub async fn update_book(&self, id: i64, command: BookCommand) -> Result<BookRecord, BookError> {
        let command = validate_book(command)?;
        let book = self
            .writer
            .update_book(UpdateBookParams {
                id,
                book_id: command.book_id,
                title: command.title,
                author: command.author,
            })
            .await
            .map_err(BookError::from_write)?;

        // Trigger cache invalidation
        self.invalidator.book_updated(book.id);

        info!(target: "bookshelf::books", book_id = book.id, "Updated book");
        Ok(book)
    }

    pub async fn delete_book(&self, id: i64) -> Result<BookRecord, BookError> {
        let book = self
            .writer
            .delete_book(id)
            .await
            .map_err(BookError::from_write)?;

        // Trigger cache invalidation
        self.invalidator.book_deleted(book.id);

        info!(target: "bookshelf::books", book_id = book.id, "Deleted book");
        Ok(book)
    }
}

fn validate_book(command: BookCommand) -> Result<BookCommand, BookError> {
    let mut errors = FieldErrors::new();
    let book_id = required(&mut errors, "book_id", &command.book_id);
    let title = required(&mut errors, "title", &command.title);
    let author = required(&mut errors, "author", &command.author);

    if let Some(book_id) = book_id.as_deref() {
        max_chars(&mut errors, "book_id", book_id, MAX_BOOK_ID_CHARS);
    }
    if let Some(title) = title.as_deref() {
        max_chars(&mut errors, "title", title, MAX_TEXT_CHARS);
    }
    if let Some(author) = author.as_deref() {
        max_chars(&mut errors, "author", author, MAX_TEXT_CHARS);
    }

    match (book_id, title, author) {
        (Some(book_id), Some(title), Some(author)) if errors.is_empty() => Ok(BookCommand {
            book_id,
            title,
            author,
        }),
        _ => Err(BookError::Validation(errors)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use time::macros::datetime;

    use super::*;
    use crate::application::reviews::{ReviewInput, ReviewService};
    use crate::cache::{CacheConfig, MemoryBookCache};
    use crate::domain::rating::Rating;
    use crate::infra::memory::MemoryRepositories;

    /// Takes its snapshot, then lets a review write commit before returning.
    struct WriteDuringRead {
        inner: Arc<MemoryRepositories>,
        cache: Arc<MemoryBookCache>,
        armed: AtomicBool,
    }

    #[async_trait]
    impl ReviewsRepo for WriteDuringRead {
        async fn list_for_book(&self, book_id: i64) -> Result<Vec<ReviewRecord>, RepoError> {
            let snapshot = self.inner.list_for_book(book_id).await?;
            if self.armed.swap(false, Ordering::SeqCst) {
                ReviewService::new(self.inner.clone(), self.inner.clone())
                    .with_cache(self.cache.clone())
                    .create_review(
                        book_id,
                        ReviewInput {
                            review: "Arrived mid-read".to_string(),
                            rating: "5".to_string(),
                        },
                    )
                    .await
                    .unwrap();
            }
            Ok(snapshot)
        }

        async fn find_by_id(&self, id: i64) -> Result<Option<ReviewRecord>, RepoError> {
            ReviewsRepo::find_by_id(self.inner.as_ref(), id).await
        }
    }

    fn service_with_cache() -> (BookService, Arc<MemoryRepositories>, Arc<MemoryBookCache>) {
        let repos = Arc::new(MemoryRepositories::new());
        let cache = Arc::new(MemoryBookCache::new(&CacheConfig::default()));
        let service = BookService::new(repos.clone(), repos.clone(), repos.clone())
            .with_cache(cache.clone());
        (service, repos, cache)
    }

    fn dune() -> BookCommand {
        BookCommand {
            book_id: " DUNE-1965 ".to_string(),
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
        }
    }

    fn review(book_id: i64, rating: i64) -> ReviewRecord {
        ReviewRecord {
            id: 0,
            book_id,
            review: "Spice must flow".to_string(),
            rating: Rating::new(rating).unwrap(),
            created_at: datetime!(2024-01-10 0:00 UTC),
            updated_at: datetime!(2024-01-10 0:00 UTC),
        }
    }

    #[tokio::test]
    async fn create_trims_and_validates() {
        let (service, _, _) = service_with_cache();
        let book = service.create_book(dune()).await.unwrap();
        assert_eq!(book.book_id, "DUNE-1965");

        let err = service
            .create_book(BookCommand {
                title: "  ".to_string(),
                ..dune()
            })
            .await
            .unwrap_err();
        match err {
            BookError::Validation(errors) => {
                assert_eq!(errors.get("title"), Some("The title field is required."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_code_is_a_field_error() {
        let (service, _, _) = service_with_cache();
        service.create_book(dune()).await.unwrap();
        let err = service.create_book(dune()).await.unwrap_err();
        assert!(matches!(err, BookError::Validation(errors) if errors.contains("book_id")));
    }

    #[tokio::test]
    async fn detail_is_cached_until_the_book_changes() {
        let (service, repos, cache) = service_with_cache();
        let book = service.create_book(dune()).await.unwrap();
        repos.insert_review(review(book.id, 5)).unwrap();
        repos.insert_review(review(book.id, 3)).unwrap();

        let detail = service.detail(book.id).await.unwrap().unwrap();
        assert_eq!(detail.reviews_count, 2);
        assert_eq!(detail.reviews_avg_rating, AverageRating::Mean(4.0));
        assert!(cache.contains(&CacheKey::book(book.id)));

        service
            .update_book(
                book.id,
                BookCommand {
                    title: "Dune (50th anniversary)".to_string(),
                    ..dune()
                },
            )
            .await
            .unwrap();
        assert!(!cache.contains(&CacheKey::book(book.id)));

        let fresh = service.detail(book.id).await.unwrap().unwrap();
        assert_eq!(fresh.book.title, "Dune (50th anniversary)");
    }

    #[tokio::test]
    async fn write_during_a_miss_does_not_leave_a_stale_entry() {
        let repos = Arc::new(MemoryRepositories::new());
        let cache = Arc::new(MemoryBookCache::new(&CacheConfig::default()));
        let reviews = Arc::new(WriteDuringRead {
            inner: repos.clone(),
            cache: cache.clone(),
            armed: AtomicBool::new(true),
        });
        let service =
            BookService::new(repos.clone(), repos.clone(), reviews).with_cache(cache.clone());
        let book = service.create_book(dune()).await.unwrap();

        let first = service.detail(book.id).await.unwrap().unwrap();
        assert_eq!(first.reviews_count, 0);
        assert!(!cache.contains(&CacheKey::book(book.id)));

        let second = service.detail(book.id).await.unwrap().unwrap();
        assert_eq!(second.reviews_count, 1);
        assert!(cache.contains(&CacheKey::book(book.id)));
    }

    #[tokio::test]
    async fn delete_evicts_and_cascades() {
        let (service, repos, cache) = service_with_cache();
        let book = service.create_book(dune()).await.unwrap();
        repos.insert_review(review(book.id, 4)).unwrap();
        service.detail(book.id).await.unwrap();

        service.delete_book(book.id).await.unwrap();

        assert!(cache.is_empty());
        assert_eq!(repos.review_count(), 0);
        assert!(service.detail(book.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_books_surface_not_found() {
        let (service, _, _) = service_with_cache();
        assert!(matches!(
            service.delete_book(404).await,
            Err(BookError::NotFound)
        ));
        assert!(matches!(
            service.update_book(404, dune()).await,
            Err(BookError::NotFound)
        ));
    }

    #[tokio::test]
    async fn works_without_a_cache() {
        let repos = Arc::new(MemoryRepositories::new());
        let service = BookService::new(repos.clone(), repos.clone(), repos);
        let book = service.create_book(dune()).await.unwrap();
        let detail = service.detail(book.id).await.unwrap().unwrap();
        assert_eq!(detail.reviews_avg_rating, AverageRating::Unrated);
        service.delete_book(book.id).await.unwrap();
    }
}
