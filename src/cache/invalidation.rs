//! Cache invalidation after writes.
//!
//! Services call these hooks after the write has been persisted. The owning
//! book's key is evicted inline, before the service returns.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use crate::domain::entities::ReviewRecord;

use super::keys::CacheKey;
use super::store::{BookCache, METRIC_CACHE_ERROR_TOTAL};

#[derive(Clone, Default)]
pub struct CacheInvalidator {
    cache: Option<Arc<dyn BookCache>>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn BookCache>) -> Self {
        Self { cache: Some(cache) }
    }

    pub fn disabled() -> Self {
        Self { cache: None }
    }

    pub fn from_option(cache: Option<Arc<dyn BookCache>>) -> Self {
        Self { cache }
    }

    pub fn is_enabled(&self) -> bool {
        self.cache.is_some()
    }

    pub fn book_updated(&self, book_id: i64) {
        self.evict(CacheKey::book(book_id), "book_updated");
    }

    pub fn book_deleted(&self, book_id: i64) {
        self.evict(CacheKey::book(book_id), "book_deleted");
    }

    pub fn review_created(&self, review: &ReviewRecord) {
        self.evict(CacheKey::book(review.book_id), "review_created");
    }

    pub fn review_updated(&self, review: &ReviewRecord) {
        self.evict(CacheKey::book(review.book_id), "review_updated");
    }

    pub fn review_deleted(&self, review: &ReviewRecord) {
        self.evict(CacheKey::book(review.book_id), "review_deleted");
    }

    fn evict(&self, key: CacheKey, event: &'static str) {
        let Some(cache) = self.cache.as_ref() else {
            debug!(
                target: "bookshelf::cache",
                key = %key,
                event,
                "Cache invalidation skipped: cache disabled"
            );
            return;
        };

        match cache.forget(&key) {
            Ok(removed) => info!(
                target: "bookshelf::cache",
                key = %key,
                event,
                removed,
                "Evicted cached book view"
            ),
            Err(err) => {
                counter!(METRIC_CACHE_ERROR_TOTAL).increment(1);
                warn!(
                    target: "bookshelf::cache",
                    key = %key,
                    event,
                    error = %err,
                    "Cache eviction failed; continuing"
                );
            }
        }
    }
}
