//! Book detail cache.
//!
//! Computed [`BookDetail`](crate::application::books::BookDetail) views are
//! cached under `book:<id>`. Every successful write that can change a view
//! evicts its key through [`CacheInvalidator`]. Eviction is best-effort and
//! never fails the write that triggered it.
//!
//! ```toml
//! [cache]
//! enabled = true
//! capacity = 512
//! ```

mod config;
mod invalidation;
mod keys;
mod store;

pub use config::CacheConfig;
pub use invalidation::CacheInvalidator;
pub use keys::CacheKey;
pub use store::{BookCache, CacheError, MemoryBookCache};
pub use store::{
    METRIC_CACHE_ERROR_TOTAL, METRIC_CACHE_FORGET_TOTAL, METRIC_CACHE_HIT_TOTAL,
    METRIC_CACHE_MISS_TOTAL,
};
