//! Cache storage.

use std::{collections::HashMap, sync::RwLock};

use lru::LruCache;
use metrics::counter;
use thiserror::Error;

use crate::application::books::BookDetail;
use crate::util::lock::{rw_read, rw_write};

use super::config::CacheConfig;
use super::keys::CacheKey;

const SOURCE: &str = "cache::store";

pub const METRIC_CACHE_HIT_TOTAL: &str = "bookshelf_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "bookshelf_cache_miss_total";
pub const METRIC_CACHE_FORGET_TOTAL: &str = "bookshelf_cache_forget_total";
pub const METRIC_CACHE_ERROR_TOTAL: &str = "bookshelf_cache_error_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Key/value store for computed book views.
pub trait BookCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<BookDetail>, CacheError>;

    /// Removes `key` and bumps its generation. Returns whether an entry was
    /// present.
    fn forget(&self, key: &CacheKey) -> Result<bool, CacheError>;

    /// Current generation of `key`. Changes every time `key` is forgotten.
    fn generation(&self, key: &CacheKey) -> Result<u64, CacheError>;

    /// Stores `value` only if `key` has not been forgotten since
    /// `generation` was read. Returns whether the value was stored.
    fn put_if_generation(
        &self,
        key: CacheKey,
        generation: u64,
        value: BookDetail,
    ) -> Result<bool, CacheError>;
}

struct Entries {
    values: LruCache<CacheKey, BookDetail>,
    // Keys without an entry are at generation 0.
    generations: HashMap<CacheKey, u64>,
}

impl Entries {
    fn generation(&self, key: &CacheKey) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }
}

/// In-process LRU store.
pub struct MemoryBookCache {
    entries: RwLock<Entries>,
}

impl MemoryBookCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(Entries {
                values: LruCache::new(config.capacity),
                generations: HashMap::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        rw_read(&self.entries, SOURCE, "contains")
            .values
            .contains(key)
    }
}

impl BookCache for MemoryBookCache {
    fn get(&self, key: &CacheKey) -> Result<Option<BookDetail>, CacheError> {
        // LRU promotion needs the write lock.
        let value = rw_write(&self.entries, SOURCE, "get")
            .values
            .get(key)
            .cloned();
        if value.is_some() {
            counter!(METRIC_CACHE_HIT_TOTAL).increment(1);
        } else {
            counter!(METRIC_CACHE_MISS_TOTAL).increment(1);
        }
        Ok(value)
    }

    fn forget(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "forget");
        let removed = entries.values.pop(key).is_some();
        let generation = entries.generations.entry(*key).or_insert(0);
        *generation = generation.wrapping_add(1);
        drop(entries);

        if removed {
            counter!(METRIC_CACHE_FORGET_TOTAL).increment(1);
        }
        Ok(removed)
    }

    fn generation(&self, key: &CacheKey) -> Result<u64, CacheError> {
        Ok(rw_read(&self.entries, SOURCE, "generation").generation(key))
    }

    fn put_if_generation(
        &self,
        key: CacheKey,
        generation: u64,
        value: BookDetail,
    ) -> Result<bool, CacheError> {
        let mut entries = rw_write(&self.entries, SOURCE, "put_if_generation");
        if entries.generation(&key) != generation {
            return Ok(false);
        }
        entries.values.put(key, value);
        Ok(true)
    }
}
