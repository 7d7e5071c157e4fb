//! Cache configuration.

use std::num::NonZeroUsize;
use std::sync::Arc;

use super::store::{BookCache, MemoryBookCache};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(512) {
    Some(capacity) => capacity,
    None => NonZeroUsize::MIN,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// A disabled cache is never built; services then read through and
    /// evictions become no-ops.
    pub enabled: bool,
    /// Book views kept before least-recently-used eviction.
    pub capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            capacity: settings.capacity,
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The in-process cache, or `None` when caching is switched off.
    pub fn build(&self) -> Option<Arc<dyn BookCache>> {
        if !self.is_enabled() {
            return None;
        }
        let cache: Arc<dyn BookCache> = Arc::new(MemoryBookCache::new(self));
        Some(cache)
    }
}
