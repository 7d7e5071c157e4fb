//! Cache key definitions.

use std::fmt;

/// Key of a cached entry. Book and review writes agree on one format so
/// that either side evicts the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Detail view of a book, keyed by its primary key.
    Book(i64),
}

impl CacheKey {
    pub fn book(id: i64) -> Self {
        Self::Book(id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Book(id) => write!(f, "book:{id}"),
        }
    }
}
