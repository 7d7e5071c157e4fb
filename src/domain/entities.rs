//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::rating::Rating;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookRecord {
    pub id: i64,
    /// External catalogue code, distinct from the primary key.
    pub book_id: String,
    pub title: String,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewRecord {
    pub id: i64,
    /// Primary key of the owning book.
    pub book_id: i64,
    pub review: String,
    pub rating: Rating,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}
