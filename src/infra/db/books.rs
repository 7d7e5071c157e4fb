use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::query::{AverageRating, BookListing, BookQuery, DateWindow, SortKey},
    application::repos::{
        BooksRepo, BooksWriteRepo, CreateBookParams, RepoError, UpdateBookParams,
    },
    domain::entities::BookRecord,
};

use super::PostgresRepositories;
use super::util::{convert_count, escape_like, map_sqlx_error};

const BOOK_COLUMNS: &str = "id, book_id, title, author, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct BookRow {
    id: i64,
    book_id: String,
    title: String,
    author: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<BookRow> for BookRecord {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            book_id: row.book_id,
            title: row.title,
            author: row.author,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BookListingRow {
    #[sqlx(flatten)]
    book: BookRow,
    reviews_count: Option<i64>,
    reviews_avg_rating: Option<f64>,
}

impl PostgresRepositories {
    /// Compiles a listing query. Aggregates are correlated subqueries so
    /// each can carry its own window; the outer select filters and orders
    /// on their aliases.
    fn push_listing_query(qb: &mut QueryBuilder<'_, Postgres>, query: &BookQuery) {
        qb.push("SELECT * FROM (SELECT b.id, b.book_id, b.title, b.author, b.created_at, b.updated_at, ");

        match query.count_window() {
            Some(window) => {
                qb.push("(SELECT COUNT(*) FROM reviews r WHERE r.book_id = b.id");
                Self::push_window(qb, window);
                qb.push(") AS reviews_count, ");
            }
            None => {
                qb.push("NULL::BIGINT AS reviews_count, ");
            }
        }

        match query.average_window() {
            Some(window) => {
                qb.push("(SELECT AVG(r.rating)::FLOAT8 FROM reviews r WHERE r.book_id = b.id");
                Self::push_window(qb, window);
                qb.push(") AS reviews_avg_rating");
            }
            None => {
                qb.push("NULL::FLOAT8 AS reviews_avg_rating");
            }
        }

        qb.push(" FROM books b");
        if let Some(title) = query.title_filter() {
            qb.push(" WHERE b.title ILIKE ");
            qb.push_bind(format!("%{}%", escape_like(title)));
            qb.push(" ESCAPE '\\'");
        }
        qb.push(") AS listing");

        if let Some(min) = query.review_threshold() {
            qb.push(" WHERE listing.reviews_count >= ");
            qb.push_bind(i64::try_from(min).unwrap_or(i64::MAX));
        }

        qb.push(" ORDER BY ");
        for key in query.sort_keys() {
            match key {
                SortKey::Popularity => qb.push("listing.reviews_count DESC, "),
                SortKey::Rating => qb.push("listing.reviews_avg_rating DESC NULLS LAST, "),
            };
        }
        qb.push("listing.id ASC");
    }

    fn push_window(qb: &mut QueryBuilder<'_, Postgres>, window: DateWindow) {
        if let Some(from) = window.from {
            qb.push(" AND r.created_at >= ");
            qb.push_bind(from);
        }
        if let Some(to) = window.to {
            qb.push(" AND r.created_at <= ");
            qb.push_bind(to);
        }
    }
}

#[async_trait]
impl BooksRepo for PostgresRepositories {
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<BookListing>, RepoError> {
        let mut qb = QueryBuilder::new("");
        Self::push_listing_query(&mut qb, query);

        let rows = qb
            .build_query_as::<BookListingRow>()
            .fetch_all(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        let counted = query.count_window().is_some();
        let averaged = query.average_window().is_some();

        rows.into_iter()
            .map(|row| -> Result<BookListing, RepoError> {
                let reviews_count = if counted {
                    Some(convert_count(row.reviews_count.unwrap_or(0))?)
                } else {
                    None
                };
                let reviews_avg_rating = averaged.then(|| {
                    row.reviews_avg_rating
                        .map_or(AverageRating::Unrated, AverageRating::Mean)
                });
                Ok(BookListing {
                    book: row.book.into(),
                    reviews_count,
                    reviews_avg_rating,
                })
            })
            .collect()
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<BookRecord>, RepoError> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(BookRecord::from))
    }
}

#[async_trait]
impl BooksWriteRepo for PostgresRepositories {
    async fn create_book(&self, params: CreateBookParams) -> Result<BookRecord, RepoError> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "INSERT INTO books (book_id, title, author) VALUES ($1, $2, $3) \
             RETURNING {BOOK_COLUMNS}"
        ))
        .bind(params.book_id)
        .bind(params.title)
        .bind(params.author)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_book(&self, params: UpdateBookParams) -> Result<BookRecord, RepoError> {
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "UPDATE books SET book_id = $2, title = $3, author = $4, updated_at = now() \
             WHERE id = $1 RETURNING {BOOK_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.book_id)
        .bind(params.title)
        .bind(params.author)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(BookRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_book(&self, id: i64) -> Result<BookRecord, RepoError> {
        // Reviews go with the book through ON DELETE CASCADE.
        let row = sqlx::query_as::<_, BookRow>(&format!(
            "DELETE FROM books WHERE id = $1 RETURNING {BOOK_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(BookRecord::from).ok_or(RepoError::NotFound)
    }
}
