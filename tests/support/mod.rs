#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, header},
};
use http_body_util::BodyExt;
use time::OffsetDateTime;

use bookshelf::application::books::BookService;
use bookshelf::application::repos::{BooksWriteRepo, CreateBookParams};
use bookshelf::application::reviews::ReviewService;
use bookshelf::cache::{BookCache, CacheConfig, MemoryBookCache};
use bookshelf::domain::entities::{BookRecord, ReviewRecord};
use bookshelf::domain::rating::Rating;
use bookshelf::infra::http::{HttpState, build_router, csrf::CSRF_COOKIE};
use bookshelf::infra::memory::MemoryRepositories;

pub const TOKEN: &str = "integration-token";

pub struct TestApp {
    pub router: Router,
    pub repos: Arc<MemoryRepositories>,
    pub cache: Arc<MemoryBookCache>,
}

impl TestApp {
    pub fn new() -> Self {
        let repos = Arc::new(MemoryRepositories::new());
        let cache = Arc::new(MemoryBookCache::new(&CacheConfig::default()));
        let shared: Arc<dyn BookCache> = cache.clone();

        let books = BookService::new(repos.clone(), repos.clone(), repos.clone())
            .with_cache(shared.clone());
        let reviews = ReviewService::new(repos.clone(), repos.clone()).with_cache(shared);
        let router = build_router(HttpState {
            books: Arc::new(books),
            reviews: Arc::new(reviews),
            db: None,
        });

        Self {
            router,
            repos,
            cache,
        }
    }

    pub async fn book(&self, code: &str, title: &str) -> BookRecord {
        self.repos
            .create_book(CreateBookParams {
                book_id: code.to_string(),
                title: title.to_string(),
                author: "Frank Herbert".to_string(),
            })
            .await
            .expect("create book")
    }

    pub fn review(&self, book_id: i64, rating: i64, at: OffsetDateTime) -> ReviewRecord {
        self.repos
            .insert_review(ReviewRecord {
                id: 0,
                book_id,
                review: "Fear is the mind-killer.".to_string(),
                rating: Rating::new(rating).expect("valid rating"),
                created_at: at,
                updated_at: at,
            })
            .expect("insert review")
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

/// Form submission carrying the session cookie and `_token=<token>`.
pub fn form(method: Method, uri: &str, fields: &str, token: &str) -> Request<Body> {
    let body = if fields.is_empty() {
        format!("_token={token}")
    } else {
        format!("{fields}&_token={token}")
    };
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, format!("{CSRF_COOKIE}={TOKEN}"))
        .body(Body::from(body))
        .expect("request should build")
}

/// Body-less mutation authenticated through the `x-csrf-token` header.
pub fn with_header_token(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, format!("{CSRF_COOKIE}={TOKEN}"))
        .header("x-csrf-token", token)
        .body(Body::empty())
        .expect("request should build")
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.expect("collect body").to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf8 body")
}
