mod books;
pub mod csrf;
mod middleware;
mod reviews;

pub use middleware::{REQUEST_ID_HEADER, RequestContext};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post, put},
};
use axum::extract::State;
use sqlx::Error as SqlxError;

use crate::application::books::BookService;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::repos::RepoError;
use crate::application::reviews::ReviewService;
use crate::domain::validation::FieldErrors;
use crate::infra::db::PostgresRepositories;

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub books: Arc<BookService>,
    pub reviews: Arc<ReviewService>,
    /// Absent when running on the in-memory store.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(root_redirect))
        .route("/books", get(books::index).post(books::create))
        .route(
            "/books/{id}",
            get(books::show).put(books::update).delete(books::destroy),
        )
        .route("/books/{id}/reviews/create", get(reviews::create_form))
        .route("/books/{id}/reviews", post(reviews::store))
        .route(
            "/books/{id}/reviews/{review}",
            put(reviews::update).delete(reviews::destroy),
        )
        .route("/_health/db", get(health_db))
        .with_state(state)
        .layer(from_fn(log_responses))
        .layer(from_fn(set_request_context))
}

async fn root_redirect() -> Redirect {
    Redirect::to("/books")
}

async fn health_db(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Map a repository error to a consistent HTTP error response.
pub fn repo_error_to_http(source: &'static str, err: RepoError) -> HttpError {
    match err {
        RepoError::Duplicate { constraint } => {
            HttpError::new(source, StatusCode::CONFLICT, "Duplicate record", constraint)
        }
        RepoError::NotFound => HttpError::new(
            source,
            StatusCode::NOT_FOUND,
            "Resource not found",
            "resource not found",
        ),
        RepoError::InvalidInput { message } => {
            HttpError::new(source, StatusCode::BAD_REQUEST, "Invalid input", message)
        }
        RepoError::Integrity { message } => HttpError::new(
            source,
            StatusCode::CONFLICT,
            "Integrity constraint violated",
            message,
        ),
        RepoError::Timeout => HttpError::new(
            source,
            StatusCode::SERVICE_UNAVAILABLE,
            "Database timeout",
            "Database timeout",
        ),
        RepoError::Persistence(message) => HttpError::new(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            "Persistence error",
            message,
        ),
    }
}

/// Plain-text 422 for clients that submit without a rendered form.
fn validation_response(source: &'static str, errors: &FieldErrors) -> Response {
    let body = errors
        .iter()
        .map(|(_, message)| message)
        .collect::<Vec<_>>()
        .join("\n");
    let mut response = (StatusCode::UNPROCESSABLE_ENTITY, body).into_response();
    ErrorReport::from_error(source, StatusCode::UNPROCESSABLE_ENTITY, errors).attach(&mut response);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_errors_map_to_statuses() {
        let cases = [
            (RepoError::NotFound, StatusCode::NOT_FOUND),
            (
                RepoError::InvalidInput {
                    message: "unknown book".to_string(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                RepoError::Duplicate {
                    constraint: "books_book_id_key".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (RepoError::Timeout, StatusCode::SERVICE_UNAVAILABLE),
            (
                RepoError::Persistence("boom".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(repo_error_to_http("tests", err).status(), status);
        }
    }

    #[test]
    fn validation_response_lists_messages() {
        let mut errors = FieldErrors::new();
        errors.insert("rating", "The rating field is required.");
        let response = validation_response("tests", &errors);
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(response.extensions().get::<ErrorReport>().is_some());
    }
}
