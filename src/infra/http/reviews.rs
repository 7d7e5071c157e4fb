use axum::{
    extract::{Form, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::application::books::BookError;
use crate::application::error::ErrorReport;
use crate::application::reviews::{ReviewError, ReviewInput};
use crate::domain::entities::BookRecord;
use crate::presentation::views::{
    LayoutContext, ReviewFormTemplate, ReviewFormView, book_href, render_not_found_response,
    render_template_response,
};

use super::{HttpState, csrf, repo_error_to_http, validation_response};

const SOURCE: &str = "infra::http::reviews";

#[derive(Debug, Deserialize, Default)]
pub struct ReviewForm {
    #[serde(default)]
    pub review: String,
    #[serde(default)]
    pub rating: String,
    #[serde(rename = "_token")]
    pub token: Option<String>,
}

impl ReviewForm {
    fn input(&self) -> ReviewInput {
        ReviewInput {
            review: self.review.clone(),
            rating: self.rating.clone(),
        }
    }
}

pub async fn create_form(
    State(state): State<HttpState>,
    Path(book_id): Path<i64>,
    jar: CookieJar,
) -> Response {
    let book = match load_book(&state, book_id).await {
        Ok(book) => book,
        Err(response) => return response,
    };

    let (jar, token) = csrf::issue(jar);
    let view = ReviewFormView::new(book.id, book.title.clone(), token);
    (jar, render_form(&book, view, StatusCode::OK)).into_response()
}

pub async fn store(
    State(state): State<HttpState>,
    Path(book_id): Path<i64>,
    jar: CookieJar,
    headers: HeaderMap,
    Form(form): Form<ReviewForm>,
) -> Response {
    if let Err(err) = csrf::verify(&jar, &headers, form.token.as_deref()) {
        return err.into_response();
    }
    let book = match load_book(&state, book_id).await {
        Ok(book) => book,
        Err(response) => return response,
    };

    match state.reviews.create_review(book.id, form.input()).await {
        Ok(_) => Redirect::to(&book_href(book.id)).into_response(),
        Err(ReviewError::Validation(errors)) => {
            let (jar, token) = csrf::issue(jar);
            let view = ReviewFormView::new(book.id, book.title.clone(), token)
                .with_old_input(&form.review, &form.rating)
                .with_errors(&errors);
            let mut response = render_form(&book, view, StatusCode::UNPROCESSABLE_ENTITY);
            ErrorReport::from_error(SOURCE, StatusCode::UNPROCESSABLE_ENTITY, &errors)
                .attach(&mut response);
            (jar, response).into_response()
        }
        Err(err) => review_error_response(err),
    }
}

pub async fn update(
    State(state): State<HttpState>,
    Path((book_id, review_id)): Path<(i64, i64)>,
    jar: CookieJar,
    headers: HeaderMap,
    Form(form): Form<ReviewForm>,
) -> Response {
    if let Err(err) = csrf::verify(&jar, &headers, form.token.as_deref()) {
        return err.into_response();
    }

    match state
        .reviews
        .update_review(book_id, review_id, form.input())
        .await
    {
        Ok(review) => Redirect::to(&book_href(review.book_id)).into_response(),
        Err(err) => review_error_response(err),
    }
}

pub async fn destroy(
    State(state): State<HttpState>,
    Path((book_id, review_id)): Path<(i64, i64)>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    if let Err(err) = csrf::verify(&jar, &headers, None) {
        return err.into_response();
    }

    match state.reviews.delete_review(book_id, review_id).await {
        Ok(review) => Redirect::to(&book_href(review.book_id)).into_response(),
        Err(err) => review_error_response(err),
    }
}

async fn load_book(state: &HttpState, book_id: i64) -> Result<BookRecord, Response> {
    match state.books.find(book_id).await {
        Ok(Some(book)) => Ok(book),
        Ok(None) => Err(render_not_found_response(format!("book {book_id} not found"))),
        Err(BookError::Repo(err)) => Err(repo_error_to_http(SOURCE, err).into_response()),
        Err(BookError::NotFound) | Err(BookError::Validation(_)) => {
            Err(render_not_found_response(format!("book {book_id} not found")))
        }
    }
}

fn render_form(book: &BookRecord, view: ReviewFormView, status: StatusCode) -> Response {
    render_template_response(
        ReviewFormTemplate {
            view: LayoutContext::new(format!("Review {}", book.title), view),
        },
        status,
    )
}

fn review_error_response(err: ReviewError) -> Response {
    match err {
        ReviewError::Validation(errors) => validation_response(SOURCE, &errors),
        ReviewError::NotFound => render_not_found_response("review not found"),
        ReviewError::Repo(repo) => repo_error_to_http(SOURCE, repo).into_response(),
    }
}
