use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use time::OffsetDateTime;

use crate::application::books::{BookCommand, BookError};
use crate::application::error::{ErrorReport, HttpError};
use crate::application::query::{BookQuery, ListingParams};
use crate::presentation::views::{
    BookFormView, BookIndexTemplate, BookIndexView, BookShowTemplate, BookShowView,
    LayoutContext, ListingFilterView, book_href, render_not_found_response,
    render_template_response,
};

use super::{HttpState, csrf, repo_error_to_http, validation_response};

const SOURCE: &str = "infra::http::books";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ListingQuery {
    pub title: Option<String>,
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub min_reviews: Option<String>,
}

impl ListingQuery {
    fn filter_view(&self) -> ListingFilterView {
        ListingFilterView {
            title: self.title.clone().unwrap_or_default(),
            filter: self.filter.clone().unwrap_or_default(),
            sort: self.sort.clone().unwrap_or_default(),
            from: self.from.clone().unwrap_or_default(),
            to: self.to.clone().unwrap_or_default(),
            min_reviews: self.min_reviews.clone().unwrap_or_default(),
        }
    }
}

impl From<ListingQuery> for ListingParams {
    fn from(query: ListingQuery) -> Self {
        Self {
            title: query.title,
            preset: query.filter,
            sort: query.sort,
            from: query.from,
            to: query.to,
            min_reviews: query.min_reviews,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct BookForm {
    #[serde(default)]
    pub book_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "_token")]
    pub token: Option<String>,
}

impl BookForm {
    fn command(&self) -> BookCommand {
        BookCommand {
            book_id: self.book_id.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
        }
    }

    fn old_input(&self) -> BookFormView {
        BookFormView {
            book_id: self.book_id.clone(),
            title: self.title.clone(),
            author: self.author.clone(),
            ..BookFormView::default()
        }
    }
}

pub async fn index(
    State(state): State<HttpState>,
    jar: CookieJar,
    Query(query): Query<ListingQuery>,
) -> Response {
    let (jar, token) = csrf::issue(jar);
    let filters = query.filter_view();

    let listing = match ListingParams::from(query).into_query(OffsetDateTime::now_utc()) {
        Ok(listing) => listing,
        Err(err) => {
            let view = BookIndexView::new(filters, &[], token).with_listing_error(err.to_string());
            let mut response = render_index(view, StatusCode::UNPROCESSABLE_ENTITY);
            ErrorReport::from_error(SOURCE, StatusCode::UNPROCESSABLE_ENTITY, &err)
                .attach(&mut response);
            return (jar, response).into_response();
        }
    };

    match build_index(&state, filters, &listing, token).await {
        Ok(view) => (jar, render_index(view, StatusCode::OK)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn create(
    State(state): State<HttpState>,
    jar: CookieJar,
    headers: HeaderMap,
    Form(form): Form<BookForm>,
) -> Response {
    if let Err(err) = csrf::verify(&jar, &headers, form.token.as_deref()) {
        return err.into_response();
    }

    match state.books.create_book(form.command()).await {
        Ok(book) => Redirect::to(&book_href(book.id)).into_response(),
        Err(BookError::Validation(errors)) => {
            let (jar, token) = csrf::issue(jar);
            let view = match build_index(
                &state,
                ListingFilterView::default(),
                &ListingParams::default()
                    .into_query(OffsetDateTime::now_utc())
                    .unwrap_or_else(|_| BookQuery::new()),
                token,
            )
            .await
            {
                Ok(view) => view.with_form(form.old_input().with_errors(&errors)),
                Err(err) => return err.into_response(),
            };
            let mut response = render_index(view, StatusCode::UNPROCESSABLE_ENTITY);
            ErrorReport::from_error(SOURCE, StatusCode::UNPROCESSABLE_ENTITY, &errors)
                .attach(&mut response);
            (jar, response).into_response()
        }
        Err(err) => book_error_response(err),
    }
}

pub async fn show(State(state): State<HttpState>, Path(id): Path<i64>) -> Response {
    match state.books.detail(id).await {
        Ok(Some(detail)) => {
            let view = BookShowView::from(&detail);
            let title = view.title.clone();
            render_template_response(
                BookShowTemplate {
                    view: LayoutContext::new(title, view),
                },
                StatusCode::OK,
            )
        }
        Ok(None) => render_not_found_response(format!("book {id} not found")),
        Err(err) => book_error_response(err),
    }
}

pub async fn update(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
    jar: CookieJar,
    headers: HeaderMap,
    Form(form): Form<BookForm>,
) -> Response {
    if let Err(err) = csrf::verify(&jar, &headers, form.token.as_deref()) {
        return err.into_response();
    }

    match state.books.update_book(id, form.command()).await {
        Ok(book) => Redirect::to(&book_href(book.id)).into_response(),
        Err(err) => book_error_response(err),
    }
}

pub async fn destroy(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
    jar: CookieJar,
    headers: HeaderMap,
) -> Response {
    if let Err(err) = csrf::verify(&jar, &headers, None) {
        return err.into_response();
    }

    match state.books.delete_book(id).await {
        Ok(_) => Redirect::to("/books").into_response(),
        Err(err) => book_error_response(err),
    }
}

async fn build_index(
    state: &HttpState,
    filters: ListingFilterView,
    listing: &BookQuery,
    token: String,
) -> Result<BookIndexView, HttpError> {
    let books = state
        .books
        .list(listing)
        .await
        .map_err(|err| match err {
            BookError::Repo(repo) => repo_error_to_http(SOURCE, repo),
            other => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Listing failed",
                &other,
            ),
        })?;
    Ok(BookIndexView::new(filters, &books, token))
}

fn render_index(view: BookIndexView, status: StatusCode) -> Response {
    render_template_response(
        BookIndexTemplate {
            view: LayoutContext::new("Books", view),
        },
        status,
    )
}

fn book_error_response(err: BookError) -> Response {
    match err {
        BookError::Validation(errors) => validation_response(SOURCE, &errors),
        BookError::NotFound => render_not_found_response("book not found"),
        BookError::Repo(repo) => repo_error_to_http(SOURCE, repo).into_response(),
    }
}
