use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};

use crate::application::books::BookDetail;
use crate::application::error::{ErrorReport, HttpError};
use crate::application::query::{BookListing, Preset, SortKey};
use crate::domain::entities::ReviewRecord;
use crate::domain::rating::Rating;
use crate::domain::validation::FieldErrors;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(message: impl Into<String>) -> Response {
    let message = message.into();
    let view = LayoutContext::new("Not Found", ErrorPageView::not_found(message.clone()));
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        message,
    )
    .attach(&mut response);
    response
}

/// Page wrapper shared by every full-page template.
#[derive(Clone)]
pub struct LayoutContext<T> {
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(title: impl Into<String>, content: T) -> Self {
        Self {
            title: title.into(),
            content,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    fn new(value: impl Into<String>, label: impl Into<String>, current: &str) -> Self {
        let value = value.into();
        let selected = value == current;
        Self {
            value,
            label: label.into(),
            selected,
        }
    }
}

/// Listing filters echoed back into the filter form.
#[derive(Clone, Debug, Default)]
pub struct ListingFilterView {
    pub title: String,
    pub filter: String,
    pub sort: String,
    pub from: String,
    pub to: String,
    pub min_reviews: String,
}

impl ListingFilterView {
    pub fn preset_options(&self) -> Vec<SelectOption> {
        let mut options = vec![SelectOption::new("", "All books", &self.filter)];
        options.extend(
            Preset::ALL
                .iter()
                .map(|preset| SelectOption::new(preset.as_str(), preset.label(), &self.filter)),
        );
        options
    }

    pub fn sort_options(&self) -> Vec<SelectOption> {
        vec![
            SelectOption::new("", "Default", &self.sort),
            SelectOption::new(SortKey::Popularity.as_str(), "Most reviewed", &self.sort),
            SelectOption::new(SortKey::Rating.as_str(), "Highest rated", &self.sort),
        ]
    }
}

#[derive(Clone, Debug)]
pub struct BookRowView {
    pub href: String,
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub reviews_count: Option<String>,
    pub average: Option<String>,
}

impl From<&BookListing> for BookRowView {
    fn from(listing: &BookListing) -> Self {
        Self {
            href: book_href(listing.book.id),
            book_id: listing.book.book_id.clone(),
            title: listing.book.title.clone(),
            author: listing.book.author.clone(),
            reviews_count: listing.reviews_count.map(|count| count.to_string()),
            average: listing.reviews_avg_rating.map(|avg| avg.to_string()),
        }
    }
}

/// Old input and messages for the create-book form.
#[derive(Clone, Debug, Default)]
pub struct BookFormView {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub book_id_error: Option<String>,
    pub title_error: Option<String>,
    pub author_error: Option<String>,
}

impl BookFormView {
    pub fn with_errors(mut self, errors: &FieldErrors) -> Self {
        self.book_id_error = errors.get("book_id").map(str::to_string);
        self.title_error = errors.get("title").map(str::to_string);
        self.author_error = errors.get("author").map(str::to_string);
        self
    }
}

#[derive(Clone, Debug)]
pub struct BookIndexView {
    pub filters: ListingFilterView,
    pub preset_options: Vec<SelectOption>,
    pub sort_options: Vec<SelectOption>,
    pub books: Vec<BookRowView>,
    pub show_count: bool,
    pub show_average: bool,
    pub listing_error: Option<String>,
    pub form: BookFormView,
    pub csrf_token: String,
}

impl BookIndexView {
    pub fn new(filters: ListingFilterView, listings: &[BookListing], csrf_token: String) -> Self {
        let books: Vec<BookRowView> = listings.iter().map(BookRowView::from).collect();
        let show_count = books.iter().any(|row| row.reviews_count.is_some());
        let show_average = books.iter().any(|row| row.average.is_some());
        Self {
            preset_options: filters.preset_options(),
            sort_options: filters.sort_options(),
            filters,
            books,
            show_count,
            show_average,
            listing_error: None,
            form: BookFormView::default(),
            csrf_token,
        }
    }

    pub fn with_listing_error(mut self, message: impl Into<String>) -> Self {
        self.listing_error = Some(message.into());
        self
    }

    pub fn with_form(mut self, form: BookFormView) -> Self {
        self.form = form;
        self
    }
}

#[derive(Template)]
#[template(path = "books/index.html")]
pub struct BookIndexTemplate {
    pub view: LayoutContext<BookIndexView>,
}

#[derive(Clone, Debug)]
pub struct ReviewView {
    pub rating: u8,
    pub stars: String,
    pub review: String,
    pub posted_on: String,
}

impl From<&ReviewRecord> for ReviewView {
    fn from(review: &ReviewRecord) -> Self {
        let rating = review.rating.get();
        Self {
            rating,
            stars: stars(rating),
            review: review.review.clone(),
            posted_on: format_date(review.created_at),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BookShowView {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub reviews_count: u64,
    pub average: String,
    pub reviews: Vec<ReviewView>,
    pub create_review_href: String,
}

impl From<&BookDetail> for BookShowView {
    fn from(detail: &BookDetail) -> Self {
        Self {
            book_id: detail.book.book_id.clone(),
            title: detail.book.title.clone(),
            author: detail.book.author.clone(),
            reviews_count: detail.reviews_count,
            average: detail.reviews_avg_rating.to_string(),
            reviews: detail.reviews.iter().map(ReviewView::from).collect(),
            create_review_href: format!("{}/reviews/create", book_href(detail.book.id)),
        }
    }
}

#[derive(Template)]
#[template(path = "books/show.html")]
pub struct BookShowTemplate {
    pub view: LayoutContext<BookShowView>,
}

/// The review form, blank on first render and carrying old input plus
/// per-field messages after a failed submission.
#[derive(Clone, Debug)]
pub struct ReviewFormView {
    pub action: String,
    pub back_href: String,
    pub book_title: String,
    pub review: String,
    pub rating_options: Vec<SelectOption>,
    pub review_error: Option<String>,
    pub rating_error: Option<String>,
    pub csrf_token: String,
}

impl ReviewFormView {
    pub fn new(book_id: i64, book_title: impl Into<String>, csrf_token: String) -> Self {
        Self {
            action: format!("{}/reviews", book_href(book_id)),
            back_href: book_href(book_id),
            book_title: book_title.into(),
            review: String::new(),
            rating_options: rating_options(""),
            review_error: None,
            rating_error: None,
            csrf_token,
        }
    }

    pub fn with_old_input(mut self, review: &str, rating: &str) -> Self {
        self.review = review.to_string();
        self.rating_options = rating_options(rating.trim());
        self
    }

    pub fn with_errors(mut self, errors: &FieldErrors) -> Self {
        self.review_error = errors.get("review").map(str::to_string);
        self.rating_error = errors.get("rating").map(str::to_string);
        self
    }
}

#[derive(Template)]
#[template(path = "books/reviews/create.html")]
pub struct ReviewFormTemplate {
    pub view: LayoutContext<ReviewFormView>,
}

#[derive(Clone, Debug)]
pub struct ErrorPageView {
    pub heading: String,
    pub message: String,
    pub back_href: String,
}

impl ErrorPageView {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            heading: "Not Found".to_string(),
            message: message.into(),
            back_href: "/books".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

pub fn book_href(id: i64) -> String {
    format!("/books/{id}")
}

fn rating_options(current: &str) -> Vec<SelectOption> {
    let mut options = vec![SelectOption::new("", "Choose a rating", current)];
    options.extend(
        Rating::all().map(|rating| SelectOption::new(rating.to_string(), stars(rating.get()), current)),
    );
    options
}

fn stars(rating: u8) -> String {
    let filled = usize::from(rating.min(Rating::MAX));
    let empty = usize::from(Rating::MAX) - filled;
    format!("{}{}", "★".repeat(filled), "☆".repeat(empty))
}

fn format_date(at: OffsetDateTime) -> String {
    at.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| at.date().to_string())
}
