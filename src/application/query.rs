//! Composable book listing queries.
//!
//! A [`BookQuery`] accumulates a title filter, review aggregates restricted to
//! date windows, an ordering and a minimum review threshold. It is
//! materialized exactly once: the Postgres adapter compiles it to SQL and the
//! in-memory adapter evaluates it with [`BookQuery::apply`].

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use time::{
    Date, Month, OffsetDateTime, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::domain::entities::{BookRecord, ReviewRecord};

/// Inclusive bounds on a review's `created_at`. A missing side is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DateWindow {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
}

impl DateWindow {
    pub const ALL: Self = Self {
        from: None,
        to: None,
    };

    pub const fn new(from: Option<OffsetDateTime>, to: Option<OffsetDateTime>) -> Self {
        Self { from, to }
    }

    pub const fn between(from: OffsetDateTime, to: OffsetDateTime) -> Self {
        Self::new(Some(from), Some(to))
    }

    /// `[now - months, now]`.
    pub fn trailing_months(now: OffsetDateTime, months: u32) -> Self {
        Self::new(subtract_months(now, months), Some(now))
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

/// Calendar month subtraction. The day clamps to the length of the target
/// month, so 31 March minus one month is the last day of February.
/// Returns `None` when the result leaves the representable year range.
pub fn subtract_months(at: OffsetDateTime, months: u32) -> Option<OffsetDateTime> {
    let date = at.date();
    let index = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1
        - i64::from(months);
    let year = i32::try_from(index.div_euclid(12)).ok()?;
    let month = Month::try_from(u8::try_from(index.rem_euclid(12) + 1).ok()?).ok()?;
    let day = date.day().min(days_in_month(year, month));
    let date = Date::from_calendar_date(year, month, day).ok()?;
    Some(at.replace_date(date))
}

fn days_in_month(year: i32, month: Month) -> u8 {
    match month {
        Month::February if time::util::is_leap_year(year) => 29,
        Month::February => 28,
        Month::April | Month::June | Month::September | Month::November => 30,
        _ => 31,
    }
}

/// Mean rating of a set of reviews. An empty set is `Unrated`, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AverageRating {
    Unrated,
    Mean(f64),
}

impl AverageRating {
    pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
        let (sum, count) = ratings
            .into_iter()
            .fold((0_u64, 0_u64), |(sum, count), rating| {
                (sum + u64::from(rating), count + 1)
            });
        if count == 0 {
            Self::Unrated
        } else {
            Self::Mean(sum as f64 / count as f64)
        }
    }

    /// Descending order with unrated entries after every rated one.
    pub fn cmp_descending(a: Self, b: Self) -> Ordering {
        match (a, b) {
            (Self::Mean(a), Self::Mean(b)) => b.total_cmp(&a),
            (Self::Mean(_), Self::Unrated) => Ordering::Less,
            (Self::Unrated, Self::Mean(_)) => Ordering::Greater,
            (Self::Unrated, Self::Unrated) => Ordering::Equal,
        }
    }
}

impl fmt::Display for AverageRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unrated => f.write_str("unrated"),
            Self::Mean(value) => write!(f, "{value:.1}"),
        }
    }
}

/// One row of a materialized listing. Aggregates are present only when the
/// query annotated them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookListing {
    #[serde(flatten)]
    pub book: BookRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_avg_rating: Option<AverageRating>,
}

impl BookListing {
    pub fn average(&self) -> AverageRating {
        self.reviews_avg_rating.unwrap_or(AverageRating::Unrated)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortKey {
    Popularity,
    Rating,
}

impl SortKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Popularity => "popular",
            Self::Rating => "rating",
        }
    }
}

impl FromStr for SortKey {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "popular" | "popularity" => Ok(Self::Popularity),
            "rating" | "highest_rated" => Ok(Self::Rating),
            other => Err(ListingError::UnknownSort(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookQuery {
    title: Option<String>,
    count_window: Option<DateWindow>,
    average_window: Option<DateWindow>,
    order: Vec<SortKey>,
    min_reviews: Option<u64>,
}

impl BookQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Case-insensitive substring match on the title.
    pub fn filter_by_title(mut self, needle: impl Into<String>) -> Self {
        self.title = Some(needle.into());
        self
    }

    pub fn with_review_count(mut self, window: DateWindow) -> Self {
        self.count_window = Some(window);
        self
    }

    pub fn with_average_rating(mut self, window: DateWindow) -> Self {
        self.average_window = Some(window);
        self
    }

    pub fn order_by_popularity(self, window: DateWindow) -> Self {
        self.with_review_count(window).push_sort(SortKey::Popularity)
    }

    pub fn order_by_rating(self, window: DateWindow) -> Self {
        self.with_average_rating(window).push_sort(SortKey::Rating)
    }

    /// Keeps books with at least `count` reviews. Repeated calls keep the
    /// strictest threshold.
    pub fn min_reviews(mut self, count: u64) -> Self {
        self.min_reviews = Some(self.min_reviews.map_or(count, |current| current.max(count)));
        self
    }

    pub fn popular_last_month(self, now: OffsetDateTime) -> Self {
        let window = DateWindow::trailing_months(now, 1);
        self.order_by_popularity(window)
            .order_by_rating(window)
            .min_reviews(2)
    }

    pub fn popular_last_6_months(self, now: OffsetDateTime) -> Self {
        let window = DateWindow::trailing_months(now, 6);
        self.order_by_popularity(window)
            .order_by_rating(window)
            .min_reviews(5)
    }

    pub fn highest_rated_last_month(self, now: OffsetDateTime) -> Self {
        let window = DateWindow::trailing_months(now, 1);
        self.order_by_rating(window)
            .order_by_popularity(window)
            .min_reviews(2)
    }

    pub fn highest_rated_last_6_months(self, now: OffsetDateTime) -> Self {
        let window = DateWindow::trailing_months(now, 6);
        self.order_by_rating(window)
            .order_by_popularity(window)
            .min_reviews(5)
    }

    fn push_sort(mut self, key: SortKey) -> Self {
        if !self.order.contains(&key) {
            self.order.push(key);
        }
        self
    }

    pub fn title_filter(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Window of the count annotation. A threshold without an explicit count
    /// annotation counts every review.
    pub fn count_window(&self) -> Option<DateWindow> {
        self.count_window
            .or_else(|| self.min_reviews.map(|_| DateWindow::ALL))
    }

    pub fn average_window(&self) -> Option<DateWindow> {
        self.average_window
    }

    pub fn sort_keys(&self) -> &[SortKey] {
        &self.order
    }

    pub fn review_threshold(&self) -> Option<u64> {
        self.min_reviews
    }

    /// Total order used by every adapter: sort keys in call order, then id.
    pub fn compare(&self, a: &BookListing, b: &BookListing) -> Ordering {
        self.order
            .iter()
            .map(|key| match key {
                SortKey::Popularity => b.reviews_count.cmp(&a.reviews_count),
                SortKey::Rating => AverageRating::cmp_descending(a.average(), b.average()),
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.book.id.cmp(&b.book.id))
    }

    /// Evaluates the query over in-memory records.
    pub fn apply(&self, books: &[BookRecord], reviews: &[ReviewRecord]) -> Vec<BookListing> {
        let mut by_book: HashMap<i64, Vec<&ReviewRecord>> = HashMap::new();
        for review in reviews {
            by_book.entry(review.book_id).or_default().push(review);
        }

        let needle = self.title.as_deref().map(str::to_lowercase);
        let count_window = self.count_window();
        let average_window = self.average_window;

        let mut listings: Vec<BookListing> = books
            .iter()
            .filter(|book| {
                needle
                    .as_deref()
                    .is_none_or(|needle| book.title.to_lowercase().contains(needle))
            })
            .map(|book| {
                let own = by_book.get(&book.id).map(Vec::as_slice).unwrap_or_default();
                BookListing {
                    book: book.clone(),
                    reviews_count: count_window.map(|window| {
                        own.iter()
                            .filter(|review| window.contains(review.created_at))
                            .count() as u64
                    }),
                    reviews_avg_rating: average_window.map(|window| {
                        AverageRating::from_ratings(
                            own.iter()
                                .filter(|review| window.contains(review.created_at))
                                .map(|review| review.rating.get()),
                        )
                    }),
                }
            })
            .filter(|listing| {
                self.min_reviews
                    .is_none_or(|min| listing.reviews_count.unwrap_or(0) >= min)
            })
            .collect();

        listings.sort_by(|a, b| self.compare(a, b));
        listings
    }
}

/// Named listing presets exposed to the HTTP and CLI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    PopularLastMonth,
    PopularLast6Months,
    HighestRatedLastMonth,
    HighestRatedLast6Months,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::PopularLastMonth,
        Preset::PopularLast6Months,
        Preset::HighestRatedLastMonth,
        Preset::HighestRatedLast6Months,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PopularLastMonth => "popular_last_month",
            Self::PopularLast6Months => "popular_last_6months",
            Self::HighestRatedLastMonth => "highest_rated_last_month",
            Self::HighestRatedLast6Months => "highest_rated_last_6months",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::PopularLastMonth => "Popular last month",
            Self::PopularLast6Months => "Popular last 6 months",
            Self::HighestRatedLastMonth => "Highest rated last month",
            Self::HighestRatedLast6Months => "Highest rated last 6 months",
        }
    }

    pub fn apply(self, query: BookQuery, now: OffsetDateTime) -> BookQuery {
        match self {
            Self::PopularLastMonth => query.popular_last_month(now),
            Self::PopularLast6Months => query.popular_last_6_months(now),
            Self::HighestRatedLastMonth => query.highest_rated_last_month(now),
            Self::HighestRatedLast6Months => query.highest_rated_last_6_months(now),
        }
    }
}

impl FromStr for Preset {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == s)
            .ok_or_else(|| ListingError::UnknownPreset(s.to_string()))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListingError {
    #[error("unknown listing filter `{0}`")]
    UnknownPreset(String),
    #[error("unknown sort `{0}`, expected `popular` or `rating`")]
    UnknownSort(String),
    #[error("`{field}` must be an RFC 3339 timestamp or a YYYY-MM-DD date, got `{value}`")]
    InvalidDate { field: &'static str, value: String },
    #[error("`min_reviews` must be a non-negative integer, got `{0}`")]
    InvalidMinReviews(String),
}

/// Raw listing request as it arrives from a query string or the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingParams {
    pub title: Option<String>,
    pub preset: Option<String>,
    pub sort: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub min_reviews: Option<String>,
}

impl ListingParams {
    /// Builds the query. A preset wins over `sort`, `from`, `to` and
    /// `min_reviews`; without either the listing annotates both aggregates.
    pub fn into_query(self, now: OffsetDateTime) -> Result<BookQuery, ListingError> {
        let mut query = BookQuery::new();
        if let Some(title) = non_empty(self.title) {
            query = query.filter_by_title(title);
        }

        if let Some(name) = non_empty(self.preset) {
            let preset: Preset = name.parse()?;
            return Ok(preset.apply(query, now));
        }

        let window = DateWindow::new(
            parse_boundary("from", self.from)?,
            parse_boundary("to", self.to)?,
        );
        let sort = non_empty(self.sort)
            .map(|name| name.parse::<SortKey>())
            .transpose()?;
        query = match sort {
            Some(SortKey::Popularity) => query
                .order_by_popularity(window)
                .with_average_rating(window),
            Some(SortKey::Rating) => query.order_by_rating(window).with_review_count(window),
            None => query
                .with_review_count(window)
                .with_average_rating(window),
        };

        if let Some(raw) = non_empty(self.min_reviews) {
            let count = raw
                .parse::<u64>()
                .map_err(|_| ListingError::InvalidMinReviews(raw.clone()))?;
            query = query.min_reviews(count);
        }

        Ok(query)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_boundary(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<OffsetDateTime>, ListingError> {
    let Some(raw) = non_empty(raw) else {
        return Ok(None);
    };
    if let Ok(at) = OffsetDateTime::parse(&raw, &Rfc3339) {
        return Ok(Some(at));
    }
    Date::parse(&raw, format_description!("[year]-[month]-[day]"))
        .map(|date| Some(date.midnight().assume_utc()))
        .map_err(|_| ListingError::InvalidDate { field, value: raw })
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::domain::rating::Rating;

    const NOW: OffsetDateTime = datetime!(2024-06-15 12:00 UTC);

    fn book(id: i64, title: &str) -> BookRecord {
        BookRecord {
            id,
            book_id: format!("BK-{id}"),
            title: title.to_string(),
            author: "Author".to_string(),
            created_at: datetime!(2023-01-01 0:00 UTC),
            updated_at: datetime!(2023-01-01 0:00 UTC),
        }
    }

    fn review(id: i64, book_id: i64, rating: i64, at: OffsetDateTime) -> ReviewRecord {
        ReviewRecord {
            id,
            book_id,
            review: format!("review {id}"),
            rating: Rating::new(rating).unwrap(),
            created_at: at,
            updated_at: at,
        }
    }

    fn ids(listings: &[BookListing]) -> Vec<i64> {
        listings.iter().map(|listing| listing.book.id).collect()
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let from = datetime!(2024-01-01 0:00 UTC);
        let to = datetime!(2024-02-01 0:00 UTC);

        assert!(DateWindow::ALL.contains(datetime!(1999-01-01 0:00 UTC)));
        assert!(DateWindow::new(Some(from), None).contains(from));
        assert!(!DateWindow::new(Some(from), None).contains(from - time::Duration::SECOND));
        assert!(DateWindow::new(None, Some(to)).contains(to));
        assert!(!DateWindow::new(None, Some(to)).contains(to + time::Duration::SECOND));
        assert!(DateWindow::between(from, to).contains(from));
        assert!(DateWindow::between(from, to).contains(to));
        assert!(!DateWindow::between(from, to).contains(datetime!(2024-03-01 0:00 UTC)));
    }

    #[test]
    fn month_subtraction_clamps_the_day() {
        assert_eq!(
            subtract_months(datetime!(2024-03-31 10:30 UTC), 1),
            Some(datetime!(2024-02-29 10:30 UTC))
        );
        assert_eq!(
            subtract_months(datetime!(2023-03-31 0:00 UTC), 1),
            Some(datetime!(2023-02-28 0:00 UTC))
        );
        assert_eq!(
            subtract_months(datetime!(2024-05-15 0:00 UTC), 6),
            Some(datetime!(2023-11-15 0:00 UTC))
        );
        assert_eq!(
            DateWindow::trailing_months(NOW, 1),
            DateWindow::between(datetime!(2024-05-15 12:00 UTC), NOW)
        );
    }

    #[test]
    fn dune_counts_and_averages_follow_the_window() {
        let books = vec![book(1, "Dune")];
        let reviews = vec![
            review(1, 1, 5, datetime!(2024-01-10 0:00 UTC)),
            review(2, 1, 3, datetime!(2024-05-01 0:00 UTC)),
        ];
        let january =
            DateWindow::between(datetime!(2024-01-01 0:00 UTC), datetime!(2024-02-01 0:00 UTC));

        let windowed = BookQuery::new()
            .with_review_count(january)
            .with_average_rating(january)
            .apply(&books, &reviews);
        assert_eq!(windowed[0].reviews_count, Some(1));
        assert_eq!(windowed[0].reviews_avg_rating, Some(AverageRating::Mean(5.0)));

        let all_time = BookQuery::new()
            .with_review_count(DateWindow::ALL)
            .with_average_rating(DateWindow::ALL)
            .apply(&books, &reviews);
        assert_eq!(all_time[0].reviews_count, Some(2));
        assert_eq!(all_time[0].reviews_avg_rating, Some(AverageRating::Mean(4.0)));
    }

    #[test]
    fn empty_window_is_unrated_rather_than_zero() {
        let books = vec![book(1, "Dune")];
        let reviews = vec![review(1, 1, 4, datetime!(2020-01-01 0:00 UTC))];

        let listing = BookQuery::new()
            .with_review_count(DateWindow::trailing_months(NOW, 1))
            .with_average_rating(DateWindow::trailing_months(NOW, 1))
            .apply(&books, &reviews);

        assert_eq!(listing[0].reviews_count, Some(0));
        assert_eq!(listing[0].reviews_avg_rating, Some(AverageRating::Unrated));
    }

    #[test]
    fn title_filter_is_case_insensitive() {
        let books = vec![book(1, "Dune Messiah"), book(2, "Emma"), book(3, "dune")];
        let listing = BookQuery::new().filter_by_title("DUNE").apply(&books, &[]);
        assert_eq!(ids(&listing), vec![1, 3]);
        assert!(listing[0].reviews_count.is_none());

        let none = BookQuery::new().filter_by_title("zzz").apply(&books, &[]);
        assert!(none.is_empty());
    }

    #[test]
    fn min_reviews_after_popularity_keeps_qualifying_books() {
        let books = vec![book(1, "A"), book(2, "B"), book(3, "C")];
        let at = datetime!(2024-06-01 0:00 UTC);
        let reviews = vec![
            review(1, 1, 3, at),
            review(2, 2, 3, at),
            review(3, 2, 3, at),
            review(4, 2, 3, at),
        ];

        let listing = BookQuery::new()
            .order_by_popularity(DateWindow::ALL)
            .min_reviews(1)
            .apply(&books, &reviews);
        assert_eq!(ids(&listing), vec![2, 1]);

        let everyone = BookQuery::new()
            .order_by_popularity(DateWindow::ALL)
            .min_reviews(0)
            .apply(&books, &reviews);
        assert_eq!(ids(&everyone), vec![2, 1, 3]);
    }

    #[test]
    fn min_reviews_without_annotation_counts_on_demand() {
        let books = vec![book(1, "A"), book(2, "B")];
        let at = datetime!(2024-06-01 0:00 UTC);
        let reviews = vec![review(1, 1, 3, at), review(2, 1, 4, at)];

        let listing = BookQuery::new().min_reviews(2).apply(&books, &reviews);
        assert_eq!(ids(&listing), vec![1]);
        assert_eq!(listing[0].reviews_count, Some(2));
    }

    #[test]
    fn repeated_thresholds_keep_the_largest() {
        let query = BookQuery::new().min_reviews(5).min_reviews(2);
        assert_eq!(query.review_threshold(), Some(5));
    }

    #[test]
    fn unrated_books_sort_last_and_ties_break_on_id() {
        let books = vec![book(3, "C"), book(1, "A"), book(2, "B"), book(4, "D")];
        let at = datetime!(2024-06-01 0:00 UTC);
        let reviews = vec![review(1, 3, 4, at), review(2, 2, 4, at), review(3, 4, 5, at)];

        let listing = BookQuery::new()
            .order_by_rating(DateWindow::ALL)
            .apply(&books, &reviews);
        assert_eq!(ids(&listing), vec![4, 2, 3, 1]);
    }

    #[test]
    fn later_annotation_replaces_the_window() {
        let january =
            DateWindow::between(datetime!(2024-01-01 0:00 UTC), datetime!(2024-02-01 0:00 UTC));
        let query = BookQuery::new()
            .order_by_popularity(january)
            .with_review_count(DateWindow::ALL);
        assert_eq!(query.count_window(), Some(DateWindow::ALL));
        assert_eq!(query.sort_keys(), &[SortKey::Popularity]);
    }

    #[test]
    fn popular_last_month_matches_its_composition() {
        let window = DateWindow::trailing_months(NOW, 1);
        let expected = BookQuery::new()
            .order_by_popularity(window)
            .order_by_rating(window)
            .min_reviews(2);
        assert_eq!(BookQuery::new().popular_last_month(NOW), expected);
        assert_eq!(
            Preset::PopularLastMonth.apply(BookQuery::new(), NOW),
            expected
        );
    }

    #[test]
    fn highest_rated_preset_orders_by_rating_first() {
        let query = BookQuery::new().highest_rated_last_6_months(NOW);
        assert_eq!(query.sort_keys(), &[SortKey::Rating, SortKey::Popularity]);
        assert_eq!(query.review_threshold(), Some(5));
        assert_eq!(
            query.average_window(),
            Some(DateWindow::trailing_months(NOW, 6))
        );
    }

    #[test]
    fn popular_last_month_ranks_windowed_reviews() {
        let books = vec![book(1, "A"), book(2, "B"), book(3, "C")];
        let recent = datetime!(2024-06-01 0:00 UTC);
        let old = datetime!(2024-01-01 0:00 UTC);
        let reviews = vec![
            review(1, 1, 2, recent),
            review(2, 1, 2, recent),
            review(3, 2, 5, recent),
            review(4, 2, 5, recent),
            review(5, 3, 5, old),
            review(6, 3, 5, old),
            review(7, 3, 5, recent),
        ];

        let listing = BookQuery::new()
            .popular_last_month(NOW)
            .apply(&books, &reviews);
        assert_eq!(ids(&listing), vec![2, 1]);
        assert_eq!(listing[0].reviews_avg_rating, Some(AverageRating::Mean(5.0)));
    }

    #[test]
    fn preset_names_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(preset.as_str().parse::<Preset>(), Ok(preset));
        }
        assert!("popular_forever".parse::<Preset>().is_err());
    }

    #[test]
    fn params_default_to_all_time_aggregates() {
        let query = ListingParams::default().into_query(NOW).unwrap();
        assert_eq!(
            query,
            BookQuery::new()
                .with_review_count(DateWindow::ALL)
                .with_average_rating(DateWindow::ALL)
        );
    }

    #[test]
    fn params_preset_wins_over_sort() {
        let params = ListingParams {
            title: Some("du".into()),
            preset: Some("highest_rated_last_month".into()),
            sort: Some("popular".into()),
            min_reviews: Some("9".into()),
            ..ListingParams::default()
        };
        let query = params.into_query(NOW).unwrap();
        assert_eq!(query, BookQuery::new().filter_by_title("du").highest_rated_last_month(NOW));
    }

    #[test]
    fn params_parse_dates_and_thresholds() {
        let params = ListingParams {
            sort: Some("rating".into()),
            from: Some("2024-01-01".into()),
            to: Some("2024-02-01T00:00:00Z".into()),
            min_reviews: Some(" 3 ".into()),
            ..ListingParams::default()
        };
        let query = params.into_query(NOW).unwrap();
        let window =
            DateWindow::between(datetime!(2024-01-01 0:00 UTC), datetime!(2024-02-01 0:00 UTC));
        assert_eq!(
            query,
            BookQuery::new()
                .order_by_rating(window)
                .with_review_count(window)
                .min_reviews(3)
        );
    }

    #[test]
    fn params_reject_bad_input() {
        let bad_date = ListingParams {
            from: Some("last tuesday".into()),
            ..ListingParams::default()
        };
        assert!(matches!(
            bad_date.into_query(NOW),
            Err(ListingError::InvalidDate { field: "from", .. })
        ));

        let bad_sort = ListingParams {
            sort: Some("alphabetical".into()),
            ..ListingParams::default()
        };
        assert_eq!(
            bad_sort.into_query(NOW),
            Err(ListingError::UnknownSort("alphabetical".into()))
        );

        let bad_min = ListingParams {
            min_reviews: Some("-1".into()),
            ..ListingParams::default()
        };
        assert_eq!(
            bad_min.into_query(NOW),
            Err(ListingError::InvalidMinReviews("-1".into()))
        );
    }

    #[test]
    fn unrated_serializes_as_null() {
        let listing = BookListing {
            book: book(1, "Dune"),
            reviews_count: Some(0),
            reviews_avg_rating: Some(AverageRating::Unrated),
        };
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["reviews_count"], 0);
        assert!(json["reviews_avg_rating"].is_null());
        assert_eq!(json["title"], "Dune");
    }
}
