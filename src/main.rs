use std::{process, sync::Arc};

use bookshelf::{
    application::{
        books::BookService,
        error::AppError,
        repos::{BooksRepo, BooksWriteRepo, ReviewsRepo, ReviewsWriteRepo},
        reviews::ReviewService,
    },
    cache::CacheConfig,
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        memory::MemoryRepositories,
        telemetry,
    },
};
use time::OffsetDateTime;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Books(args) => run_books(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings);
    serve_http(&settings, state).await
}

async fn run_books(settings: config::Settings, args: config::BooksArgs) -> Result<(), AppError> {
    let query = args
        .listing_params()
        .into_query(OffsetDateTime::now_utc())?;
    // A fresh in-memory store is always empty.
    settings.database.require_url()?;

    let repositories = init_repositories(&settings).await?;
    let books = BookService::new(
        repositories.books,
        repositories.books_write,
        repositories.reviews,
    );
    let listing = books.list(&query).await?;

    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

/// Repository handles for one backing store.
struct Repositories {
    books: Arc<dyn BooksRepo>,
    books_write: Arc<dyn BooksWriteRepo>,
    reviews: Arc<dyn ReviewsRepo>,
    reviews_write: Arc<dyn ReviewsWriteRepo>,
    postgres: Option<Arc<PostgresRepositories>>,
}

impl Repositories {
    fn from_store<S>(store: Arc<S>, postgres: Option<Arc<PostgresRepositories>>) -> Self
    where
        S: BooksRepo + BooksWriteRepo + ReviewsRepo + ReviewsWriteRepo + 'static,
    {
        Self {
            books: store.clone(),
            books_write: store.clone(),
            reviews: store.clone(),
            reviews_write: store,
            postgres,
        }
    }
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target: "bookshelf::bootstrap",
            "database url is not configured; using the volatile in-memory store"
        );
        return Ok(Repositories::from_store(
            Arc::new(MemoryRepositories::new()),
            None,
        ));
    };

    let postgres = Arc::new(PostgresRepositories::open(database_url, &settings.database).await?);
    Ok(Repositories::from_store(postgres.clone(), Some(postgres)))
}

fn build_http_state(repositories: Repositories, settings: &config::Settings) -> HttpState {
    let cache = CacheConfig::from(&settings.cache).build();

    let books = Arc::new(
        BookService::new(
            repositories.books,
            repositories.books_write,
            repositories.reviews.clone(),
        )
        .with_cache_opt(cache.clone()),
    );
    let reviews = Arc::new(
        ReviewService::new(repositories.reviews, repositories.reviews_write)
            .with_cache_opt(cache),
    );

    HttpState {
        books,
        reviews,
        db: repositories.postgres,
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let addr = settings.server.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| InfraError::bind(addr, err))?;
    info!(
        target: "bookshelf::bootstrap",
        addr = %addr,
        cache_enabled = settings.cache.enabled,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(InfraError::Serve)?;

    Ok(())
}
