mod support;

use axum::http::{Method, StatusCode, header};
use time::macros::datetime;
use tower::ServiceExt;

use bookshelf::cache::CacheKey;
use bookshelf::infra::http::REQUEST_ID_HEADER;
use support::{TOKEN, TestApp, body_to_string, form, get, with_header_token};

#[tokio::test]
async fn root_redirects_to_the_listing() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(get("/"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/books");
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn health_reports_no_content_without_a_database() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(get("/_health/db"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn windowed_listing_counts_only_reviews_inside_the_window() {
    let app = TestApp::new();
    let dune = app.book("DUNE", "Dune").await;
    app.review(dune.id, 5, datetime!(2024-01-10 0:00 UTC));
    app.review(dune.id, 3, datetime!(2024-05-01 0:00 UTC));

    let response = app
        .router
        .clone()
        .oneshot(get("/books?from=2024-01-01&to=2024-02-01"))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<td>1</td>"));
    assert!(body.contains("<td>5.0</td>"));

    let response = app
        .router
        .clone()
        .oneshot(get("/books"))
        .await
        .expect("router should respond");
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("<td>2</td>"));
    assert!(body.contains("<td>4.0</td>"));
}

#[tokio::test]
async fn title_filter_narrows_the_listing() {
    let app = TestApp::new();
    app.book("DUNE", "Dune").await;
    app.book("EMMA", "Emma").await;

    let response = app
        .router
        .clone()
        .oneshot(get("/books?title=DU"))
        .await
        .expect("router should respond");
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains(">Dune</a>"));
    assert!(!body.contains(">Emma</a>"));
}

#[tokio::test]
async fn unknown_preset_is_unprocessable() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(get("/books?filter=bogus"))
        .await
        .expect("router should respond");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("unknown listing filter"));
}

#[tokio::test]
async fn create_book_redirects_and_rejects_duplicates() {
    let app = TestApp::new();

    let response = app
        .router
        .clone()
        .oneshot(form(
            Method::POST,
            "/books",
            "book_id=DUNE&title=Dune&author=Frank+Herbert",
            TOKEN,
        ))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap()
        .to_string();
    assert!(location.starts_with("/books/"));

    let response = app
        .router
        .clone()
        .oneshot(form(
            Method::POST,
            "/books",
            "book_id=DUNE&title=Dune+Messiah&author=Frank+Herbert",
            TOKEN,
        ))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("The book id has already been taken."));
    assert!(body.contains(r#"value="Dune Messiah""#));
}

#[tokio::test]
async fn create_book_requires_a_token() {
    let app = TestApp::new();
    let response = app
        .router
        .clone()
        .oneshot(form(
            Method::POST,
            "/books",
            "book_id=DUNE&title=Dune&author=Frank+Herbert",
            "",
        ))
        .await
        .expect("router should respond");
    assert_eq!(response.status().as_u16(), 419);
}

#[tokio::test]
async fn updating_a_book_evicts_its_view() {
    let app = TestApp::new();
    let dune = app.book("DUNE", "Dune").await;
    let key = CacheKey::book(dune.id);

    app.router
        .clone()
        .oneshot(get(&format!("/books/{}", dune.id)))
        .await
        .expect("router should respond");
    assert!(app.cache.contains(&key));

    let response = app
        .router
        .clone()
        .oneshot(form(
            Method::PUT,
            &format!("/books/{}", dune.id),
            "book_id=DUNE&title=Dune+Deluxe&author=Frank+Herbert",
            TOKEN,
        ))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(!app.cache.contains(&key));

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/books/{}", dune.id)))
        .await
        .expect("router should respond");
    let body = body_to_string(response.into_body()).await;
    assert!(body.contains("Dune Deluxe"));
}

#[tokio::test]
async fn invalid_update_is_unprocessable() {
    let app = TestApp::new();
    let dune = app.book("DUNE", "Dune").await;

    let response = app
        .router
        .clone()
        .oneshot(form(
            Method::PUT,
            &format!("/books/{}", dune.id),
            "book_id=DUNE&title=&author=Frank+Herbert",
            TOKEN,
        ))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_to_string(response.into_body()).await;
    assert_eq!(body, "The title field is required.");
}

#[tokio::test]
async fn deleting_a_book_cascades_and_evicts() {
    let app = TestApp::new();
    let dune = app.book("DUNE", "Dune").await;
    app.review(dune.id, 4, datetime!(2024-01-10 0:00 UTC));
    app.router
        .clone()
        .oneshot(get(&format!("/books/{}", dune.id)))
        .await
        .expect("router should respond");

    let response = app
        .router
        .clone()
        .oneshot(with_header_token(
            Method::DELETE,
            &format!("/books/{}", dune.id),
            TOKEN,
        ))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(app.cache.is_empty());
    assert_eq!(app.repos.review_count(), 0);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/books/{}", dune.id)))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
