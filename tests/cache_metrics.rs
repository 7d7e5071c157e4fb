mod support;

use std::collections::HashSet;

use axum::http::{Method, StatusCode};
use metrics_util::debugging::DebuggingRecorder;
use serial_test::serial;
use time::macros::datetime;
use tower::ServiceExt;

use bookshelf::cache::{
    METRIC_CACHE_FORGET_TOTAL, METRIC_CACHE_HIT_TOTAL, METRIC_CACHE_MISS_TOTAL,
};
use support::{TOKEN, TestApp, get, with_header_token};

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let app = TestApp::new();
    let dune = app.book("DUNE", "Dune").await;
    let review = app.review(dune.id, 5, datetime!(2024-01-10 0:00 UTC));

    // miss, then hit
    for _ in 0..2 {
        let response = app
            .router
            .clone()
            .oneshot(get(&format!("/books/{}", dune.id)))
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .router
        .clone()
        .oneshot(with_header_token(
            Method::DELETE,
            &format!("/books/{}/reviews/{}", dune.id, review.id),
            TOKEN,
        ))
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for metric in [
        METRIC_CACHE_HIT_TOTAL,
        METRIC_CACHE_MISS_TOTAL,
        METRIC_CACHE_FORGET_TOTAL,
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
