use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Tags the request with an id and echoes it back as `x-request-id`.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Logs every 4xx at `warn` and 5xx at `error`, using the attached
/// [`ErrorReport`] when the handler left one.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let report = response.extensions_mut().remove::<ErrorReport>();
        log_failure(FailedRequest {
            status,
            method: &method,
            uri: &uri,
            request_id: &request_id,
            elapsed_ms: start.elapsed().as_millis(),
            report,
        });
    }

    response
}

struct FailedRequest<'a> {
    status: StatusCode,
    method: &'a Method,
    uri: &'a Uri,
    request_id: &'a str,
    elapsed_ms: u128,
    report: Option<ErrorReport>,
}

fn log_failure(failed: FailedRequest<'_>) {
    let (source, messages) = match failed.report {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .map(String::as_str)
        .unwrap_or("no diagnostic available");
    let query = failed.uri.query().unwrap_or("");

    if failed.status.is_server_error() {
        error!(
            target: "bookshelf::http::response",
            status = failed.status.as_u16(),
            method = %failed.method,
            path = %failed.uri.path(),
            query,
            elapsed_ms = failed.elapsed_ms,
            source,
            detail,
            chain = ?messages,
            request_id = failed.request_id,
            "request failed"
        );
    } else {
        warn!(
            target: "bookshelf::http::response",
            status = failed.status.as_u16(),
            method = %failed.method,
            path = %failed.uri.path(),
            query,
            elapsed_ms = failed.elapsed_ms,
            source,
            detail,
            chain = ?messages,
            request_id = failed.request_id,
            "client request error"
        );
    }
}
