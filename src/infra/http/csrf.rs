//! Double-submit CSRF tokens.
//!
//! Rendering a form issues (or reuses) the `bookshelf_csrf` cookie and
//! embeds the same value as the hidden `_token` field. Mutating routes
//! accept the request only when the submitted token equals the cookie.

use axum::http::{HeaderMap, StatusCode};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::application::error::HttpError;

pub const CSRF_COOKIE: &str = "bookshelf_csrf";
pub const CSRF_HEADER: &str = "x-csrf-token";
const SOURCE: &str = "infra::http::csrf";

/// Laravel-style "page expired".
pub fn token_mismatch_status() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::FORBIDDEN)
}

/// Returns the jar carrying the session token together with the token to
/// embed in the form.
pub fn issue(jar: CookieJar) -> (CookieJar, String) {
    if let Some(existing) = jar.get(CSRF_COOKIE)
        && !existing.value().is_empty()
    {
        let token = existing.value().to_string();
        return (jar, token);
    }

    let token = Uuid::new_v4().simple().to_string();
    let cookie = Cookie::build((CSRF_COOKIE, token.clone()))
        .http_only(true)
        .same_site(SameSite::Strict)
        .path("/");
    (jar.add(cookie), token)
}

/// Checks the submitted token (form field first, then header) against the
/// cookie.
pub fn verify(jar: &CookieJar, headers: &HeaderMap, form_token: Option<&str>) -> Result<(), HttpError> {
    let Some(expected) = jar.get(CSRF_COOKIE).map(|cookie| cookie.value()) else {
        return Err(mismatch("csrf cookie missing"));
    };

    let submitted = form_token
        .filter(|token| !token.is_empty())
        .or_else(|| headers.get(CSRF_HEADER).and_then(|value| value.to_str().ok()));
    let Some(submitted) = submitted else {
        return Err(mismatch("csrf token missing"));
    };

    if expected.is_empty() || !bool::from(expected.as_bytes().ct_eq(submitted.as_bytes())) {
        return Err(mismatch("csrf token mismatch"));
    }
    Ok(())
}

fn mismatch(detail: &'static str) -> HttpError {
    HttpError::new(SOURCE, token_mismatch_status(), "Page expired", detail)
}
