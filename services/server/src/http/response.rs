//! HTTP error helpers (spec.md §7). Unlike a typical JSON API, this wire
//! format is fixed by an external browser client: bodies are plain text,
//! and the unknown-SID body must contain the literal substring `Unknown
//! SID` the client's recovery path keys on.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::cors::CorsConfig;

pub type HttpResponse = Response;

fn plain_text(status: StatusCode, body: impl Into<String>) -> HttpResponse {
    (status, body.into()).into_response()
}

/// Echoes CORS headers onto `response` when `origin` matches `cors`. Every
/// handled request gets this, not only the streaming attach path (spec.md
/// §4.6 "common preamble for all handled requests") — notably the `Unknown
/// SID` body a cross-domain client's recovery path depends on is unreadable
/// without it.
pub fn with_cors(mut response: HttpResponse, cors: &CorsConfig, origin: Option<&str>) -> HttpResponse {
    cors.apply_headers(origin, response.headers_mut());
    response
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    plain_text(StatusCode::BAD_REQUEST, message)
}

/// 400 with the literal substring `Unknown SID` the client depends on
/// (spec.md §4.6 step 1, §8 S5).
pub fn unknown_sid() -> HttpResponse {
    plain_text(StatusCode::BAD_REQUEST, "Unknown SID")
}

pub fn channel_closed() -> HttpResponse {
    plain_text(StatusCode::BAD_REQUEST, "channel closed")
}

pub fn internal_error(message: impl Into<String>) -> HttpResponse {
    plain_text(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub fn not_found() -> HttpResponse {
    plain_text(StatusCode::NOT_FOUND, "not found")
}
