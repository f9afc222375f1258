//! Response builders shared by the HTTP handlers

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use relay_core::CoreError;
use serde::Serialize;
use tracing::error;

pub type HttpResponse = Response<Full<Bytes>>;

/// Build a response with a body and content type
pub fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Create a plain-text response
pub fn text(status: StatusCode, body: impl Into<String>) -> HttpResponse {
    with_body(status, "text/plain; charset=utf-8", body.into())
}

/// Serialize `value` as a JSON response
pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> HttpResponse {
    match serde_json::to_vec(value) {
        Ok(body) => with_body(status, "application/json", body),
        Err(e) => {
            error!("Failed serializing response body: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error\n")
        }
    }
}

/// HTTP status for a registry error
pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        CoreError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Create an error response for a registry error
pub fn core_error(err: &CoreError) -> HttpResponse {
    text(status_for(err), format!("{}\n", err))
}

/// Create a 404 Not Found response
pub fn not_found(reason: &str) -> HttpResponse {
    text(StatusCode::NOT_FOUND, format!("Not Found: {}\n", reason))
}

/// Create a 405 Method Not Allowed response
pub fn method_not_allowed() -> HttpResponse {
    text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n")
}
