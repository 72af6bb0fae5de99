//! Uniform rejection responses.
//!
//! Every rejection issued by the pipeline goes through [`rejection`], so two
//! requests refused by different rules are byte-for-byte indistinguishable.
//! Bodies never carry the reason, a stack trace or a server fingerprint.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};

/// What kind of refusal to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Path refused; looks like an ordinary missing page.
    NotFound,
    /// Client banned or over its rate limit.
    TooManyRequests,
    /// Malformed or unauthenticated submission.
    BadRequest,
}

impl Rejection {
    pub fn status(self) -> StatusCode {
        match self {
            Rejection::NotFound => StatusCode::NOT_FOUND,
            Rejection::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Rejection::BadRequest => StatusCode::BAD_REQUEST,
        }
    }

    fn json_body(self) -> &'static str {
        match self {
            Rejection::NotFound => r#"{"error":"not_found"}"#,
            Rejection::TooManyRequests => r#"{"error":"too_many_requests"}"#,
            Rejection::BadRequest => r#"{"error":"bad_request"}"#,
        }
    }

    fn html_body(self) -> &'static str {
        match self {
            Rejection::NotFound => {
                "<!doctype html><html><head><title>Not Found</title></head><body><h1>Not Found</h1></body></html>"
            }
            Rejection::TooManyRequests => {
                "<!doctype html><html><head><title>Too Many Requests</title></head><body><h1>Too Many Requests</h1></body></html>"
            }
            Rejection::BadRequest => {
                "<!doctype html><html><head><title>Bad Request</title></head><body><h1>Bad Request</h1></body></html>"
            }
        }
    }
}

/// Whether `path` is API-style and should get a JSON body.
pub fn is_api_path(path: &str, api_prefix: &str) -> bool {
    path.to_lowercase().starts_with(&api_prefix.to_lowercase())
}

/// Build the rejection response.
pub fn rejection(kind: Rejection, api: bool) -> Response {
    let (body, content_type) = if api {
        (kind.json_body(), "application/json")
    } else {
        (kind.html_body(), "text/html; charset=utf-8")
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = kind.status();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}
