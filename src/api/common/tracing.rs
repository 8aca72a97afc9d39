//! Callbacks for the HTTP `TraceLayer`
//!
//! Every request gets an `http` span with method, path and request id.
//! Credentials never reach the logs: authorization, cookie and token
//! headers are printed as `[REDACTED]`.

use axum::http::{HeaderMap, Request, Response};
use std::fmt;
use std::time::Duration;
use tower_http::classify::ServerErrorsFailureClass;
use tracing::{info_span, Span};

const REDACTED: &str = "[REDACTED]";

fn is_sensitive(name: &str) -> bool {
    ["authorization", "cookie", "token"]
        .iter()
        .any(|needle| name.contains(needle))
}

/// Debug view over a header map that hides credentials.
struct SafeHeaders<'a>(&'a HeaderMap);

impl fmt::Debug for SafeHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.0 {
            if is_sensitive(name.as_str()) {
                map.entry(&name.as_str(), &REDACTED);
            } else {
                map.entry(&name.as_str(), &value.to_str().unwrap_or("<binary>"));
            }
        }
        map.finish()
    }
}

pub fn make_custom_span<B>(request: &Request<B>) -> Span {
    let headers = request.headers();
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = request_id,
        user_agent = ?headers.get("user-agent"),
    )
}

pub fn on_custom_request<B>(request: &Request<B>, _span: &Span) {
    tracing::debug!(
        query = ?request.uri().query(),
        headers = ?SafeHeaders(request.headers()),
        "request started"
    );
}

pub fn on_custom_response<B>(response: &Response<B>, latency: Duration, _span: &Span) {
    let status = response.status();
    let latency_ms = latency.as_millis();

    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), latency_ms, "request finished");
    } else if status.is_client_error() {
        tracing::warn!(status = status.as_u16(), latency_ms, "request finished");
    } else {
        tracing::info!(status = status.as_u16(), latency_ms, "request finished");
    }
}

pub fn on_custom_failure(failure: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
    match failure {
        ServerErrorsFailureClass::StatusCode(code) => tracing::error!(
            status = code.as_u16(),
            latency_ms = latency.as_millis(),
            "request failed"
        ),
        ServerErrorsFailureClass::Error(error) => tracing::error!(
            error = %error,
            latency_ms = latency.as_millis(),
            "request failed before a response was produced"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    #[test]
    fn credentials_are_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(header::COOKIE, HeaderValue::from_static("accessToken=abc"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let logged = format!("{:?}", SafeHeaders(&headers));
        assert!(!logged.contains("abc"), "{}", logged);
        assert!(logged.contains("\"authorization\": \"[REDACTED]\""), "{}", logged);
        assert!(logged.contains("\"accept\": \"application/json\""), "{}", logged);
    }
}
