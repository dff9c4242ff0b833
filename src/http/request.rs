//! Request handling helpers.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) unless the client sent one
//! - Extract the pieces the page pipeline needs (path, query, request id)
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Query pairs keep their order; the cache key sorts them itself

use axum::http::{HeaderMap, HeaderValue, Request, Uri};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Keeps an incoming `x-request-id`, otherwise generates a UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdGenerator;

impl MakeRequestId for RequestIdGenerator {
    fn make_request_id<B>(&mut self, req: &Request<B>) -> Option<RequestId> {
        match req.headers().get(X_REQUEST_ID) {
            Some(value) => Some(RequestId::new(value.clone())),
            None => {
                let value = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
                Some(RequestId::new(value))
            }
        }
    }
}

/// Request id set by the middleware, or `"unknown"`.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Decoded query string pairs, in request order.
pub fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_or_keeps_request_id() {
        let mut generator = RequestIdGenerator;

        let plain = Request::builder().uri("/").body(()).unwrap();
        let generated = generator.make_request_id(&plain).unwrap();
        let text = generated.header_value().to_str().unwrap();
        assert!(Uuid::parse_str(text).is_ok());

        let tagged = Request::builder()
            .uri("/")
            .header(X_REQUEST_ID, "abc-123")
            .body(())
            .unwrap();
        let kept = generator.make_request_id(&tagged).unwrap();
        assert_eq!(kept.header_value(), "abc-123");
    }

    #[test]
    fn test_query_pairs() {
        let uri: Uri = "/search?q=rust%20lang&page=2&q=async".parse().unwrap();
        assert_eq!(
            query_pairs(&uri),
            vec![
                ("q".to_string(), "rust lang".to_string()),
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "async".to_string()),
            ]
        );
        assert!(query_pairs(&"/plain".parse().unwrap()).is_empty());
    }
}
