//! Response construction.
//!
//! # Responsibilities
//! - Turn an assembled stream into a streaming HTTP body
//! - Synthesize `Content-Type`, `Cache-Control`, `Vary` and `X-Cache`
//! - Tee a streamed page into the response cache once it completes
//!
//! # Design Decisions
//! - Streaming responses avoid buffering; the tee copies bytes as they pass
//! - Only a stream that ends cleanly is stored. An upstream error or a
//!   client disconnect leaves the cache untouched

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt};

use crate::cache::{CacheKey, CachePolicy, ResponseCache, ResponseSnapshot};
use crate::stream::AssembledStream;

pub const X_CACHE: &str = "x-cache";
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Value of the debug `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Headers for a page response, in the order they are written.
///
/// Routes without a policy are never shared: `private, no-cache`.
pub fn page_headers(content_type: &str, policy: Option<&CachePolicy>, authenticated: bool) -> Vec<(String, String)> {
    let mut headers = vec![(header::CONTENT_TYPE.to_string(), content_type.to_string())];
    match policy {
        Some(policy) => {
            headers.push((header::CACHE_CONTROL.to_string(), policy.cache_control(authenticated)));
            if let Some(vary) = policy.vary_header() {
                headers.push((header::VARY.to_string(), vary));
            }
        }
        None => headers.push((header::CACHE_CONTROL.to_string(), "private, no-cache".to_string())),
    }
    headers
}

/// Where a completed page goes.
#[derive(Debug, Clone)]
pub struct CacheTee {
    pub cache: ResponseCache,
    pub key: CacheKey,
    pub max_age_secs: u64,
}

/// Streaming response over `body`. With a tee, a 200 that ends cleanly is
/// stored under the tee's key.
pub fn streaming_response(
    status: StatusCode,
    headers: Vec<(String, String)>,
    cache_status: Option<CacheStatus>,
    body: AssembledStream,
    tee: Option<CacheTee>,
) -> Response {
    let body = match tee.filter(|_| status == StatusCode::OK) {
        Some(tee) => Body::from_stream(teed(body, tee, status, headers.clone())),
        None => Body::from_stream(body),
    };
    build(status, &headers, cache_status, body)
}

/// Buffered response, for data-only routes and cached entries.
pub fn full_response(
    status: StatusCode,
    headers: &[(String, String)],
    cache_status: Option<CacheStatus>,
    body: Bytes,
) -> Response {
    build(status, headers, cache_status, Body::from(body))
}

fn build(status: StatusCode, headers: &[(String, String)], cache_status: Option<CacheStatus>, body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    let map = response.headers_mut();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::from_str(value)) {
            map.insert(name, value);
        }
    }
    if let Some(cache_status) = cache_status {
        map.insert(X_CACHE, HeaderValue::from_static(cache_status.as_str()));
    }
    response
}

/// Overwrite `X-Cache` and `Cache-Control` on a response rebuilt from the cache.
pub fn mark_hit(mut response: Response, cache_control: &str, debug_headers: bool) -> Response {
    let map = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(cache_control) {
        map.insert(header::CACHE_CONTROL, value);
    }
    if debug_headers {
        map.insert(X_CACHE, HeaderValue::from_static(CacheStatus::Hit.as_str()));
    }
    response
}

struct TeeState {
    inner: AssembledStream,
    buffer: BytesMut,
    tee: Option<CacheTee>,
    status: u16,
    headers: Vec<(String, String)>,
}

fn teed(
    inner: AssembledStream,
    tee: CacheTee,
    status: StatusCode,
    headers: Vec<(String, String)>,
) -> AssembledStream {
    let state = TeeState {
        inner,
        buffer: BytesMut::new(),
        tee: Some(tee),
        status: status.as_u16(),
        headers,
    };
    stream::unfold(state, |mut state| async move {
        match state.inner.next().await {
            Some(Ok(chunk)) => {
                if state.tee.is_some() {
                    state.buffer.extend_from_slice(&chunk);
                }
                Some((Ok(chunk), state))
            }
            Some(Err(e)) => {
                state.tee = None;
                Some((Err(e), state))
            }
            None => {
                if let Some(tee) = state.tee.take() {
                    let snapshot = ResponseSnapshot {
                        status: state.status,
                        headers: std::mem::take(&mut state.headers),
                        body: state.buffer.split().freeze(),
                    };
                    tracing::debug!(key = %tee.key, bytes = snapshot.body.len(), "Storing streamed response");
                    tee.cache.set(&tee.key, snapshot, tee.max_age_secs).await;
                }
                None
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use crate::stream::StreamError;

    fn chunks(parts: Vec<Result<&'static str, &'static str>>) -> AssembledStream {
        stream::iter(parts.into_iter().map(|p| match p {
            Ok(s) => Ok(Bytes::from_static(s.as_bytes())),
            Err(e) => Err(StreamError::Upstream(RenderError::Failed(e.to_string()))),
        }))
        .boxed()
    }

    fn tee(cache: &ResponseCache) -> CacheTee {
        CacheTee {
            cache: cache.clone(),
            key: CacheKey::generate("/page", Vec::<(String, String)>::new()),
            max_age_secs: 60,
        }
    }

    #[test]
    fn test_page_headers() {
        let policy = CachePolicy {
            vary: vec!["Accept-Language".into()],
            ..Default::default()
        };
        let headers = page_headers(HTML_CONTENT_TYPE, Some(&policy), false);
        assert_eq!(headers[1], ("cache-control".to_string(), "private, max-age=60".to_string()));
        assert_eq!(headers[2], ("vary".to_string(), "Accept-Language".to_string()));

        let uncached = page_headers(HTML_CONTENT_TYPE, None, false);
        assert_eq!(uncached.len(), 2);
    }

    #[tokio::test]
    async fn test_tee_stores_complete_stream() {
        let cache = ResponseCache::new(4);
        let headers = page_headers(HTML_CONTENT_TYPE, None, false);
        let mut stream = teed(chunks(vec![Ok("<p>"), Ok("hi</p>")]), tee(&cache), StatusCode::OK, headers);
        while stream.next().await.is_some() {}

        let cached = cache.get(&tee(&cache).key).await.unwrap();
        assert_eq!(cached.body().as_ref(), b"<p>hi</p>");
        assert_eq!(cached.status(), 200);
    }

    #[tokio::test]
    async fn test_tee_skips_failed_stream() {
        let cache = ResponseCache::new(4);
        let mut stream = teed(chunks(vec![Ok("<p>"), Err("boom")]), tee(&cache), StatusCode::OK, Vec::new());
        while stream.next().await.is_some() {}
        assert!(cache.get(&tee(&cache).key).await.is_none());
    }

    #[test]
    fn test_x_cache_header() {
        let response = full_response(StatusCode::OK, &[], Some(CacheStatus::Miss), Bytes::new());
        assert_eq!(response.headers()[X_CACHE], "MISS");
    }
}
