//! Per-route cache policy and header synthesis.

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

/// Caching rules attached to a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Serve from / store into the response cache.
    pub enabled: bool,

    /// Freshness window in seconds. Zero emits `no-cache` and stores nothing.
    pub max_age_secs: u64,

    /// Optional `stale-while-revalidate` window in seconds.
    pub stale_while_revalidate_secs: Option<u64>,

    /// Request header names the response varies on.
    pub vary: Vec<String>,

    /// Also cache requests carrying credentials.
    pub cache_authenticated: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: 60,
            stale_while_revalidate_secs: None,
            vary: Vec::new(),
            cache_authenticated: false,
        }
    }
}

impl CachePolicy {
    /// True when the cache must not be consulted at all for this request.
    pub fn should_bypass(&self, authenticated: bool) -> bool {
        !self.enabled || (authenticated && !self.cache_authenticated)
    }

    /// True when a fresh response may be written to the store.
    pub fn is_storable(&self) -> bool {
        self.enabled && self.max_age_secs > 0
    }

    /// `Cache-Control` value for a response to this request.
    pub fn cache_control(&self, authenticated: bool) -> String {
        let visibility = if self.cache_authenticated && !authenticated {
            "public"
        } else {
            "private"
        };
        let mut directives = vec![visibility.to_string()];
        if self.max_age_secs == 0 {
            directives.push("no-cache".to_string());
        } else {
            directives.push(format!("max-age={}", self.max_age_secs));
        }
        if let Some(swr) = self.stale_while_revalidate_secs {
            directives.push(format!("stale-while-revalidate={swr}"));
        }
        directives.join(", ")
    }

    /// `Vary` value, if any headers are configured.
    pub fn vary_header(&self) -> Option<String> {
        (!self.vary.is_empty()).then(|| self.vary.join(", "))
    }
}

/// True when the request carries an `Authorization` header or the session cookie.
pub fn is_authenticated(headers: &HeaderMap, session_cookie: &str) -> bool {
    if headers.contains_key(header::AUTHORIZATION) {
        return true;
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == session_cookie && !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bypass_rules() {
        let policy = CachePolicy::default();
        assert!(!policy.should_bypass(false));
        assert!(policy.should_bypass(true));

        let shared = CachePolicy {
            cache_authenticated: true,
            ..Default::default()
        };
        assert!(!shared.should_bypass(true));

        let disabled = CachePolicy {
            enabled: false,
            ..Default::default()
        };
        assert!(disabled.should_bypass(false));
    }

    #[test]
    fn test_cache_control() {
        let policy = CachePolicy {
            max_age_secs: 30,
            stale_while_revalidate_secs: Some(120),
            ..Default::default()
        };
        assert_eq!(
            policy.cache_control(false),
            "private, max-age=30, stale-while-revalidate=120"
        );

        let public = CachePolicy {
            cache_authenticated: true,
            ..Default::default()
        };
        assert_eq!(public.cache_control(false), "public, max-age=60");
        assert_eq!(public.cache_control(true), "private, max-age=60");

        let uncached = CachePolicy {
            max_age_secs: 0,
            ..Default::default()
        };
        assert_eq!(uncached.cache_control(false), "private, no-cache");
        assert!(!uncached.is_storable());
    }

    #[test]
    fn test_vary_header() {
        assert_eq!(CachePolicy::default().vary_header(), None);
        let policy = CachePolicy {
            vary: vec!["Accept-Language".into(), "Accept-Encoding".into()],
            ..Default::default()
        };
        assert_eq!(policy.vary_header().as_deref(), Some("Accept-Language, Accept-Encoding"));
    }

    #[test]
    fn test_authentication_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_authenticated(&headers, "session"));

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session="));
        assert!(!is_authenticated(&headers, "session"));

        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc"));
        assert!(is_authenticated(&headers, "session"));

        let mut bearer = HeaderMap::new();
        bearer.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        assert!(is_authenticated(&bearer, "session"));
    }
}
