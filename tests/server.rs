//! End-to-end tests of the page pipeline over a live server.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use ssr_stream::config::{RouteConfig, SsrConfig};
use ssr_stream::http::HttpServer;
use ssr_stream::render::ShellRenderer;

mod common;

fn header(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers().get(name).map(|v| v.to_str().unwrap().to_string())
}

#[tokio::test]
async fn test_static_route_wins_over_dynamic() {
    let server = common::start_default(common::site_config()).await;
    let client = common::client();

    let res = client.get(server.url("/blog/new")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.text().await.unwrap().contains(r#"<main data-route="new-post">"#));

    let res = client.get(server.url("/blog/hello")).send().await.unwrap();
    let body = res.text().await.unwrap();
    assert!(body.contains(r#"<main data-route="post">"#));
    assert!(body.contains("<title>Post hello</title>"));
}

#[tokio::test]
async fn test_page_document_shape() {
    let server = common::start_default(common::site_config()).await;
    let res = common::client().get(server.url("/blog/hello?ref=feed")).send().await.unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(header(&res, "content-type").as_deref(), Some("text/html; charset=utf-8"));
    assert_eq!(header(&res, "cache-control").as_deref(), Some("private, no-cache"));
    assert!(header(&res, "x-request-id").is_some());
    assert!(header(&res, "x-cache").is_none());

    let body = res.text().await.unwrap();
    assert!(body.starts_with("<!DOCTYPE html><html"));
    assert_eq!(body.matches("<!DOCTYPE html>").count(), 1);
    assert!(!body.contains("<!--ssr-head-->"));
    assert!(!body.contains("<!--ssr-body-->"));
    assert!(body.contains(r#"<link rel="stylesheet" href="/assets/blog.css">"#));
    assert!(body.contains(r#"<link rel="modulepreload" href="/assets/post-1a2b.js">"#));
    assert!(body.contains("<script>window.__SSR_STATE__="));
    assert!(body.contains(r#"<script type="module" src="/assets/post-1a2b.js"></script>"#));

    let root = body.find(r#"data-layout="layout""#).unwrap();
    let blog = body.find(r#"data-layout="blog/layout""#).unwrap();
    assert!(root < blog);
    assert!(body.contains("<dd>Example</dd>"));
}

#[tokio::test]
async fn test_cache_miss_then_hit() {
    let server = common::start_default(common::site_config()).await;
    let client = common::client();

    let first = client.get(server.url("/docs/guide/intro")).send().await.unwrap();
    assert_eq!(header(&first, "x-cache").as_deref(), Some("MISS"));
    assert_eq!(header(&first, "cache-control").as_deref(), Some("private, max-age=60"));
    let first_body = first.text().await.unwrap();

    let second = client.get(server.url("/docs/guide/intro")).send().await.unwrap();
    assert_eq!(header(&second, "x-cache").as_deref(), Some("HIT"));
    assert_eq!(header(&second, "content-type").as_deref(), Some("text/html; charset=utf-8"));
    assert_eq!(second.text().await.unwrap(), first_body);
}

#[tokio::test]
async fn test_query_order_does_not_split_cache() {
    let server = common::start_default(common::site_config()).await;
    let client = common::client();

    let first = client.get(server.url("/docs/x?b=2&a=1")).send().await.unwrap();
    assert_eq!(header(&first, "x-cache").as_deref(), Some("MISS"));
    first.text().await.unwrap();

    let second = client.get(server.url("/docs/x?a=1&b=2")).send().await.unwrap();
    assert_eq!(header(&second, "x-cache").as_deref(), Some("HIT"));

    let other = client.get(server.url("/docs/x?a=1&b=3")).send().await.unwrap();
    assert_eq!(header(&other, "x-cache").as_deref(), Some("MISS"));
}

#[tokio::test]
async fn test_credentials_bypass_cache_entirely() {
    let store = Arc::new(common::CountingStore::new(16));
    let server = HttpServer::with_components(
        common::site_config(),
        Arc::new(ShellRenderer::default()),
        common::loaders(),
    )
    .unwrap()
    .with_cache_store(store.clone());
    let server = common::start(server).await;
    let client = common::client();

    for _ in 0..2 {
        let res = client
            .get(server.url("/docs/private"))
            .header("Authorization", "Bearer token")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert!(header(&res, "x-cache").is_none());
        assert_eq!(header(&res, "cache-control").as_deref(), Some("private, max-age=60"));
        res.text().await.unwrap();
    }

    let res = client
        .get(server.url("/docs/private"))
        .header("Cookie", "theme=dark; session=abc123")
        .send()
        .await
        .unwrap();
    assert!(header(&res, "x-cache").is_none());
    res.text().await.unwrap();

    assert_eq!(store.calls(), 0);

    let anonymous = client.get(server.url("/docs/private")).send().await.unwrap();
    assert_eq!(header(&anonymous, "x-cache").as_deref(), Some("MISS"));
    anonymous.text().await.unwrap();
    assert_eq!(store.calls(), 2);
}

#[tokio::test]
async fn test_unmatched_path_renders_not_found_page() {
    let server = common::start_default(common::site_config()).await;
    let res = common::client().get(server.url("/nope")).send().await.unwrap();

    assert_eq!(res.status(), 404);
    let body = res.text().await.unwrap();
    assert!(body.starts_with("<!DOCTYPE html>"));
    assert!(body.contains("<title>Not Found</title>"));
    assert!(body.contains("<h1>404</h1>"));
    assert!(body.contains("No page at /nope"));
}

#[tokio::test]
async fn test_loader_failure_renders_error_page() {
    let server = common::start_default(common::site_config()).await;
    let res = common::client().get(server.url("/broken")).send().await.unwrap();

    assert_eq!(res.status(), 500);
    let body = res.text().await.unwrap();
    assert!(body.contains("<h1>500</h1>"));
    assert!(!body.contains("database unreachable"));
}

#[tokio::test]
async fn test_data_only_route_returns_settled_json() {
    let server = common::start_default(common::site_config()).await;
    let res = common::client().get(server.url("/api/posts/hello")).send().await.unwrap();

    assert_eq!(res.status(), 200);
    assert_eq!(header(&res, "content-type").as_deref(), Some("application/json"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["route"], "api-post");
    assert_eq!(body["params"]["slug"], "hello");
    assert_eq!(body["data"]["slug"], "hello");
    assert_eq!(body["data"]["site"], "Example");
    assert_eq!(body["deferred"]["second"]["status"], "resolved");
    assert_eq!(body["deferred"]["second"]["value"], "two");
    assert_eq!(body["deferred"]["broken"]["status"], "rejected");
    assert_eq!(body["deferred"]["broken"]["error"], "comments offline");
}

#[tokio::test]
async fn test_request_id_is_preserved() {
    let server = common::start_default(common::site_config()).await;
    let res = common::client()
        .get(server.url("/blog/new"))
        .header("x-request-id", "req-42")
        .send()
        .await
        .unwrap();
    assert_eq!(header(&res, "x-request-id").as_deref(), Some("req-42"));
}

#[tokio::test]
async fn test_non_get_is_rejected() {
    let server = common::start_default(common::site_config()).await;
    let res = common::client().post(server.url("/blog/new")).send().await.unwrap();
    assert_eq!(res.status(), 405);
}

#[tokio::test]
async fn test_reload_swaps_route_table() {
    let server = common::start_default(common::site_config()).await;
    let client = common::client();

    let before = client.get(server.url("/fresh")).send().await.unwrap();
    assert_eq!(before.status(), 404);

    let mut next = SsrConfig::default();
    next.routes = vec![RouteConfig::new("fresh", "fresh")];
    server.updates.send(next).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let after = client.get(server.url("/fresh")).send().await.unwrap();
    assert_eq!(after.status(), 200);
    assert!(after.text().await.unwrap().contains(r#"<main data-route="fresh">"#));

    let gone = client.get(server.url("/blog/new")).send().await.unwrap();
    assert_eq!(gone.status(), 404);
}

#[tokio::test]
async fn test_reload_with_unknown_loader_keeps_site() {
    let server = common::start_default(common::site_config()).await;
    let client = common::client();

    let mut bad = SsrConfig::default();
    let mut route = RouteConfig::new("fresh", "fresh");
    route.loader = Some("missing".into());
    bad.routes = vec![route];
    server.updates.send(bad).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let res = client.get(server.url("/blog/new")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}
