//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::future::BoxFuture;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ssr_stream::cache::{CacheEntry, CacheError, CacheStore, MemoryStore};
use ssr_stream::config::{RouteConfig, SsrConfig};
use ssr_stream::http::HttpServer;
use ssr_stream::lifecycle::Shutdown;
use ssr_stream::render::{FnLoader, LoadError, LoadRequest, LoaderOutput, LoaderRegistry, Renderer, ShellRenderer};
use ssr_stream::stream::{FieldState, FragmentError};

/// A running server and the handles tests need.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub updates: mpsc::UnboundedSender<SsrConfig>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Bind an ephemeral port and serve `server` on it.
pub async fn start(server: HttpServer) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let (updates, config_updates) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let _ = server.run(listener, Some(config_updates), server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { addr, shutdown, updates }
}

pub async fn start_with(config: SsrConfig, renderer: Arc<dyn Renderer>, loaders: LoaderRegistry) -> TestServer {
    start(HttpServer::with_components(config, renderer, loaders).unwrap()).await
}

pub async fn start_default(config: SsrConfig) -> TestServer {
    start_with(config, Arc::new(ShellRenderer::default()), loaders()).await
}

/// Site used by most tests.
pub fn site_config() -> SsrConfig {
    let mut config = SsrConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();

    let mut post = RouteConfig::new("blog/[slug]", "post");
    post.loader = Some("post".into());
    post.chunk = Some("post-1a2b".into());
    post.stylesheets = vec!["blog.css".into()];

    let new_post = RouteConfig::new("blog/new", "new-post");

    let mut cached = RouteConfig::new("docs/[...path]", "docs");
    cached.cache = Some(Default::default());

    let mut api = RouteConfig::new("api/posts/[slug]", "api-post");
    api.kind = ssr_stream::routing::RouteKind::DataOnly;
    api.loader = Some("post".into());

    let mut broken = RouteConfig::new("broken", "broken");
    broken.loader = Some("failing".into());

    config.routes = vec![post, new_post, cached, api, broken];
    config.layouts = vec![
        ssr_stream::config::LayoutConfig {
            directory: String::new(),
            loader: Some("site".into()),
        },
        ssr_stream::config::LayoutConfig {
            directory: "blog".into(),
            loader: None,
        },
    ];
    config
}

fn delayed(ms: u64, value: serde_json::Value) -> FieldState {
    FieldState::pending(async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(value)
    })
}

/// Loaders referenced by `site_config`.
pub fn loaders() -> LoaderRegistry {
    let mut registry = LoaderRegistry::new();
    registry.register(
        "site",
        Arc::new(FnLoader::new(|_req: LoadRequest| async {
            Ok(LoaderOutput::new().with_value("site", json!("Example")).with_title("Example"))
        })),
    );
    registry.register(
        "post",
        Arc::new(FnLoader::new(|req: LoadRequest| async move {
            let slug = req.params.get("slug").cloned().unwrap_or_default();
            Ok(LoaderOutput::new()
                .with_value("slug", json!(slug))
                .with_title(format!("Post {slug}"))
                .with_field("first", delayed(300, json!("one")))
                .with_field("second", delayed(100, json!("two")))
                .with_field("third", delayed(200, json!("three")))
                .with_field(
                    "broken",
                    FieldState::pending(async { Err(FragmentError::from("comments offline")) }),
                ))
        })),
    );
    registry.register(
        "failing",
        Arc::new(FnLoader::new(|_req: LoadRequest| async {
            Err::<LoaderOutput, _>(LoadError::Failed("database unreachable".into()))
        })),
    );
    registry
}

/// Memory store that counts every call.
pub struct CountingStore {
    inner: MemoryStore,
    pub loads: AtomicUsize,
    pub stores: AtomicUsize,
}

impl CountingStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: MemoryStore::new(capacity),
            loads: AtomicUsize::new(0),
            stores: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.loads.load(Ordering::SeqCst) + self.stores.load(Ordering::SeqCst)
    }
}

impl CacheStore for CountingStore {
    fn load<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>, CacheError>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(key)
    }

    fn store(&self, entry: CacheEntry) -> BoxFuture<'_, Result<(), CacheError>> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(entry)
    }

    fn discard<'a>(&'a self, key: &'a str, inserted_at: SystemTime) -> BoxFuture<'a, Result<(), CacheError>> {
        self.inner.discard(key, inserted_at)
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        self.inner.clear()
    }
}
