//! HTTP server setup and the page pipeline.
//!
//! # Responsibilities
//! - Create Axum Router with the page handler as fallback
//! - Wire up middleware (request ID, tracing, timeout)
//! - Resolve route → cache → layouts + loaders → renderer → assembler
//! - Swap in a rebuilt site when the config file changes
//!
//! # Design Decisions
//! - Routing state lives in one `SiteState` behind `ArcSwap`; a request
//!   keeps the snapshot it started with
//! - Cache lookups happen before any loader runs
//! - Failures before the first byte render an error page through the same
//!   assembler; failures after it end the stream

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use futures_util::future::{join_all, try_join_all};
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::{is_authenticated, CacheKey, CachePolicy, CacheStore, ResponseCache, ResponseSnapshot};
use crate::config::{CacheConfig, ConfigError, SsrConfig, StreamConfig};
use crate::http::request::{query_pairs, request_id, RequestIdGenerator};
use crate::http::response::{
    full_response, mark_hit, page_headers, streaming_response, CacheStatus, CacheTee, HTML_CONTENT_TYPE,
    JSON_CONTENT_TYPE,
};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::render::{
    ComposedView, ErrorView, LoadRequest, LoaderOutput, LoaderRegistry, Markers, Renderer, ShellRenderer,
};
use crate::routing::{
    find_layout_hierarchy, LayoutHierarchy, LayoutSet, MatchResult, RouteAssets, RouteKind, RouteTree,
};
use crate::stream::{DeferredFragment, HeadTags, HydrationState, Injection, PartitionedData, StreamAssembler};

/// Everything derived from one version of the config file.
#[derive(Debug)]
pub struct SiteState {
    pub tree: RouteTree,
    pub layouts: LayoutSet,
    pub loaders: LoaderRegistry,
    pub stream: StreamConfig,
    pub assembler: StreamAssembler,
    pub cache: CacheConfig,
}

impl SiteState {
    /// Compile routes and resolve every loader ref against the config's
    /// static loaders plus `extra`.
    pub fn build(config: &SsrConfig, extra: &LoaderRegistry) -> Result<Self, ConfigError> {
        let tree = RouteTree::from_config(&config.routes, config.routing.match_cache_capacity)?;
        let layouts = LayoutSet::from_config(&config.layouts);

        let mut loaders = LoaderRegistry::from_config(&config.loaders);
        loaders.extend(extra);

        for route in tree.routes() {
            if let Some(loader) = &route.loader_ref {
                if !loaders.contains(loader) {
                    return Err(ConfigError::UnknownLoader {
                        tag: route.tag.clone(),
                        loader: loader.clone(),
                    });
                }
            }
        }
        for layout in &config.layouts {
            if let Some(loader) = &layout.loader {
                if !loaders.contains(loader) {
                    return Err(ConfigError::UnknownLoader {
                        tag: format!("layout:{}", layout.directory),
                        loader: loader.clone(),
                    });
                }
            }
        }

        Ok(Self {
            tree,
            layouts,
            loaders,
            assembler: StreamAssembler::new(&config.stream),
            stream: config.stream.clone(),
            cache: config.cache.clone(),
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub site: Arc<ArcSwap<SiteState>>,
    pub renderer: Arc<dyn Renderer>,
    pub cache: ResponseCache,
    /// Code-registered loaders, kept for rebuilds on reload.
    pub extra_loaders: LoaderRegistry,
}

/// HTTP server for streamed pages.
pub struct HttpServer {
    config: SsrConfig,
    state: AppState,
}

impl HttpServer {
    /// Server with the built-in shell renderer and config-declared loaders.
    pub fn new(config: SsrConfig) -> Result<Self, ConfigError> {
        Self::with_components(config, Arc::new(ShellRenderer::default()), LoaderRegistry::new())
    }

    pub fn with_components(
        config: SsrConfig,
        renderer: Arc<dyn Renderer>,
        loaders: LoaderRegistry,
    ) -> Result<Self, ConfigError> {
        let site = SiteState::build(&config, &loaders)?;
        tracing::info!(
            routes = site.tree.len(),
            layouts = site.layouts.len(),
            loaders = site.loaders.len(),
            "Site compiled"
        );

        let state = AppState {
            site: Arc::new(ArcSwap::from_pointee(site)),
            renderer,
            cache: ResponseCache::new(config.cache.capacity),
            extra_loaders: loaders,
        };
        Ok(Self { config, state })
    }

    /// Replace the response cache backend.
    pub fn with_cache_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.state.cache = ResponseCache::with_store(store);
        self
    }

    /// Current site snapshot.
    pub fn site(&self) -> Arc<SiteState> {
        self.state.site.load_full()
    }

    pub fn config(&self) -> &SsrConfig {
        &self.config
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn router(&self) -> Router {
        Router::new()
            .fallback(page_handler)
            .with_state(self.state.clone())
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(RequestIdGenerator))
                    .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            request_id = %request_id(request.headers()),
                            method = %request.method(),
                            path = %request.uri().path(),
                        )
                    }))
                    .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// Serve until `shutdown` fires. Each config received on `config_updates`
    /// rebuilds the site and clears the response cache.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<SsrConfig>>,
        shutdown: Shutdown,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(updates) = config_updates {
            tokio::spawn(reload_loop(self.state.clone(), updates, shutdown.clone()));
        }

        let app = self.router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn reload_loop(state: AppState, mut updates: mpsc::UnboundedReceiver<SsrConfig>, shutdown: Shutdown) {
    loop {
        let config = tokio::select! {
            _ = shutdown.wait() => break,
            update = updates.recv() => match update {
                Some(config) => config,
                None => break,
            },
        };
        match SiteState::build(&config, &state.extra_loaders) {
            Ok(site) => {
                let routes = site.tree.len();
                state.site.store(Arc::new(site));
                state.cache.clear().await;
                tracing::info!(routes, "Site reloaded, response cache cleared");
            }
            Err(e) => {
                tracing::error!(error = %e, "Rejected reloaded config, keeping current site");
            }
        }
    }
    tracing::debug!("Reload loop stopped");
}

/// Cache decision for one request.
struct CachePlan {
    status: Option<CacheStatus>,
    tee: Option<CacheTee>,
}

/// Main page handler: every path lands here.
async fn page_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let site = state.site.load_full();

    if request.method() != Method::GET && request.method() != Method::HEAD {
        metrics::record_request(405, "none", start);
        return (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response();
    }

    let uri = request.uri().clone();
    let path = uri.path().to_string();
    let headers = request.headers();

    let Some(matched) = site.tree.match_path(&path) else {
        tracing::info!(path = %path, "No route matched");
        metrics::record_request(404, "none", start);
        return error_page(&state, &site, StatusCode::NOT_FOUND, format!("No page at {path}"));
    };
    let route = matched.route.clone();
    tracing::debug!(tag = %route.tag, params = ?matched.params, "Route matched");

    let authenticated = is_authenticated(headers, &site.cache.session_cookie);
    let policy = route.cache.as_ref().filter(|_| site.cache.enabled);
    let query = query_pairs(&uri);

    let mut plan = CachePlan { status: None, tee: None };
    if let Some(policy) = policy {
        if policy.should_bypass(authenticated) {
            tracing::debug!(tag = %route.tag, "Credentialed request, bypassing cache");
            metrics::record_cache("bypass");
        } else {
            let key = CacheKey::generate(&path, query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            if let Some(hit) = state.cache.get(&key).await {
                tracing::debug!(key = %key, "Cache hit");
                metrics::record_cache("hit");
                metrics::record_request(hit.status(), &route.tag, start);
                return mark_hit(
                    hit.into_response(),
                    &policy.cache_control(authenticated),
                    site.cache.debug_headers,
                );
            }
            metrics::record_cache("miss");
            plan.status = site.cache.debug_headers.then_some(CacheStatus::Miss);
            if policy.is_storable() {
                plan.tee = Some(CacheTee {
                    cache: state.cache.clone(),
                    key,
                    max_age_secs: policy.max_age_secs,
                });
            }
        }
    }

    let hierarchy = find_layout_hierarchy(&route.identifier, &site.layouts);
    let load_request = LoadRequest {
        path: path.clone(),
        tag: route.tag.clone(),
        params: matched.params.clone(),
        query,
    };
    let loader_refs: Vec<&str> = hierarchy
        .layouts
        .iter()
        .filter_map(|layout| layout.loader_ref.as_deref())
        .chain(route.loader_ref.as_deref())
        .collect();

    let outputs: Vec<LoaderOutput> =
        match try_join_all(loader_refs.iter().map(|name| site.loaders.load(name, load_request.clone()))).await {
            Ok(outputs) => outputs,
            Err(e) => {
                tracing::error!(tag = %route.tag, error = %e, "Loader failed before streaming");
                metrics::record_request(500, &route.tag, start);
                return error_page(&state, &site, StatusCode::INTERNAL_SERVER_ERROR, "Failed to load page data".into());
            }
        };

    let mut fields = Vec::new();
    let mut head = HeadTags::default();
    for output in outputs {
        fields.extend(output.fields);
        head.merge(output.head);
    }
    let (data, fragments) = PartitionedData::partition(fields).into_fragments(&route.tag);

    if route.kind == RouteKind::DataOnly {
        let settlements = join_all(fragments.into_iter().map(|f| f.settle())).await;
        let deferred: Map<String, Value> = settlements.iter().map(|s| (s.key.clone(), s.payload())).collect();
        let body = json!({
            "route": route.tag,
            "params": matched.params,
            "data": data,
            "deferred": deferred,
        });
        let body = match serde_json::to_vec(&body) {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                tracing::error!(tag = %route.tag, error = %e, "Failed to serialise data response");
                metrics::record_request(500, &route.tag, start);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Serialisation failed").into_response();
            }
        };
        let headers = page_headers(JSON_CONTENT_TYPE, policy, authenticated);
        if let Some(tee) = plan.tee {
            let snapshot = ResponseSnapshot {
                status: StatusCode::OK.as_u16(),
                headers: headers.clone(),
                body: body.clone(),
            };
            tee.cache.set(&tee.key, snapshot, tee.max_age_secs).await;
        }
        metrics::record_request(200, &route.tag, start);
        return full_response(StatusCode::OK, &headers, plan.status, body);
    }

    render_page(&state, &site, &matched, hierarchy, data, fragments, head, policy, authenticated, plan, start)
}

#[allow(clippy::too_many_arguments)]
fn render_page(
    state: &AppState,
    site: &SiteState,
    matched: &MatchResult,
    hierarchy: LayoutHierarchy,
    data: BTreeMap<String, Value>,
    fragments: Vec<DeferredFragment>,
    head: HeadTags,
    policy: Option<&CachePolicy>,
    authenticated: bool,
    plan: CachePlan,
    start: Instant,
) -> Response {
    let route = &matched.route;
    let deferred_ids: Vec<String> = fragments.iter().map(|f| f.id.clone()).collect();
    let injection = Injection::build(
        &site.stream,
        &route.assets,
        &head,
        &HydrationState {
            route: &route.tag,
            params: &matched.params,
            data: &data,
            deferred: &deferred_ids,
        },
    );

    let view = ComposedView {
        tag: route.tag.clone(),
        identifier: route.identifier.clone(),
        params: matched.params.clone(),
        layouts: hierarchy,
        data,
        deferred: deferred_ids,
        markers: Markers::from_config(&site.stream),
    };

    let upstream = match state.renderer.render(view) {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!(tag = %route.tag, error = %e, "Render failed before streaming");
            metrics::record_request(500, &route.tag, start);
            return error_page(state, site, StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page".into());
        }
    };

    let body = site.assembler.assemble(upstream, injection, fragments);
    metrics::record_request(200, &route.tag, start);
    streaming_response(
        StatusCode::OK,
        page_headers(HTML_CONTENT_TYPE, policy, authenticated),
        plan.status,
        body,
        plan.tee,
    )
}

/// Error page streamed through the assembler. Never cached.
fn error_page(state: &AppState, site: &SiteState, status: StatusCode, message: String) -> Response {
    let markers = Markers::from_config(&site.stream);
    let upstream = state.renderer.render_error(ErrorView {
        status: status.as_u16(),
        message,
        markers,
    });

    let head = HeadTags {
        title: Some(status.canonical_reason().unwrap_or("Error").to_string()),
        meta: Vec::new(),
    };
    let empty_params = BTreeMap::new();
    let empty_data = BTreeMap::new();
    let injection = Injection::build(
        &site.stream,
        &RouteAssets::default(),
        &head,
        &HydrationState {
            route: "error",
            params: &empty_params,
            data: &empty_data,
            deferred: &[],
        },
    );

    let body = site.assembler.assemble(upstream, injection, Vec::new());
    streaming_response(status, page_headers(HTML_CONTENT_TYPE, None, false), None, body, None)
}
