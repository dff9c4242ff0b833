//! Page and layout loaders.
//!
//! # Responsibilities
//! - Define the `Loader` trait resolved from a route or layout loader ref
//! - Keep the name → loader registry
//! - Serve config-declared data through `StaticLoader`

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;
use thiserror::Error;

use crate::config::StaticLoaderConfig;
use crate::stream::{FieldState, FragmentError, HeadTags};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("no loader registered as '{0}'")]
    Unknown(String),

    #[error("loader failed: {0}")]
    Failed(String),
}

/// Input to a loader call.
#[derive(Debug, Clone, Default)]
pub struct LoadRequest {
    pub path: String,
    pub tag: String,
    pub params: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
}

/// Loader result: named fields, each immediate or deferred, plus head tags.
#[derive(Debug, Default)]
pub struct LoaderOutput {
    pub fields: Vec<(String, FieldState)>,
    pub head: HeadTags,
}

impl LoaderOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.push((key.into(), FieldState::Resolved(value)));
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, state: FieldState) -> Self {
        self.fields.push((key.into(), state));
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.head.title = Some(title.into());
        self
    }
}

pub trait Loader: Send + Sync {
    fn load(&self, request: LoadRequest) -> BoxFuture<'static, Result<LoaderOutput, LoadError>>;
}

/// Adapts an async closure into a `Loader`.
pub struct FnLoader<F>(F);

impl<F> FnLoader<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F, Fut> Loader for FnLoader<F>
where
    F: Fn(LoadRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<LoaderOutput, LoadError>> + Send + 'static,
{
    fn load(&self, request: LoadRequest) -> BoxFuture<'static, Result<LoaderOutput, LoadError>> {
        (self.0)(request).boxed()
    }
}

/// Loaders by name.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn Loader>>,
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.loaders.keys().collect();
        names.sort();
        f.debug_struct("LoaderRegistry").field("loaders", &names).finish()
    }
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding one `StaticLoader` per configured entry.
    pub fn from_config(loaders: &BTreeMap<String, StaticLoaderConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in loaders {
            registry.register(name.clone(), Arc::new(StaticLoader::new(config.clone())));
        }
        registry
    }

    /// Register `loader` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, loader: Arc<dyn Loader>) {
        self.loaders.insert(name.into(), loader);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Loader>> {
        self.loaders.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.loaders.contains_key(name)
    }

    /// Add every loader of `other`; entries of `other` win.
    pub fn extend(&mut self, other: &LoaderRegistry) {
        for (name, loader) in &other.loaders {
            self.loaders.insert(name.clone(), loader.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Resolve `name` and run it.
    pub fn load(&self, name: &str, request: LoadRequest) -> BoxFuture<'static, Result<LoaderOutput, LoadError>> {
        match self.get(name) {
            Some(loader) => loader.load(request),
            None => futures_util::future::ready(Err(LoadError::Unknown(name.to_string()))).boxed(),
        }
    }
}

/// Loader backed by values from the config file.
///
/// String values may reference route params as `{name}`.
#[derive(Debug, Clone)]
pub struct StaticLoader {
    config: StaticLoaderConfig,
}

impl StaticLoader {
    pub fn new(config: StaticLoaderConfig) -> Self {
        Self { config }
    }
}

impl Loader for StaticLoader {
    fn load(&self, request: LoadRequest) -> BoxFuture<'static, Result<LoaderOutput, LoadError>> {
        let mut output = LoaderOutput::new();

        for (key, value) in &self.config.data {
            output = output.with_value(key.clone(), interpolate(value, &request.params));
        }

        for (key, deferred) in &self.config.deferred {
            let value = interpolate(&deferred.value, &request.params);
            let error = deferred.error.clone();
            let delay = Duration::from_millis(deferred.delay_ms);
            output = output.with_field(
                key.clone(),
                FieldState::pending(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match error {
                        Some(message) => Err(FragmentError(message)),
                        None => Ok(value),
                    }
                }),
            );
        }

        if let Some(title) = &self.config.title {
            output.head.title = Some(interpolate_str(title, &request.params));
        }
        output.head.meta = self
            .config
            .meta
            .iter()
            .map(|(name, content)| (name.clone(), interpolate_str(content, &request.params)))
            .collect();

        futures_util::future::ready(Ok(output)).boxed()
    }
}

fn interpolate(value: &Value, params: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_str(s, params)),
        Value::Array(items) => Value::Array(items.iter().map(|v| interpolate(v, params)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate(v, params)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn interpolate_str(input: &str, params: &BTreeMap<String, String>) -> String {
    let mut out = input.to_string();
    for (name, value) in params {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    out
}
