//! Route resolution and streaming response assembly for server-rendered pages.

pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod render;
pub mod routing;
pub mod stream;

pub use config::SsrConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
