//! ssr-stream server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client Request
//!   ──────────────▶ http::server ──▶ routing::tree ──▶ cache (HIT ─▶ response)
//!                                         │
//!                                         ▼
//!                                  routing::layout ──▶ render::loader
//!                                                         │ immediate / deferred
//!                                                         ▼
//!                                  render::Renderer ──▶ stream::assembler
//!   Client Response                                        │
//!   ◀──────────────── http::response (tee into cache) ◀────┘
//! ```
//!
//! # Commands
//! - `serve` (default): run the HTTP server, reloading on config changes
//! - `routes`: print the compiled route table in match order
//! - `match URL`: resolve one URL and print params and layouts

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use ssr_stream::config::{load_config, ConfigWatcher, SsrConfig};
use ssr_stream::http::SiteState;
use ssr_stream::observability::{logging, metrics};
use ssr_stream::render::LoaderRegistry;
use ssr_stream::routing::find_layout_hierarchy;
use ssr_stream::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "ssr-stream")]
#[command(about = "Streaming server-side rendering host", long_about = None)]
struct Cli {
    /// TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve,
    /// Print the compiled route table in match order
    Routes,
    /// Resolve a URL against the route table
    Match { url: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SsrConfig::default(),
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, cli.config).await,
        Commands::Routes => {
            let site = SiteState::build(&config, &LoaderRegistry::new())?;
            for route in site.tree.routes() {
                println!(
                    "{:<24} {:<32} specificity={:<3} kind={:?}",
                    route.tag,
                    route.pattern.path_template,
                    route.pattern.specificity,
                    route.kind
                );
            }
            Ok(())
        }
        Commands::Match { url } => {
            let site = SiteState::build(&config, &LoaderRegistry::new())?;
            match site.tree.match_path(&url) {
                Some(matched) => {
                    println!("route:  {}", matched.route.tag);
                    for (name, value) in &matched.params {
                        println!("param:  {name} = {value}");
                    }
                    let hierarchy = find_layout_hierarchy(&matched.route.identifier, &site.layouts);
                    for layout in &hierarchy.layouts {
                        println!("layout: {}", layout.identifier);
                    }
                }
                None => println!("no route matches {url}"),
            }
            Ok(())
        }
    }
}

async fn serve(config: SsrConfig, path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability)?;
    tracing::info!("ssr-stream v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher must stay alive for the lifetime of the server.
    let (_watcher, updates) = match path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            (Some(watcher.run()?), Some(updates))
        }
        None => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config)?;
    shutdown.trigger_on_signal();

    server.run(listener, updates, shutdown).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
