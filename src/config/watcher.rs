//! Hot reload of the site configuration.
//!
//! # Responsibilities
//! - Watch the config file's directory, so editors that save by rename
//!   are still seen
//! - Ignore events for other files and saves that leave the text unchanged
//! - Forward every valid new configuration; log and skip invalid ones

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config_str;
use crate::config::schema::SsrConfig;

/// Sends each changed, valid configuration to the server.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<SsrConfig>,
}

impl ConfigWatcher {
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<SsrConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching on notify's thread. Dropping the returned watcher
    /// stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let path = self.path;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let tx = self.update_tx;
        let last = Mutex::new(std::fs::read_to_string(&path).ok());
        let target = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &target) => {
                    let content = match std::fs::read_to_string(&target) {
                        Ok(content) => content,
                        Err(e) => {
                            tracing::debug!(path = ?target, error = %e, "Config file unreadable, waiting for next event");
                            return;
                        }
                    };
                    let mut last = match last.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    if last.as_deref() == Some(content.as_str()) {
                        return;
                    }
                    match load_config_str(&content) {
                        Ok(config) => {
                            tracing::info!(path = ?target, "Config file changed, reloading");
                            *last = Some(content);
                            if tx.send(config).is_err() {
                                tracing::debug!("Config receiver gone, dropping update");
                            }
                        }
                        Err(e) => {
                            tracing::error!(path = ?target, error = %e, "Invalid config, keeping current configuration");
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

/// Whether `event` may have changed the file at `target`.
fn touches(event: &Event, target: &Path) -> bool {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    );
    relevant
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == target.file_name())
}
