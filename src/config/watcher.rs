//! Configuration file watcher for hot reload.
//!
//! Watches the parent directory rather than the file itself, so editors that
//! save by writing a temp file and renaming it are still picked up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;

/// A watcher that monitors the configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<ProxyConfig>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver of validated configurations, meant
    /// to be passed to `ApiRegistry::follow`.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ProxyConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    fn touches_config(&self, event: &Event) -> bool {
        let relevant_kind =
            event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
        relevant_kind
            && event
                .paths
                .iter()
                .any(|p| p.file_name().is_some() && p.file_name() == self.path.file_name())
    }

    fn reload(&self) {
        match load_config(&self.path) {
            Ok(config) => {
                tracing::info!(path = ?self.path, apis = config.apis.len(), "Config file reloaded");
                if self.update_tx.send(config).is_err() {
                    tracing::debug!("Config update receiver dropped");
                }
            }
            Err(e) => {
                tracing::error!(path = ?self.path, error = %e, "Failed to reload config, keeping current configuration");
            }
        }
    }

    /// Start watching. The returned notify watcher must be kept alive for
    /// updates to keep flowing.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if self.touches_config(&event) => self.reload(),
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
