//! Keys file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use crate::auth::credentials::{read_keys_file, ApiKey, CredentialStore};

/// A watcher that monitors the keys file for changes.
pub struct KeysWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Vec<ApiKey>>,
}

impl KeysWatcher {
    /// Create a new KeysWatcher.
    ///
    /// Returns the watcher and a receiver for parsed key records.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Vec<ApiKey>>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching the file in a background thread.
    ///
    /// The parent directory is watched, since saves replace the file by
    /// rename. The returned watcher must be kept alive for events to flow.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let file_name = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours && (event.kind.is_modify() || event.kind.is_create()) {
                        tracing::info!("Keys file change detected, reloading...");
                        match read_keys_file(&path) {
                            Ok(keys) => {
                                let _ = tx.send(keys);
                            }
                            Err(e) => {
                                tracing::error!(
                                    "Failed to reload keys file: {}. Keeping current keys.",
                                    e
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Keys watcher started");
        Ok(watcher)
    }
}

/// Apply reloaded key records to the store until shutdown.
pub async fn apply_key_updates(
    store: CredentialStore,
    mut updates: mpsc::UnboundedReceiver<Vec<ApiKey>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(keys) = update else { break };
                let changed = store.merge(keys);
                tracing::info!(changed, total = store.len(), "Keys file merged");
            }
            _ = shutdown.recv() => {
                tracing::debug!("Keys updater received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::{issue_key, Role};

    #[tokio::test]
    async fn test_updates_merge_into_store() {
        let store = CredentialStore::new(None);
        let (tx, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(apply_key_updates(store.clone(), rx, shutdown_rx));

        let key = issue_key(Role::Viewer, None, None).key;
        tx.send(vec![key.clone()]).unwrap();

        for _ in 0..50 {
            if store.get(&key.id).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.get(&key.id), Some(key));

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
