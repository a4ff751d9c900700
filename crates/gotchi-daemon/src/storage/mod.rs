//! Snapshot persistence: a JSON file or a Turso (libSQL) row.

mod file;
mod turso;

pub use file::FileStore;
pub use turso::TursoStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    config::{EngineConfig, StorageConfig},
    engine::{PlayerSnapshot, SnapshotSink},
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),
    #[error("storage misconfigured: {0}")]
    Config(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    async fn load(&self) -> StorageResult<Option<PlayerSnapshot>>;

    async fn save(&self, snapshot: &PlayerSnapshot) -> StorageResult<()>;
}

pub type SharedStore = Arc<dyn PersistenceStore>;

pub async fn open(config: &StorageConfig) -> StorageResult<SharedStore> {
    match config {
        StorageConfig::File { path } => Ok(Arc::new(FileStore::new(path.clone()))),
        StorageConfig::Turso {
            url,
            auth_token_env,
        } => {
            let token = std::env::var(auth_token_env).ok();
            let store = TursoStore::connect(url, token.as_deref()).await?;
            store.initialize_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

/// Loads the saved player, or a fresh one if nothing usable is stored.
pub async fn load_or_default(store: &dyn PersistenceStore, config: &EngineConfig) -> PlayerSnapshot {
    match store.load().await {
        Ok(Some(snapshot)) => {
            info!(
                level = snapshot.level,
                hp = snapshot.hp,
                "Restored player snapshot"
            );
            snapshot
        }
        Ok(None) => {
            info!("No saved player, starting fresh");
            PlayerSnapshot::fresh(config)
        }
        Err(err) => {
            warn!(?err, "Failed to load player snapshot, starting fresh");
            PlayerSnapshot::fresh(config)
        }
    }
}

/// Hands snapshots to a background writer. Only the newest unsaved snapshot
/// is kept, so a slow store never queues up stale state.
pub struct SnapshotWriter {
    tx: watch::Sender<Option<PlayerSnapshot>>,
}

impl SnapshotWriter {
    pub fn spawn(store: SharedStore) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = watch::channel(None::<PlayerSnapshot>);
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let pending = rx.borrow_and_update().clone();
                let Some(snapshot) = pending else {
                    continue;
                };
                match store.save(&snapshot).await {
                    Ok(()) => debug!(level = snapshot.level, "Snapshot saved"),
                    Err(err) => warn!(?err, "Failed to save snapshot; keeping in-memory state"),
                }
            }
        });
        (Self { tx }, task)
    }
}

impl SnapshotSink for SnapshotWriter {
    fn submit(&self, snapshot: PlayerSnapshot) {
        self.tx.send_replace(Some(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        saved: Mutex<Vec<PlayerSnapshot>>,
        fail_load: bool,
    }

    #[async_trait]
    impl PersistenceStore for MemoryStore {
        async fn load(&self) -> StorageResult<Option<PlayerSnapshot>> {
            if self.fail_load {
                return Err(StorageError::Config("unavailable".into()));
            }
            Ok(self.saved.lock().last().cloned())
        }

        async fn save(&self, snapshot: &PlayerSnapshot) -> StorageResult<()> {
            self.saved.lock().push(snapshot.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn load_failure_degrades_to_fresh_player() {
        let store = MemoryStore {
            fail_load: true,
            ..MemoryStore::default()
        };
        let snapshot = load_or_default(&store, &EngineConfig::default()).await;
        assert_eq!(snapshot, PlayerSnapshot::fresh(&EngineConfig::default()));
    }

    #[tokio::test]
    async fn writer_flushes_latest_snapshot_on_close() {
        let store = Arc::new(MemoryStore::default());
        let (writer, task) = SnapshotWriter::spawn(store.clone());
        for level in 1..=5 {
            writer.submit(PlayerSnapshot {
                level,
                ..PlayerSnapshot::default()
            });
        }
        drop(writer);
        task.await.unwrap();

        let saved = store.saved.lock();
        assert!(!saved.is_empty());
        assert_eq!(saved.last().map(|s| s.level), Some(5));
    }
}
