//! Turso (libSQL) snapshot store

use async_trait::async_trait;
use libsql::{Builder, Connection, params};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::{PersistenceStore, StorageError, StorageResult};
use crate::engine::PlayerSnapshot;

/// Keeps the player in a single-row table as a JSON payload.
#[derive(Clone)]
pub struct TursoStore {
    conn: Arc<Mutex<Connection>>,
}

impl TursoStore {
    /// Connect to a Turso database
    pub async fn connect(url: &str, auth_token: Option<&str>) -> StorageResult<Self> {
        let db = if url.starts_with("libsql://") || url.starts_with("https://") {
            // Remote Turso database
            let token = auth_token
                .map(|s| s.to_string())
                .or_else(|| std::env::var("TURSO_AUTH_TOKEN").ok())
                .ok_or_else(|| {
                    StorageError::Config("TURSO_AUTH_TOKEN required for remote database".into())
                })?;

            Builder::new_remote(url.to_string(), token).build().await?
        } else {
            // Local file database
            let path = url.strip_prefix("file:").unwrap_or(url);
            Builder::new_local(path).build().await?
        };

        let conn = db.connect()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn initialize_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS player_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                saved_at INTEGER NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
            (),
        )
        .await?;
        info!("Snapshot schema initialized");
        Ok(())
    }
}

#[async_trait]
impl PersistenceStore for TursoStore {
    async fn load(&self) -> StorageResult<Option<PlayerSnapshot>> {
        let conn = self.conn.lock().await;
        let mut rows = conn
            .query("SELECT payload FROM player_snapshot WHERE id = 1", ())
            .await?;

        match rows.next().await? {
            Some(row) => {
                let payload: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&payload)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, snapshot: &PlayerSnapshot) -> StorageResult<()> {
        let payload = serde_json::to_string(snapshot)?;
        let saved_at = chrono::Utc::now().timestamp();
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO player_snapshot (id, saved_at, payload)
            VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET saved_at = excluded.saved_at, payload = excluded.payload
            "#,
            params![saved_at, payload],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_database_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("file:{}", dir.path().join("gotchi.db").display());
        let store = TursoStore::connect(&url, None).await.unwrap();
        store.initialize_schema().await.unwrap();

        assert!(store.load().await.unwrap().is_none());

        let first = PlayerSnapshot {
            level: 2,
            ..PlayerSnapshot::default()
        };
        store.save(&first).await.unwrap();
        let second = PlayerSnapshot {
            level: 4,
            xp: 12.0,
            ..PlayerSnapshot::default()
        };
        store.save(&second).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn remote_without_token_is_misconfigured() {
        if std::env::var("TURSO_AUTH_TOKEN").is_ok() {
            return;
        }
        let result = TursoStore::connect("libsql://example.turso.io", None).await;
        assert!(matches!(result, Err(StorageError::Config(_))));
    }
}
