use std::path::Path;
use std::sync::Arc;

use anyhow::Context;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod memory;
mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{collections, DocumentStore, Fields, Record, StoreError};

use crate::config::{Config, StoreBackend};
use crate::services::maintenance::export_snapshot;

pub type DbPool = PgPool;

pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Opens the configured document store.
pub async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store {
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set for the postgres store"))?;
            let store = PgStore::new(create_pool(url).await?);
            store.ensure_schema().await?;
            tracing::info!("Using postgres document store");
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            let store = match &config.snapshot_path {
                Some(path) if path.exists() => {
                    tracing::info!("Loading memory store snapshot from {}", path.display());
                    MemoryStore::load(path).await?
                }
                _ => MemoryStore::new(),
            };
            tracing::info!("Using in-memory document store");
            Ok(Arc::new(store))
        }
    }
}

/// Writes the whole store to `path` as a `{collection: {id: fields}}` snapshot.
pub async fn save_snapshot(db: &dyn DocumentStore, path: &Path) -> anyhow::Result<()> {
    let snapshot = export_snapshot(db).await?;
    let contents = serde_json::to_string_pretty(&snapshot)?;
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("writing snapshot to {}", path.display()))?;
    tracing::info!("Saved memory store snapshot to {}", path.display());
    Ok(())
}

/// Writes a memory store back to its snapshot file. Postgres writes are
/// already durable, so this does nothing there.
pub async fn persist(config: &Config, db: &dyn DocumentStore) -> anyhow::Result<()> {
    match (config.store, &config.snapshot_path) {
        (StoreBackend::Memory, Some(path)) => save_snapshot(db, path).await,
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::maintenance::merge_duplicate_requests;
    use chrono::Utc;
    use cofound_shared::{ConnectionRequest, ConnectionStatus};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_memory_changes_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");

        let seed = MemoryStore::new();
        for _ in 0..2 {
            let request = ConnectionRequest {
                id: Uuid::new_v4(),
                from: "alice".into(),
                to: "bob".into(),
                status: ConnectionStatus::Pending,
                created_at: Utc::now(),
            };
            store::insert(&seed, collections::CONNECTIONS, &request.id.to_string(), &request)
                .await
                .unwrap();
        }
        save_snapshot(&seed, &path).await.unwrap();

        let config = Config {
            snapshot_path: Some(path.clone()),
            ..Config::for_tests()
        };
        let db = open_store(&config).await.unwrap();
        let report = merge_duplicate_requests(db.as_ref(), false).await.unwrap();
        assert_eq!(report.removed, 1);
        persist(&config, db.as_ref()).await.unwrap();

        let reloaded = MemoryStore::load(&path).await.unwrap();
        assert_eq!(reloaded.list(collections::CONNECTIONS).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_persist_without_snapshot_path_is_noop() {
        let db = MemoryStore::new();
        persist(&Config::for_tests(), &db).await.unwrap();
    }
}
