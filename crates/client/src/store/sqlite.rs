//! SQLite-backed session store.
//!
//! Layout: one `kv` table. `token` holds the bearer token as plain text and
//! `cached_responses` holds the whole response cache as one JSON object.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;

use super::{CACHE_KEY, SessionStore, StoreError, TOKEN_KEY};

/// Durable session store (lazy initialization).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    options: SqliteConnectOptions,
    /// Shared pool, created on first use.
    pool: Arc<Mutex<Option<SqlitePool>>>,
    /// Serializes read-modify-write of the cache blob so concurrent writes
    /// for different URLs never drop each other.
    blob_lock: Arc<Mutex<()>>,
}

impl SqliteStore {
    pub fn new(options: SqliteConnectOptions) -> Self {
        Self {
            options,
            pool: Arc::new(Mutex::new(None)),
            blob_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store in a database file, created if missing.
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self::new(
            SqliteConnectOptions::new()
                .filename(path.as_ref())
                .create_if_missing(true),
        )
    }

    /// Private in-memory database (tests/dev). Lives as long as the store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self::new(options))
    }

    /// Initialize the database connection (called lazily on first use).
    async fn ensure_initialized(&self) -> anyhow::Result<()> {
        let mut pool_guard = self.pool.lock().await;
        if pool_guard.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create session store directory at {:?}", parent))?;
            }
        }

        // One connection: the store is single-writer, and an in-memory
        // database only exists inside its connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(self.options.clone())
            .await
            .context("failed to create SQLite pool for session store")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .context("failed to create kv table")?;

        *pool_guard = Some(pool);
        Ok(())
    }

    /// Get the pool, initializing if necessary.
    async fn get_pool(&self) -> anyhow::Result<SqlitePool> {
        self.ensure_initialized().await?;
        let pool_guard = self.pool.lock().await;
        pool_guard
            .as_ref()
            .cloned()
            .context("session store pool missing after initialization")
    }

    async fn read(&self, key: &str) -> anyhow::Result<Option<String>> {
        let pool = self.get_pool().await?;
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&pool)
            .await
            .with_context(|| format!("failed to read '{key}'"))?;

        row.map(|row| row.try_get::<String, _>("value"))
            .transpose()
            .with_context(|| format!("failed to decode '{key}'"))
    }

    async fn write(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let pool = self.get_pool().await?;
        sqlx::query(
            r#"
            INSERT INTO kv (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&pool)
        .await
        .with_context(|| format!("failed to write '{key}'"))?;
        Ok(())
    }

    async fn load_cache(&self) -> anyhow::Result<Map<String, Value>> {
        let Some(blob) = self.read(CACHE_KEY).await? else {
            return Ok(Map::new());
        };
        match serde_json::from_str::<Value>(&blob) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                tracing::warn!("cached response blob is not a JSON object; starting fresh");
                Ok(Map::new())
            }
        }
    }

    async fn insert_cached(&self, url: &str, payload: &Value) -> anyhow::Result<()> {
        let _blob = self.blob_lock.lock().await;
        let mut cache = self.load_cache().await?;
        cache.insert(url.to_string(), payload.clone());
        let blob = serde_json::to_string(&cache).context("failed to serialize response cache")?;
        self.write(CACHE_KEY, &blob).await
    }

    async fn delete_session(&self) -> anyhow::Result<()> {
        let _blob = self.blob_lock.lock().await;
        let pool = self.get_pool().await?;
        sqlx::query("DELETE FROM kv WHERE key IN (?1, ?2)")
            .bind(TOKEN_KEY)
            .bind(CACHE_KEY)
            .execute(&pool)
            .await
            .context("failed to clear session")?;
        Ok(())
    }
}

fn backend(err: anyhow::Error) -> StoreError {
    StoreError::Backend(format!("{err:#}"))
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn token(&self) -> Result<Option<String>, StoreError> {
        self.read(TOKEN_KEY).await.map_err(backend)
    }

    async fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.write(TOKEN_KEY, token).await.map_err(backend)
    }

    async fn cached(&self, url: &str) -> Result<Option<Value>, StoreError> {
        let mut cache = self.load_cache().await.map_err(backend)?;
        Ok(cache.remove(url))
    }

    async fn cached_responses(&self) -> Result<Map<String, Value>, StoreError> {
        self.load_cache().await.map_err(backend)
    }

    async fn cache_response(&self, url: &str, payload: &Value) -> Result<(), StoreError> {
        self.insert_cached(url, payload).await.map_err(backend)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.delete_session().await.map_err(backend)
    }
}

/// Resolve the path to the session database:
/// `{data_dir}/carehub/session.db`, where `data_dir` defaults to the OS app
/// data directory.
pub fn session_db_path(data_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
    let base = match data_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs::data_dir()
            .or_else(|| {
                dirs::home_dir().map(|mut h| {
                    h.push(".local");
                    h.push("share");
                    h
                })
            })
            .context("failed to resolve OS app data directory - tried data_dir() and home_dir()/.local/share")?,
    };

    let mut path = base;
    path.push("carehub");
    path.push("session.db");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn token_round_trip_is_exact() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.token().await.unwrap(), None);

        let token = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.sig==";
        store.set_token(token).await.unwrap();
        assert_eq!(store.token().await.unwrap().as_deref(), Some(token));

        store.set_token("rotated").await.unwrap();
        assert_eq!(store.token().await.unwrap().as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn concurrent_cache_writes_keep_every_url() {
        let store = SqliteStore::in_memory().unwrap();
        let writes = (0..8).map(|i| {
            let store = store.clone();
            async move {
                store
                    .cache_response(&format!("http://x/patients/{i}"), &json!({ "id": i }))
                    .await
            }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }

        let cache = store.cached_responses().await.unwrap();
        assert_eq!(cache.len(), 8);
        assert_eq!(store.cached("http://x/patients/3").await.unwrap(), Some(json!({ "id": 3 })));
    }

    #[tokio::test]
    async fn clear_is_total() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_token("t").await.unwrap();
        store.cache_response("http://x/a", &json!({ "success": true })).await.unwrap();

        store.clear().await.unwrap();
        assert_eq!(store.token().await.unwrap(), None);
        assert!(store.cached_responses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = std::env::temp_dir().join(format!("carehub-store-{}", uuid::Uuid::now_v7()));
        let path = session_db_path(Some(&dir)).unwrap();

        let first = SqliteStore::at_path(&path);
        first.set_token("persisted").await.unwrap();
        first.cache_response("http://x/me", &json!({ "id": 1 })).await.unwrap();
        drop(first);

        let second = SqliteStore::at_path(&path);
        assert_eq!(second.token().await.unwrap().as_deref(), Some("persisted"));
        assert_eq!(second.cached("http://x/me").await.unwrap(), Some(json!({ "id": 1 })));
        drop(second);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn default_path_layout() {
        let path = session_db_path(Some(Path::new("/var/lib/clinic"))).unwrap();
        assert_eq!(path, PathBuf::from("/var/lib/clinic/carehub/session.db"));
    }
}
