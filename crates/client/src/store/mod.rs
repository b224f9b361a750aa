//! Durable session state: the bearer token and the response cache.
//!
//! Only the gateway writes here (plus explicit logout). Both entries are
//! cleared together.

mod memory;
mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::InMemoryStore;
pub use sqlite::{SqliteStore, session_db_path};

/// Storage key of the session token (plain string).
pub const TOKEN_KEY: &str = "token";

/// Storage key of the response cache (JSON object, URL → payload).
pub const CACHE_KEY: &str = "cached_responses";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session store backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn token(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored token; the value is kept byte-for-byte.
    async fn set_token(&self, token: &str) -> Result<(), StoreError>;

    /// Last cached payload for `url`.
    async fn cached(&self, url: &str) -> Result<Option<Value>, StoreError>;

    /// Whole cache snapshot.
    async fn cached_responses(&self) -> Result<Map<String, Value>, StoreError>;

    /// Replace the cached payload for `url` (whole-payload replace, no merge).
    async fn cache_response(&self, url: &str, payload: &Value) -> Result<(), StoreError>;

    /// Remove token and cache in one step.
    async fn clear(&self) -> Result<(), StoreError>;
}
