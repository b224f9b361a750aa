use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{SessionStore, StoreError};

#[derive(Debug, Default)]
struct SessionData {
    token: Option<String>,
    responses: Map<String, Value>,
}

/// In-memory session store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<SessionData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, SessionData>, StoreError> {
        self.data
            .read()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, SessionData>, StoreError> {
        self.data
            .write()
            .map_err(|_| StoreError::Backend("in-memory store lock poisoned".into()))
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read()?.token.clone())
    }

    async fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.write()?.token = Some(token.to_string());
        Ok(())
    }

    async fn cached(&self, url: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read()?.responses.get(url).cloned())
    }

    async fn cached_responses(&self) -> Result<Map<String, Value>, StoreError> {
        Ok(self.read()?.responses.clone())
    }

    async fn cache_response(&self, url: &str, payload: &Value) -> Result<(), StoreError> {
        self.write()?.responses.insert(url.to_string(), payload.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut data = self.write()?;
        data.token = None;
        data.responses.clear();
        Ok(())
    }
}
