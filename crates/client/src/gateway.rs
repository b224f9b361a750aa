//! Authenticated request gateway.
//!
//! Every backend call goes through [`Gateway::execute`], which:
//! - attaches `Accept: application/json` and, when a session token exists,
//!   `Authorization: Bearer <token>`
//! - on 401 purges token + response cache and issues a hard navigation to the
//!   login path (the 401 is still returned to the caller)
//! - on success mirrors URL → payload into the response cache and picks up a
//!   refreshed token, unless the payload says `"success": false`
//! - coalesces concurrent identical GETs into one transport call
//!
//! The gateway observes responses; it never changes their content.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::Instrument;
use uuid::Uuid;

use carehub_core::{ErrorPayload, envelope};

use crate::navigation::{BroadcastNavigator, Navigator};
use crate::request::ApiRequest;
use crate::store::{InMemoryStore, SessionStore, StoreError};
use crate::transport::{PreparedRequest, Transport, TransportError};

/// Status that ends the session.
pub const UNAUTHORIZED: u16 = 401;

/// Default hard-navigation target on session expiry.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

pub type Outcome = Result<ApiResponse, GatewayError>;

/// A 2xx response, payload untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// Full request URL; also the response-cache key.
    pub url: String,
    pub status: u16,
    pub payload: Value,
}

impl ApiResponse {
    /// The payload explicitly reported `"success": false`.
    pub fn is_failure(&self) -> bool {
        envelope::is_failure(&self.payload)
    }

    pub fn data(&self) -> &Value {
        envelope::data(&self.payload)
    }

    pub fn error_payload(&self) -> ErrorPayload {
        ErrorPayload::from_payload(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// No response reached the client.
    #[error("network error: {0}")]
    Network(String),

    /// Any non-2xx status, 401 included.
    #[error("HTTP {status}")]
    Status { status: u16, payload: Value },

    /// The request descriptor could not be turned into a URL or body.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(UNAUTHORIZED)
    }

    pub fn error_payload(&self) -> ErrorPayload {
        match self {
            GatewayError::Network(message) | GatewayError::InvalidRequest(message) => {
                ErrorPayload::network(message.clone())
            }
            GatewayError::Status { status, payload } => ErrorPayload::from_response(*status, payload),
        }
    }
}

impl From<TransportError> for GatewayError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Network(message) => GatewayError::Network(message),
            TransportError::InvalidRequest(message) => GatewayError::InvalidRequest(message),
        }
    }
}

type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

/// The single egress point for backend calls. Cheap to clone.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    base_url: String,
    login_path: String,
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    /// Session generation; bumped by every purge.
    generation: AtomicU64,
    /// Held for reading while mirroring, for writing while purging, so a
    /// purge never interleaves with a cache/token write.
    session: RwLock<()>,
    in_flight: Mutex<HashMap<String, SharedOutcome>>,
}

pub struct GatewayBuilder {
    base_url: String,
    login_path: String,
    transport: Arc<dyn Transport>,
    store: Option<Arc<dyn SessionStore>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl GatewayBuilder {
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    /// Missing store/navigator default to in-memory/broadcast.
    pub fn build(self) -> Gateway {
        Gateway {
            inner: Arc::new(Inner {
                base_url: self.base_url,
                login_path: self.login_path,
                transport: self.transport,
                store: self.store.unwrap_or_else(|| Arc::new(InMemoryStore::new())),
                navigator: self
                    .navigator
                    .unwrap_or_else(|| Arc::new(BroadcastNavigator::default())),
                generation: AtomicU64::new(0),
                session: RwLock::new(()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl Gateway {
    pub fn builder(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> GatewayBuilder {
        GatewayBuilder {
            base_url: base_url.into(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            transport,
            store: None,
            navigator: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn login_path(&self) -> &str {
        &self.inner.login_path
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Perform one backend call.
    ///
    /// Concurrent identical GETs share a single transport call and its side
    /// effects; every caller receives the same outcome.
    pub async fn execute(&self, request: ApiRequest) -> Outcome {
        if !request.is_coalescable() {
            return self.inner.dispatch(request).await;
        }

        let key = request
            .signature(&self.inner.base_url)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        let shared = {
            let mut in_flight = self.inner.in_flight();
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!(%key, "joining in-flight request");
                    existing.clone()
                }
                None => {
                    let inner = Arc::clone(&self.inner);
                    let owned_key = key.clone();
                    // Removal lives inside the shared future so it happens even
                    // if the first caller is dropped.
                    let call = async move {
                        let outcome = inner.dispatch(request).await;
                        inner.in_flight().remove(&owned_key);
                        outcome
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, call.clone());
                    call
                }
            }
        };

        shared.await
    }

    /// Explicit logout: drop token and response cache. Responses still in
    /// flight can no longer write either.
    pub async fn logout(&self) -> Result<(), StoreError> {
        tracing::info!("logging out; clearing session state");
        self.inner.purge().await
    }

    /// The stored session token.
    pub async fn token(&self) -> Result<Option<String>, StoreError> {
        self.inner.store.token().await
    }

    /// Seed the session token (e.g. from configuration).
    pub async fn set_token(&self, token: &str) -> Result<(), StoreError> {
        self.inner.store.set_token(token).await
    }

    /// Last cached success payload for this request's URL. Never touches the
    /// network.
    pub async fn cached(&self, request: &ApiRequest) -> Result<Option<Value>, StoreError> {
        let url = request
            .url(&self.inner.base_url)
            .map_err(|e| StoreError::Backend(format!("invalid request URL: {e}")))?;
        self.inner.store.cached(url.as_str()).await
    }
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<String, SharedOutcome>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(&self, request: ApiRequest) -> Outcome {
        let generation = self.generation.load(Ordering::SeqCst);
        let url = request
            .url(&self.base_url)
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?
            .to_string();

        let span = tracing::debug_span!(
            "gateway",
            request_id = %Uuid::now_v7(),
            method = %request.method,
            url = %url,
        );
        self.dispatch_at(request, url, generation).instrument(span).await
    }

    async fn dispatch_at(&self, request: ApiRequest, url: String, generation: u64) -> Outcome {
        let mut headers = vec![("Accept", "application/json".to_string())];
        match self.store.token().await {
            Ok(Some(token)) => headers.push(("Authorization", format!("Bearer {token}"))),
            Ok(None) => {}
            Err(err) => tracing::warn!("failed to read session token; sending unauthenticated: {err}"),
        }

        let prepared = PreparedRequest {
            method: request.method,
            url: url.clone(),
            headers,
            body: request.body,
        };

        let response = match self.transport.send(prepared).await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!("transport failed: {err}");
                return Err(err.into());
            }
        };

        if response.status == UNAUTHORIZED {
            tracing::warn!("session rejected (401); purging session state");
            if let Err(err) = self.purge().await {
                tracing::error!("failed to purge session state: {err}");
            }
            self.navigator.navigate(&self.login_path);
            return Err(GatewayError::Status {
                status: response.status,
                payload: response.body,
            });
        }

        if !response.is_success() {
            tracing::debug!(status = response.status, "request failed");
            return Err(GatewayError::Status {
                status: response.status,
                payload: response.body,
            });
        }

        if envelope::is_failure(&response.body) {
            tracing::warn!("backend reported failure; response not cached");
        } else {
            self.mirror(&url, &response.body, generation).await;
        }

        Ok(ApiResponse {
            url,
            status: response.status,
            payload: response.body,
        })
    }

    /// Write-through to the response cache and token, if the session that
    /// dispatched the request is still the current one.
    async fn mirror(&self, url: &str, payload: &Value, generation: u64) {
        let _session = self.session.read().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!("session purged while in flight; discarding cache/token update");
            return;
        }

        if let Err(err) = self.store.cache_response(url, payload).await {
            tracing::error!("failed to cache response: {err}");
        }

        if let Some(token) = envelope::extract_token(payload) {
            match self.store.set_token(token).await {
                Ok(()) => tracing::debug!("session token refreshed"),
                Err(err) => tracing::error!("failed to store refreshed token: {err}"),
            }
        }
    }

    async fn purge(&self) -> Result<(), StoreError> {
        let _session = self.session.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.store.clear().await
    }
}
