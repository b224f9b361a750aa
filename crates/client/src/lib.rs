//! `carehub-client`
//!
//! **Responsibility:** the clinic app's client core.
//!
//! This crate provides:
//! - The authenticated request gateway (token attach, 401 purge + redirect,
//!   response cache write-through, GET coalescing)
//! - Durable session storage (SQLite) behind the [`SessionStore`] seam
//! - A [`PermissionSource`](carehub_auth::PermissionSource) over the gateway
//!   feeding the permission resolver
//! - A request helper with success/error callbacks and notifications
//!
//! UI shells hold one [`ClientState`] and render from it.

pub mod config;
pub mod gateway;
pub mod handler;
pub mod navigation;
pub mod request;
pub mod source;
pub mod store;
pub mod transport;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Context;

use carehub_auth::PermissionResolver;

pub use config::{ClientConfig, ConfigError};
pub use gateway::{ApiResponse, Gateway, GatewayBuilder, GatewayError};
pub use handler::{Failure, Notifier, Requester, TracingNotifier};
pub use navigation::{BroadcastNavigator, Navigator};
pub use request::{ApiRequest, Method, Part, RequestBody};
pub use source::{Endpoints, GatewaySource};
pub use store::{InMemoryStore, SessionStore, SqliteStore, StoreError, session_db_path};
pub use transport::{ReqwestTransport, Transport, TransportError};

/// Everything a shell needs, shared across windows/tasks.
#[derive(Clone)]
pub struct ClientState {
    pub gateway: Gateway,
    pub resolver: Arc<PermissionResolver>,
    pub requester: Requester,
    /// Subscribe here to receive hard navigations (session expiry).
    pub navigation: Arc<BroadcastNavigator>,
}

impl ClientState {
    /// Production wiring: reqwest transport and the SQLite session store.
    ///
    /// The database is opened lazily on first use.
    pub async fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout()).context("failed to build HTTP client")?;
        let path = session_db_path(config.data_dir.as_deref())?;
        tracing::info!(path = %path.display(), "using session store");

        Self::assemble(config, Arc::new(transport), Arc::new(SqliteStore::at_path(&path))).await
    }

    /// Wire the client around the given transport and store.
    pub async fn assemble(
        config: &ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let navigation = Arc::new(BroadcastNavigator::default());
        let gateway = Gateway::builder(config.api_url.clone(), transport)
            .store(store)
            .navigator(navigation.clone())
            .login_path(config.login_path.clone())
            .build();

        if let Some(token) = &config.auth_token {
            tracing::info!("seeding session token from configuration");
            gateway.set_token(token).await.context("failed to seed session token")?;
        }

        let source = GatewaySource::new(gateway.clone(), config.endpoints.clone());
        let resolver = Arc::new(PermissionResolver::new(Arc::new(source), config.privileged()));
        let requester = Requester::new(gateway.clone(), Arc::new(TracingNotifier));

        Ok(Self {
            gateway,
            resolver,
            requester,
            navigation,
        })
    }

    /// Clear the session and forget the resolved permissions.
    pub async fn logout(&self) -> Result<(), StoreError> {
        self.gateway.logout().await?;
        self.resolver.reset();
        Ok(())
    }
}
