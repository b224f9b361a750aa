//! Hard navigation requests issued by the gateway (session expiry).

use tokio::sync::broadcast;

/// Receives full-page navigations. Implementations must abandon in-flight UI
/// state: this is a reset, not a client-side route change.
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

/// Fans navigation requests out to every subscribed shell/window.
#[derive(Debug, Clone)]
pub struct BroadcastNavigator {
    tx: broadcast::Sender<String>,
}

impl BroadcastNavigator {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastNavigator {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Navigator for BroadcastNavigator {
    fn navigate(&self, path: &str) {
        if self.tx.send(path.to_string()).is_err() {
            tracing::debug!(path, "navigation requested with no subscribers");
        }
    }
}
