//! Test doubles for the gateway seams.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::navigation::Navigator;
use crate::transport::{PreparedRequest, Transport, TransportError, TransportResponse};

type Responder = Box<dyn Fn(&PreparedRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

/// Scripted transport that records every request it sees.
pub(crate) struct FakeTransport {
    responder: Responder,
    requests: Mutex<Vec<PreparedRequest>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeTransport {
    pub(crate) fn respond(
        responder: impl Fn(&PreparedRequest) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub(crate) fn fixed(status: u16, body: Value) -> Self {
        Self::respond(move |_| Ok(TransportResponse::new(status, body.clone())))
    }

    /// Hold every response until a permit is added to `gate`.
    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
        }
        (self.responder)(&request)
    }
}

/// Path component of a prepared request's URL.
pub(crate) fn path_of(request: &PreparedRequest) -> String {
    url::Url::parse(&request.url)
        .map(|url| url.path().to_string())
        .unwrap_or_default()
}

#[derive(Default)]
pub(crate) struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub(crate) fn visits(&self) -> Vec<String> {
        self.visits.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, path: &str) {
        self.visits.lock().unwrap().push(path.to_string());
    }
}
