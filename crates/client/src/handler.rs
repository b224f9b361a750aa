//! Request helper: one call, one outcome, callbacks instead of hand-rolled
//! branching at every call site.
//!
//! A 2xx payload with `"success": false` is routed to the error branch. When
//! the caller supplies no error callback the message is extracted with the
//! canonical precedence chain and handed to a [`Notifier`].

use std::sync::Arc;

use thiserror::Error;

use carehub_core::ErrorPayload;

use crate::gateway::{ApiResponse, Gateway, GatewayError};
use crate::request::ApiRequest;

/// User-facing notifications (toasts, status bar, log).
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
    fn success(&self, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn error(&self, message: &str) {
        tracing::warn!(message, "request failed");
    }

    fn success(&self, message: &str) {
        tracing::info!(message, "request succeeded");
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Failure {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// 2xx response whose payload reported `"success": false`.
    #[error("application failure: {}", .0.error_payload())]
    Application(ApiResponse),
}

impl Failure {
    pub fn error_payload(&self) -> ErrorPayload {
        match self {
            Failure::Gateway(err) => err.error_payload(),
            Failure::Application(response) => response.error_payload(),
        }
    }

    /// Text to show the user.
    pub fn message(&self) -> String {
        self.error_payload().message()
    }
}

#[derive(Clone)]
pub struct Requester {
    gateway: Gateway,
    notifier: Arc<dyn Notifier>,
}

impl Requester {
    pub fn new(gateway: Gateway, notifier: Arc<dyn Notifier>) -> Self {
        Self { gateway, notifier }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn request(&self, request: ApiRequest) -> Call<'_> {
        Call {
            requester: self,
            request,
            on_success: None,
            on_error: None,
            success_message: None,
        }
    }
}

type Callback<'a, T> = Box<dyn FnOnce(&T) + Send + 'a>;

/// A pending request with its callbacks. Nothing is sent until [`Call::send`].
#[must_use = "a call does nothing until `send` is awaited"]
pub struct Call<'a> {
    requester: &'a Requester,
    request: ApiRequest,
    on_success: Option<Callback<'a, ApiResponse>>,
    on_error: Option<Callback<'a, Failure>>,
    success_message: Option<String>,
}

impl<'a> Call<'a> {
    pub fn on_success(mut self, callback: impl FnOnce(&ApiResponse) + Send + 'a) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Replaces the default notification for failures.
    pub fn on_error(mut self, callback: impl FnOnce(&Failure) + Send + 'a) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(message.into());
        self
    }

    pub async fn send(self) -> Result<ApiResponse, Failure> {
        let Call {
            requester,
            request,
            on_success,
            on_error,
            success_message,
        } = self;

        let outcome = match requester.gateway.execute(request).await {
            Ok(response) if response.is_failure() => Err(Failure::Application(response)),
            Ok(response) => Ok(response),
            Err(err) => Err(Failure::Gateway(err)),
        };

        match &outcome {
            Ok(response) => {
                if let Some(message) = success_message {
                    requester.notifier.success(&message);
                }
                if let Some(callback) = on_success {
                    callback(response);
                }
            }
            Err(failure) => match on_error {
                Some(callback) => callback(failure),
                None => requester.notifier.error(&failure.message()),
            },
        }

        outcome
    }
}
