//! Request pipeline: credential attachment, expiry detection, replay
//!
//! `send()` is the only way requests leave the client. It reads the access
//! credential from the store for every attempt, so a credential refreshed by
//! another caller is picked up without any local caching.

use std::sync::Arc;
use std::time::Duration;

use common::Token;
use session_auth::{CredentialKind, CredentialStore, EXPIRY_STATUS};
use tracing::{debug, instrument, warn};

use crate::collaborators::{Navigator, Notifier};
use crate::error::{Error, Result};
use crate::refresh::RefreshCoordinator;
use crate::transport::{HttpTransport, RequestDescriptor, Response, Transport, TransportError};

/// Library-side client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Per-request timeout for the HTTP client.
    pub timeout: Duration,
    /// Upper bound on one refresh exchange. `None` waits indefinitely.
    pub refresh_timeout: Option<Duration>,
    pub refresh_path: String,
    pub logout_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: session_auth::DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            refresh_timeout: Some(Duration::from_secs(30)),
            refresh_path: session_auth::REFRESH_PATH.to_string(),
            logout_path: session_auth::LOGOUT_PATH.to_string(),
        }
    }
}

pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    notifier: Arc<dyn Notifier>,
    refresh_path: String,
    pub(crate) logout_path: String,
}

impl RequestPipeline {
    /// Wire a pipeline and its refresh coordinator around the given
    /// collaborators. One pipeline per client; clones of the `Arc` share the
    /// single-flight state.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        config: &ClientConfig,
    ) -> Self {
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            notifier.clone(),
            navigator,
            config.refresh_timeout,
        ));
        Self {
            transport,
            store,
            coordinator,
            notifier,
            refresh_path: config.refresh_path.clone(),
            logout_path: config.logout_path.clone(),
        }
    }

    /// Build a pipeline over `HttpTransport` with a fresh reqwest client.
    pub fn connect(
        config: &ClientConfig,
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;
        let transport = Arc::new(HttpTransport::new(
            client,
            config.base_url.clone(),
            config.refresh_path.clone(),
        ));
        Ok(Self::new(transport, store, notifier, navigator, config))
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub(crate) fn notify(&self, message: &str) {
        self.notifier.show_error(message);
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        self.send(RequestDescriptor::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<Response> {
        self.send(RequestDescriptor::post(path, body)).await
    }

    /// Send a request, recovering transparently from one credential expiry.
    ///
    /// A 401 on a request that has not been replayed yet (and is not the
    /// refresh call) asks the coordinator for a new credential and replays
    /// once. The replay's result is final: a second 401 is returned as
    /// `Error::Status`. A failed refresh returns `Error::Auth` without
    /// notifying, since the coordinator already ran the session-expired
    /// side effects.
    #[instrument(skip_all, fields(
        request_id = %descriptor.request_id(),
        method = %descriptor.method,
        path = %descriptor.path,
    ))]
    pub async fn send(&self, mut descriptor: RequestDescriptor) -> Result<Response> {
        let access = self.access_credential().await;
        let result = self.transport.execute(&descriptor, access.as_ref()).await;

        let result = match result {
            Ok(response) if self.is_expiry(&response, &descriptor) => {
                descriptor.mark_retried();
                debug!("access credential expired, requesting refresh");

                let pair = match self.coordinator.request_refresh().await {
                    Ok(pair) => pair,
                    Err(failure) => {
                        crate::metrics::record_request(Some(EXPIRY_STATUS));
                        debug!(error = %failure, "refresh failed, request not replayed");
                        return Err(Error::Auth(failure));
                    }
                };

                let replay = self.transport.execute(&descriptor, Some(&pair.access)).await;
                crate::metrics::record_replay(match &replay {
                    Ok(response) if response.is_success() => "success",
                    Ok(response) if response.status == EXPIRY_STATUS => "expired",
                    _ => "failed",
                });
                replay
            }
            other => other,
        };

        self.finish(&descriptor, result)
    }

    async fn access_credential(&self) -> Option<Token> {
        self.store
            .get(CredentialKind::Access)
            .await
            .filter(|token| !token.is_empty())
    }

    fn is_expiry(&self, response: &Response, descriptor: &RequestDescriptor) -> bool {
        response.status == EXPIRY_STATUS
            && !descriptor.retried()
            && !self.is_refresh_call(descriptor)
    }

    fn is_refresh_call(&self, descriptor: &RequestDescriptor) -> bool {
        let path = descriptor.path.split('?').next().unwrap_or_default();
        path.ends_with(&self.refresh_path)
    }

    /// Turn the final attempt into the caller's result. Failures are
    /// classified, logged, shown to the notifier when the request allows
    /// it, and returned unchanged.
    fn finish(
        &self,
        descriptor: &RequestDescriptor,
        result: std::result::Result<Response, TransportError>,
    ) -> Result<Response> {
        let error = match result {
            Ok(response) if response.is_success() => {
                crate::metrics::record_request(Some(response.status));
                debug!(status = response.status, "request succeeded");
                return Ok(response);
            }
            Ok(response) => Error::Status {
                status: response.status,
                body: response.json_value(),
            },
            Err(e) => Error::Transport(e),
        };

        crate::metrics::record_request(error.status());
        let message = error.user_message();
        warn!(status = ?error.status(), error = %error, message = %message, "request failed");
        if descriptor.notify_errors() {
            self.notifier.show_error(&message);
        }
        Err(error)
    }
}
