//! Test doubles shared by the unit tests in this crate

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use common::Token;
use session_auth::{MemoryCredentialStore, TokenResponse};
use tokio::sync::Notify;

use crate::collaborators::{Navigator, Notifier, Route};
use crate::pipeline::{ClientConfig, RequestPipeline};
use crate::transport::{RequestDescriptor, Response, Transport, TransportError};

pub(crate) const EXPIRED_ACCESS: &str = "at_expired";
pub(crate) const VALID_ACCESS: &str = "at_valid";
pub(crate) const REFRESH: &str = "rt_1";

/// What the fake refresh endpoint does.
pub(crate) enum RefreshBehavior {
    Issue {
        access: String,
        refresh: Option<String>,
    },
    Reject,
    Unreachable,
    Hang,
    Panic,
}

impl RefreshBehavior {
    pub(crate) fn issue(access: &str) -> Self {
        RefreshBehavior::Issue {
            access: access.to_string(),
            refresh: None,
        }
    }
}

enum Canned {
    Respond(u16, serde_json::Value),
    Fail(String),
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub path: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

/// In-process backend. Requests carrying the accepted bearer succeed, any
/// other bearer (or none) gets a 401. A successful refresh makes the issued
/// access credential the accepted one.
pub(crate) struct FakeBackend {
    accepted: Mutex<String>,
    behavior: RefreshBehavior,
    gate: Option<Arc<Notify>>,
    canned: Mutex<HashMap<String, Canned>>,
    requests: Mutex<Vec<RecordedRequest>>,
    refresh_tokens: Mutex<Vec<String>>,
    refresh_calls: AtomicUsize,
}

impl FakeBackend {
    pub(crate) fn new(accepted: &str, behavior: RefreshBehavior) -> Self {
        Self {
            accepted: Mutex::new(accepted.to_string()),
            behavior,
            gate: None,
            canned: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            refresh_tokens: Mutex::new(Vec::new()),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    /// Hold every refresh exchange until `release_refresh` is called.
    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    /// Answer `path` with a fixed status and body, whatever the bearer.
    pub(crate) fn respond(self, path: &str, status: u16, body: serde_json::Value) -> Self {
        self.canned
            .lock()
            .unwrap()
            .insert(path.to_string(), Canned::Respond(status, body));
        self
    }

    /// Fail `path` at the transport level.
    pub(crate) fn fail(self, path: &str, message: &str) -> Self {
        self.canned
            .lock()
            .unwrap()
            .insert(path.to_string(), Canned::Fail(message.to_string()));
        self
    }

    pub(crate) fn release_refresh(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Refresh credentials presented to the refresh endpoint, in order.
    pub(crate) fn refresh_tokens(&self) -> Vec<String> {
        self.refresh_tokens.lock().unwrap().clone()
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

impl Transport for FakeBackend {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
        bearer: Option<&'a Token>,
    ) -> Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let bearer = bearer.map(|t| t.expose().clone());
            self.requests.lock().unwrap().push(RecordedRequest {
                path: request.path.clone(),
                bearer: bearer.clone(),
                body: request.body.clone(),
            });

            tokio::task::yield_now().await;

            let (status, body) = {
                let canned = self.canned.lock().unwrap();
                match canned.get(&request.path) {
                    Some(Canned::Fail(message)) => return Err(TransportError::new(message.clone())),
                    Some(Canned::Respond(status, body)) => (*status, body.clone()),
                    None => {
                        let accepted = self.accepted.lock().unwrap();
                        if bearer.as_deref() == Some(accepted.as_str()) {
                            (200, serde_json::json!({"ok": true, "path": request.path}))
                        } else {
                            (401, serde_json::json!({"code": "token_not_valid"}))
                        }
                    }
                }
            };
            Ok(Response::new(status, Bytes::from(body.to_string())))
        })
    }

    fn refresh<'a>(
        &'a self,
        refresh: &'a Token,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<TokenResponse>> + Send + 'a>> {
        Box::pin(async move {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refresh_tokens
                .lock()
                .unwrap()
                .push(refresh.expose().clone());

            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            tokio::task::yield_now().await;

            match &self.behavior {
                RefreshBehavior::Issue { access, refresh } => {
                    *self.accepted.lock().unwrap() = access.clone();
                    Ok(TokenResponse {
                        access: access.clone(),
                        refresh: refresh.clone(),
                    })
                }
                RefreshBehavior::Reject => Err(session_auth::Error::InvalidCredentials(
                    "refresh rejected (401): token is invalid or expired".into(),
                )),
                RefreshBehavior::Unreachable => {
                    Err(session_auth::Error::Http("connection refused".into()))
                }
                RefreshBehavior::Hang => std::future::pending().await,
                RefreshBehavior::Panic => panic!("refresh exchange blew up"),
            }
        })
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub(crate) struct RecordingNavigator {
    route: Route,
    redirects: Mutex<Vec<Option<String>>>,
    prompts: AtomicUsize,
}

impl RecordingNavigator {
    pub(crate) fn on(path: &str, requires_auth: bool) -> Self {
        Self {
            route: Route::new(path, requires_auth),
            redirects: Mutex::new(Vec::new()),
            prompts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn redirects(&self) -> Vec<Option<String>> {
        self.redirects.lock().unwrap().clone()
    }

    pub(crate) fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn current_route(&self) -> Route {
        self.route.clone()
    }

    fn redirect_to_login(&self, origin_path: Option<&str>) {
        self.redirects
            .lock()
            .unwrap()
            .push(origin_path.map(str::to_string));
    }

    fn prompt_login_inline(&self) {
        self.prompts.fetch_add(1, Ordering::SeqCst);
    }
}

/// A pipeline wired to fakes, with handles on every collaborator.
pub(crate) struct Harness {
    pub backend: Arc<FakeBackend>,
    pub store: Arc<MemoryCredentialStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub navigator: Arc<RecordingNavigator>,
    pub pipeline: Arc<RequestPipeline>,
}

/// Build a harness on the protected route `/user/profile`.
pub(crate) fn harness(
    backend: FakeBackend,
    access: Option<&str>,
    refresh: Option<&str>,
) -> Harness {
    harness_with(backend, access, refresh, &ClientConfig::default())
}

pub(crate) fn harness_with(
    backend: FakeBackend,
    access: Option<&str>,
    refresh: Option<&str>,
    config: &ClientConfig,
) -> Harness {
    let backend = Arc::new(backend);
    let store = Arc::new(MemoryCredentialStore::with_tokens(access, refresh));
    let notifier = Arc::new(RecordingNotifier::default());
    let navigator = Arc::new(RecordingNavigator::on("/user/profile", true));
    let pipeline = Arc::new(RequestPipeline::new(
        backend.clone(),
        store.clone(),
        notifier.clone(),
        navigator.clone(),
        config,
    ));
    Harness {
        backend,
        store,
        notifier,
        navigator,
        pipeline,
    }
}

/// Yield to the scheduler until `condition` holds.
pub(crate) async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
