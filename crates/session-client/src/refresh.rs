//! Single-flight credential refresh
//!
//! One `RefreshCoordinator` per client. The first caller to report an
//! expired credential becomes the leader and starts a refresh cycle; every
//! caller arriving while the cycle runs joins the waiter queue instead of
//! starting another exchange. When the cycle resolves, the state returns to
//! `Idle` and the queue is drained in the same lock section, then every
//! caller receives the same result in arrival order.
//!
//! The cycle runs on its own task. Dropping a caller's future (leader
//! included) cannot leave the coordinator stuck in `Refreshing`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::Token;
use session_auth::{CredentialKind, CredentialPair, CredentialStore, TokenResponse, clear_all};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::collaborators::{Navigator, Notifier, on_session_expired};
use crate::error::RefreshFailure;
use crate::transport::Transport;

type Outcome = Result<CredentialPair, RefreshFailure>;

const ABORTED: &str = "refresh cycle aborted";

fn aborted() -> RefreshFailure {
    RefreshFailure::Network(ABORTED.into())
}

/// Whether a refresh cycle is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

struct Inner {
    state: RefreshState,
    waiters: VecDeque<oneshot::Sender<Outcome>>,
}

pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn Transport>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    timeout: Option<Duration>,
}

impl RefreshCoordinator {
    /// `timeout` bounds the refresh exchange; `None` waits indefinitely.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                waiters: VecDeque::new(),
            }),
            store,
            transport,
            notifier,
            navigator,
            timeout,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.lock().state
    }

    /// Callers currently waiting on the in-flight cycle, leader included.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    /// Obtain a fresh credential pair, joining the in-flight cycle if there
    /// is one.
    ///
    /// On failure the stored credentials have already been cleared and the
    /// session-expired side effects have already run, once for the whole
    /// cycle.
    pub async fn request_refresh(self: &Arc<Self>) -> Outcome {
        let (leader, receiver) = self.join();

        if leader {
            debug!("starting refresh cycle");
            tokio::spawn(Arc::clone(self).run_cycle());
        } else {
            debug!("refresh in flight, queued behind it");
        }

        // The sender only goes away unresolved if the runtime is shutting down
        receiver.await.unwrap_or_else(|_| Err(aborted()))
    }

    /// Enqueue the caller and report whether it leads a new cycle. The state
    /// check and the commitment happen under one lock acquisition.
    fn join(&self) -> (bool, oneshot::Receiver<Outcome>) {
        let (sender, receiver) = oneshot::channel();
        let mut inner = self.lock();
        inner.waiters.push_back(sender);
        let leader = inner.state == RefreshState::Idle;
        inner.state = RefreshState::Refreshing;
        (leader, receiver)
    }

    async fn run_cycle(self: Arc<Self>) {
        let mut guard = ResolveOnDrop {
            coordinator: Arc::clone(&self),
            armed: true,
        };

        let outcome = self.exchange().await;

        let label = match &outcome {
            Ok(_) => {
                info!("credential refreshed");
                "success"
            }
            Err(failure) => {
                warn!(error = %failure, "refresh failed, session expired");
                on_session_expired(self.notifier.as_ref(), self.navigator.as_ref());
                failure.label()
            }
        };

        guard.armed = false;
        let released = self.resolve(outcome);
        debug!(waiters = released, outcome = label, "refresh cycle resolved");
        crate::metrics::record_refresh(label, released);
    }

    /// Run the exchange and update the store. Only the leader's cycle calls
    /// this, so it is the only store writer while `Refreshing`.
    async fn exchange(&self) -> Outcome {
        let refresh = match self.store.get(CredentialKind::Refresh).await {
            Some(token) if !token.is_empty() => token,
            _ => {
                info!("no refresh credential stored, skipping exchange");
                if let Err(e) = self.store.clear(CredentialKind::Access).await {
                    warn!(error = %e, "failed to clear access credential");
                }
                return Err(RefreshFailure::NoRefreshCredential);
            }
        };

        let exchange = self.transport.refresh(&refresh);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(result) => result.map_err(RefreshFailure::from),
                Err(_) => Err(RefreshFailure::TimedOut(limit)),
            },
            None => exchange.await.map_err(RefreshFailure::from),
        };

        match result {
            Ok(response) => Ok(self.store_pair(response, refresh).await),
            Err(failure) => {
                if let Err(e) = clear_all(self.store.as_ref()).await {
                    warn!(error = %e, "failed to clear credentials after failed refresh");
                }
                Err(failure)
            }
        }
    }

    /// Persist the new access credential and any rotated refresh credential.
    /// Write failures are logged; the pair is still handed to the waiters.
    async fn store_pair(&self, response: TokenResponse, previous: Token) -> CredentialPair {
        let access = Token::from(response.access);
        if let Err(e) = self.store.set(CredentialKind::Access, access.clone()).await {
            warn!(error = %e, "failed to persist refreshed access credential");
        }

        let refresh = match response.refresh {
            Some(rotated) => {
                let rotated = Token::from(rotated);
                if let Err(e) = self.store.set(CredentialKind::Refresh, rotated.clone()).await {
                    warn!(error = %e, "failed to persist rotated refresh credential");
                }
                rotated
            }
            None => previous,
        };

        CredentialPair { access, refresh }
    }

    /// End a cycle whose task died before resolving, the same way a failed
    /// exchange ends.
    async fn abandon(self: Arc<Self>) {
        if let Err(e) = clear_all(self.store.as_ref()).await {
            warn!(error = %e, "failed to clear credentials after aborted refresh");
        }
        self.expire_aborted();
    }

    fn expire_aborted(&self) {
        on_session_expired(self.notifier.as_ref(), self.navigator.as_ref());
        let released = self.resolve(Err(aborted()));
        crate::metrics::record_refresh("aborted", released);
    }

    /// Return to `Idle`, drain the queue, and release every waiter in
    /// arrival order. Returns how many were released.
    fn resolve(&self, outcome: Outcome) -> usize {
        let waiters = {
            let mut inner = self.lock();
            inner.state = RefreshState::Idle;
            std::mem::take(&mut inner.waiters)
        };

        let released = waiters.len();
        for waiter in waiters {
            // A caller that gave up has dropped its receiver
            let _ = waiter.send(outcome.clone());
        }
        released
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ends the session and releases the waiters if the cycle task is torn down
/// before resolving (panic in the exchange, runtime shutdown). Clearing the
/// store is async, so it runs on a fresh task when a runtime is available.
struct ResolveOnDrop {
    coordinator: Arc<RefreshCoordinator>,
    armed: bool,
}

impl Drop for ResolveOnDrop {
    fn drop(&mut self) {
        if self.armed {
            warn!("refresh cycle aborted before resolving");
            let coordinator = Arc::clone(&self.coordinator);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(coordinator.abandon());
                }
                Err(_) => coordinator.expire_aborted(),
            }
        }
    }
}
