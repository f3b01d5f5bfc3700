//! Logout: revoke the refresh credential server-side, then forget both
//!
//! The revocation request goes through the pipeline like any other call, so
//! an expired access credential is refreshed before logging out. Whatever
//! the server says, local credentials are cleared afterwards.

use session_auth::{BLACKLISTED_TOKEN_MARKER, CredentialKind, clear_all};
use tracing::{info, instrument, warn};

use crate::error::Error;
use crate::pipeline::RequestPipeline;
use crate::transport::RequestDescriptor;

/// How the server-side part of a logout went. Local credentials are
/// cleared in every case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The server blacklisted the refresh credential.
    Revoked,
    /// The server reported the refresh credential as already blacklisted.
    AlreadyRevoked,
    /// No refresh credential was stored, so nothing was sent.
    SignedOutLocally,
    /// Revocation failed; carries the message shown to the user.
    Failed(String),
}

impl RequestPipeline {
    /// Log out. Never fails: server errors are reported through the
    /// notifier and the returned outcome.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> LogoutOutcome {
        let outcome = match self.store().get(CredentialKind::Refresh).await {
            Some(refresh) if !refresh.is_empty() => {
                let request = RequestDescriptor::post(
                    self.logout_path.clone(),
                    serde_json::json!({ "refresh": refresh.expose() }),
                )
                .without_notifications();
                self.revoke(request).await
            }
            _ => LogoutOutcome::SignedOutLocally,
        };

        if let Err(e) = clear_all(self.store().as_ref()).await {
            warn!(error = %e, "failed to clear credentials on logout");
        }
        info!(outcome = ?outcome, "logged out");
        outcome
    }

    async fn revoke(&self, request: RequestDescriptor) -> LogoutOutcome {
        match self.send(request).await {
            Ok(_) => LogoutOutcome::Revoked,
            Err(e) if is_already_blacklisted(&e) => {
                info!("refresh credential already blacklisted");
                LogoutOutcome::AlreadyRevoked
            }
            // The refresh cycle already told the user the session expired
            Err(e @ Error::Auth(_)) => LogoutOutcome::Failed(e.user_message()),
            Err(e) => {
                let message = e.user_message();
                warn!(error = %e, "logout request failed");
                self.notify(&message);
                LogoutOutcome::Failed(message)
            }
        }
    }
}

fn is_already_blacklisted(error: &Error) -> bool {
    let Some(body) = error.body() else {
        return false;
    };
    ["error", "detail"].iter().any(|field| {
        body.get(field)
            .and_then(|v| v.as_str())
            .is_some_and(|text| text.contains(BLACKLISTED_TOKEN_MARKER))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SERVER_BUSY_MESSAGE;
    use crate::testing::{FakeBackend, REFRESH, RefreshBehavior, VALID_ACCESS, harness};
    use session_auth::{CredentialStore, LOGOUT_PATH};

    async fn assert_signed_out(store: &dyn CredentialStore) {
        assert!(store.get(CredentialKind::Access).await.is_none());
        assert!(store.get(CredentialKind::Refresh).await.is_none());
    }

    #[tokio::test]
    async fn successful_logout_revokes_and_clears() {
        let h = harness(
            FakeBackend::new(VALID_ACCESS, RefreshBehavior::issue("at_new")).respond(
                LOGOUT_PATH,
                200,
                serde_json::json!({"message": "logged out"}),
            ),
            Some(VALID_ACCESS),
            Some(REFRESH),
        );

        assert_eq!(h.pipeline.logout().await, LogoutOutcome::Revoked);

        let requests = h.backend.requests_to(LOGOUT_PATH);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].bearer.as_deref(), Some(VALID_ACCESS));
        assert_eq!(requests[0].body.as_ref().unwrap()["refresh"], REFRESH);
        assert_signed_out(h.store.as_ref()).await;
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn blacklisted_refresh_credential_counts_as_success() {
        let h = harness(
            FakeBackend::new(VALID_ACCESS, RefreshBehavior::issue("at_new")).respond(
                LOGOUT_PATH,
                400,
                serde_json::json!({"error": "invalid token: Token is blacklisted"}),
            ),
            Some(VALID_ACCESS),
            Some(REFRESH),
        );

        assert_eq!(h.pipeline.logout().await, LogoutOutcome::AlreadyRevoked);
        assert_signed_out(h.store.as_ref()).await;
        assert!(h.notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn server_failure_is_notified_and_still_clears() {
        let h = harness(
            FakeBackend::new(VALID_ACCESS, RefreshBehavior::issue("at_new")).respond(
                LOGOUT_PATH,
                500,
                serde_json::json!({}),
            ),
            Some(VALID_ACCESS),
            Some(REFRESH),
        );

        assert_eq!(
            h.pipeline.logout().await,
            LogoutOutcome::Failed(SERVER_BUSY_MESSAGE.to_string())
        );
        assert_eq!(h.notifier.messages(), vec![SERVER_BUSY_MESSAGE]);
        assert_signed_out(h.store.as_ref()).await;
    }

    #[tokio::test]
    async fn no_refresh_credential_signs_out_locally() {
        let h = harness(
            FakeBackend::new(VALID_ACCESS, RefreshBehavior::issue("at_new")),
            Some(VALID_ACCESS),
            None,
        );

        assert_eq!(h.pipeline.logout().await, LogoutOutcome::SignedOutLocally);
        assert!(h.backend.requests().is_empty());
        assert_signed_out(h.store.as_ref()).await;
    }

    #[tokio::test]
    async fn expired_access_is_refreshed_before_revoking() {
        let h = harness(
            FakeBackend::new(VALID_ACCESS, RefreshBehavior::issue("at_new")),
            Some("at_expired"),
            Some(REFRESH),
        );

        assert_eq!(h.pipeline.logout().await, LogoutOutcome::Revoked);

        let requests = h.backend.requests_to(LOGOUT_PATH);
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].bearer.as_deref(), Some("at_new"));
        assert_eq!(h.backend.refresh_calls(), 1);
        assert_signed_out(h.store.as_ref()).await;
    }
}
