//! Error types for the request pipeline

use std::time::Duration;

use crate::classify::{SESSION_EXPIRED_MESSAGE, classify_error};
use crate::transport::TransportError;

/// Why a refresh cycle failed.
///
/// Cloned to every waiter of the cycle, so it carries messages rather than
/// the underlying error values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshFailure {
    #[error("no refresh credential stored")]
    NoRefreshCredential,

    #[error("refresh request failed: {0}")]
    Network(String),

    #[error("refresh credential rejected: {0}")]
    ServerRejected(String),

    #[error("refresh timed out after {0:?}")]
    TimedOut(Duration),
}

impl RefreshFailure {
    /// Outcome label for metrics and logging.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshFailure::NoRefreshCredential => "no_refresh_credential",
            RefreshFailure::Network(_) => "network",
            RefreshFailure::ServerRejected(_) => "server_rejected",
            RefreshFailure::TimedOut(_) => "timed_out",
        }
    }
}

impl From<session_auth::Error> for RefreshFailure {
    fn from(e: session_auth::Error) -> Self {
        match e {
            session_auth::Error::Http(msg) | session_auth::Error::Io(msg) => {
                RefreshFailure::Network(msg)
            }
            session_auth::Error::InvalidCredentials(msg)
            | session_auth::Error::TokenExchange(msg)
            | session_auth::Error::CredentialParse(msg) => RefreshFailure::ServerRejected(msg),
        }
    }
}

/// Terminal outcome of a request that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The credential expired and could not be refreshed.
    #[error("session expired: {0}")]
    Auth(#[from] RefreshFailure),

    /// The server answered with a non-success status that the pipeline does
    /// not recover from (including a 401 on an already-replayed request).
    #[error("request failed with status {status}")]
    Status {
        status: u16,
        body: Option<serde_json::Value>,
    },

    /// No response was received.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parsed JSON body of the failed response, if there was one.
    pub fn body(&self) -> Option<&serde_json::Value> {
        match self {
            Error::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Human-readable message for the notifier.
    pub fn user_message(&self) -> String {
        match self {
            Error::Auth(_) => SESSION_EXPIRED_MESSAGE.to_string(),
            Error::Status { status, body } => classify_error(Some(*status), body.as_ref(), None),
            Error::Transport(e) => classify_error(None, None, Some(e.message())),
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
