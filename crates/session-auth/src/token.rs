//! Token endpoint exchanges
//!
//! Two interactions with the backend's JWT endpoints:
//! 1. Login: username/password for an access/refresh pair
//! 2. Refresh: refresh credential for a new access credential, plus a
//!    rotated refresh credential when the backend rotates them
//!
//! Both POST JSON and read JSON back. Neither goes through the request
//! pipeline, so an expired-credential response here can never trigger a
//! nested refresh.

use common::{Secret, Token};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Response from the login and refresh endpoints.
///
/// `refresh` is optional: the refresh endpoint only returns one when
/// rotation is enabled server-side.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// Exchange username and password for a fresh credential pair.
///
/// Fails with `InvalidCredentials` on 400/401/403 (wrong password, banned
/// account) and with `TokenExchange` if the response lacks a refresh token.
pub async fn obtain_token_pair(
    client: &reqwest::Client,
    url: &str,
    username: &str,
    password: &Secret<String>,
) -> Result<TokenResponse> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "username": username,
            "password": password.expose(),
        }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;

    let token = read_token_response(response, "login").await?;
    if token.refresh.is_none() {
        return Err(Error::TokenExchange(
            "login response missing refresh credential".into(),
        ));
    }
    debug!(username, "login exchange succeeded");
    Ok(token)
}

/// Trade a refresh credential for a new access credential.
///
/// 400/401/403 mean the refresh credential is missing, expired, or
/// blacklisted and map to `InvalidCredentials`; other failures are
/// `TokenExchange` (bad status or body) or `Http` (no response at all).
pub async fn refresh_token(
    client: &reqwest::Client,
    url: &str,
    refresh: &Token,
) -> Result<TokenResponse> {
    let response = client
        .post(url)
        .json(&serde_json::json!({ "refresh": refresh.expose() }))
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let token = read_token_response(response, "refresh").await?;
    debug!(rotated = token.refresh.is_some(), "refresh exchange succeeded");
    Ok(token)
}

async fn read_token_response(response: reqwest::Response, exchange: &str) -> Result<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if matches!(status.as_u16(), 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "{exchange} rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "{exchange} endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid {exchange} response: {e}")))
}
