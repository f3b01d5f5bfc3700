//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Credentials never live in the TOML; they are kept in the credential file
//! named by `credentials.path`.

use serde::Deserialize;
use session_client::ClientConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub credentials: CredentialsSection,
}

/// Backend endpoints and timeouts
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Upper bound on one refresh exchange; 0 disables the bound.
    #[serde(default = "default_timeout")]
    pub refresh_timeout_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            refresh_timeout_secs: default_timeout(),
            refresh_path: default_refresh_path(),
            logout_path: default_logout_path(),
            login_path: default_login_path(),
        }
    }
}

/// Where the access/refresh pair is persisted
#[derive(Debug, Deserialize)]
pub struct CredentialsSection {
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

fn default_base_url() -> String {
    session_auth::DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_path() -> String {
    session_auth::REFRESH_PATH.to_string()
}

fn default_logout_path() -> String {
    session_auth::LOGOUT_PATH.to_string()
}

fn default_login_path() -> String {
    session_auth::LOGIN_PATH.to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `API_BASE_URL` replaces `client.base_url` when set.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.client.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.client.base_url.starts_with("http://")
            && !self.client.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.client.base_url
            )));
        }

        if self.client.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        for (name, path) in [
            ("refresh_path", &self.client.refresh_path),
            ("logout_path", &self.client.logout_path),
            ("login_path", &self.client.login_path),
        ] {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {path}"
                )));
            }
        }

        Ok(())
    }

    /// Library-side settings for the request pipeline.
    pub fn client_config(&self) -> ClientConfig {
        let refresh_timeout = match self.client.refresh_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        ClientConfig {
            base_url: self.client.base_url.clone(),
            timeout: Duration::from_secs(self.client.timeout_secs),
            refresh_timeout,
            refresh_path: self.client.refresh_path.clone(),
            logout_path: self.client.logout_path.clone(),
        }
    }

    pub fn login_url(&self) -> String {
        format!(
            "{}{}",
            self.client.base_url.trim_end_matches('/'),
            self.client.login_path
        )
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("session-client.toml")
    }
}
