//! Session client CLI
//!
//! Command-line front end for the authenticated request pipeline:
//! 1. `login <username>` exchanges credentials and stores the token pair
//! 2. `get <path>` / `post <path> <json>` send authenticated requests,
//!    refreshing an expired access credential transparently
//! 3. `logout` revokes the refresh credential and clears local state

mod config;
mod error;
mod metrics;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use common::Secret;
use session_auth::{CredentialKind, CredentialStore, FileCredentialStore};
use session_client::{LogoutOutcome, RequestPipeline, Route};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::ui::{TerminalNavigator, TerminalNotifier};

#[derive(Debug, PartialEq)]
enum Command {
    Login { username: String },
    Get { path: String },
    Post { path: String, body: serde_json::Value },
    Logout,
}

#[derive(Debug, PartialEq)]
struct Args {
    config: Option<String>,
    route: String,
    requires_auth: bool,
    print_metrics: bool,
    command: Command,
}

const USAGE: &str = "session-client [--config <path>] [--route <path>] [--requires-auth] \
                     [--print-metrics] <login <username> | get <path> | post <path> <json> | logout>";

/// Parse arguments (without the program name). Flags may appear anywhere.
fn parse_args(args: &[String]) -> error::Result<Args> {
    let mut config = None;
    let mut route = None;
    let mut requires_auth = false;
    let mut print_metrics = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                config = Some(flag_value(&mut iter, "--config")?);
            }
            "--route" => {
                route = Some(flag_value(&mut iter, "--route")?);
            }
            "--requires-auth" => requires_auth = true,
            "--print-metrics" => print_metrics = true,
            _ => positional.push(arg.as_str()),
        }
    }

    let command = match positional.as_slice() {
        ["login", username] => Command::Login {
            username: username.to_string(),
        },
        ["get", path] => Command::Get {
            path: path.to_string(),
        },
        ["post", path, body] => Command::Post {
            path: path.to_string(),
            body: serde_json::from_str(body)
                .map_err(|e| error::Error::InvalidBody(e.to_string()))?,
        },
        ["logout"] => Command::Logout,
        [] => return Err(error::Error::Usage(USAGE.into())),
        [name, ..] if !matches!(*name, "login" | "get" | "post" | "logout") => {
            return Err(error::Error::UnknownCommand(name.to_string()));
        }
        _ => return Err(error::Error::Usage(USAGE.into())),
    };

    // Without --route, the request path itself is the route the user is on
    let route = route.unwrap_or_else(|| match &command {
        Command::Get { path } | Command::Post { path, .. } => path.clone(),
        _ => "/".to_string(),
    });

    Ok(Args {
        config,
        route,
        requires_auth,
        print_metrics,
        command,
    })
}

fn flag_value<'a>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> error::Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| error::Error::Usage(format!("{flag} requires a value")))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support.
    // Logs go to stderr so stdout carries only response bodies.
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw)?;

    let prometheus = if args.print_metrics {
        Some(metrics::install_recorder().context("failed to install metrics recorder")?)
    } else {
        None
    };

    let config_path = Config::resolve_path(args.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(base_url = %config.client.base_url, "configuration loaded");

    let store = Arc::new(
        FileCredentialStore::load(config.credentials.path.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to load credentials from {}",
                    config.credentials.path.display()
                )
            })?,
    );
    let navigator = Arc::new(TerminalNavigator::stderr(Route::new(
        args.route.clone(),
        args.requires_auth,
    )));
    let pipeline = RequestPipeline::connect(
        &config.client_config(),
        store.clone(),
        Arc::new(TerminalNotifier::stderr()),
        navigator,
    )?;

    let result = run(&args.command, &pipeline, &config, store.as_ref()).await;

    if let Some(handle) = prometheus {
        print!("{}", handle.render());
    }
    result
}

async fn run(
    command: &Command,
    pipeline: &RequestPipeline,
    config: &Config,
    store: &dyn CredentialStore,
) -> Result<()> {
    match command {
        Command::Login { username } => {
            let password = std::env::var("SESSION_PASSWORD")
                .map(Secret::new)
                .map_err(|_| error::Error::MissingPassword)?;
            login(config, store, username, &password).await?;
            println!("logged in as {username}");
        }
        Command::Get { path } => {
            let response = pipeline.get(path).await.context("request failed")?;
            println!("{}", response.text());
        }
        Command::Post { path, body } => {
            let response = pipeline
                .post(path, body.clone())
                .await
                .context("request failed")?;
            println!("{}", response.text());
        }
        Command::Logout => match pipeline.logout().await {
            LogoutOutcome::Revoked | LogoutOutcome::AlreadyRevoked => println!("logged out"),
            LogoutOutcome::SignedOutLocally => println!("logged out (no active session)"),
            LogoutOutcome::Failed(_) => println!("logged out locally"),
        },
    }
    Ok(())
}

/// Exchange username/password for a token pair and persist both halves.
async fn login(
    config: &Config,
    store: &dyn CredentialStore,
    username: &str,
    password: &Secret<String>,
) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(config.client_config().timeout)
        .build()
        .context("failed to build HTTP client")?;

    let token = session_auth::obtain_token_pair(&client, &config.login_url(), username, password)
        .await
        .context("login failed")?;

    store
        .set(CredentialKind::Access, token.access.into())
        .await
        .context("failed to store access credential")?;
    if let Some(refresh) = token.refresh {
        store
            .set(CredentialKind::Refresh, refresh.into())
            .await
            .context("failed to store refresh credential")?;
    }
    info!(username, "login succeeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_get_with_flags() {
        let parsed = parse_args(&args(&[
            "--config",
            "/etc/session.toml",
            "get",
            "/api/user/profile/",
            "--route",
            "/user/profile",
            "--requires-auth",
        ]))
        .unwrap();

        assert_eq!(parsed.config.as_deref(), Some("/etc/session.toml"));
        assert_eq!(parsed.route, "/user/profile");
        assert!(parsed.requires_auth);
        assert!(!parsed.print_metrics);
        assert_eq!(
            parsed.command,
            Command::Get {
                path: "/api/user/profile/".into()
            }
        );
    }

    #[test]
    fn route_defaults_to_request_path() {
        let parsed = parse_args(&args(&["get", "/api/movies/"])).unwrap();
        assert_eq!(parsed.route, "/api/movies/");
        assert!(!parsed.requires_auth);
    }

    #[test]
    fn parses_post_body_as_json() {
        let parsed = parse_args(&args(&[
            "post",
            "/api/user/comments/",
            r#"{"content":"great"}"#,
            "--print-metrics",
        ]))
        .unwrap();

        assert!(parsed.print_metrics);
        match parsed.command {
            Command::Post { path, body } => {
                assert_eq!(path, "/api/user/comments/");
                assert_eq!(body["content"], "great");
            }
            other => panic!("expected post, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_json_body() {
        let err = parse_args(&args(&["post", "/api/x/", "{not json"])).unwrap_err();
        assert!(matches!(err, error::Error::InvalidBody(_)));
    }

    #[test]
    fn parses_login_and_logout() {
        assert_eq!(
            parse_args(&args(&["login", "alice"])).unwrap().command,
            Command::Login {
                username: "alice".into()
            }
        );
        assert_eq!(
            parse_args(&args(&["logout"])).unwrap().command,
            Command::Logout
        );
    }

    #[test]
    fn rejects_unknown_command() {
        assert_eq!(
            parse_args(&args(&["delete", "/api/x/"])).unwrap_err(),
            error::Error::UnknownCommand("delete".into())
        );
    }

    #[test]
    fn rejects_missing_arguments() {
        assert!(matches!(
            parse_args(&args(&[])).unwrap_err(),
            error::Error::Usage(_)
        ));
        assert!(matches!(
            parse_args(&args(&["get"])).unwrap_err(),
            error::Error::Usage(_)
        ));
        assert!(matches!(
            parse_args(&args(&["get", "/a", "--config"])).unwrap_err(),
            error::Error::Usage(_)
        ));
    }

    #[tokio::test]
    async fn login_stores_both_credentials() {
        use axum::Json;
        use axum::routing::post;

        let app = axum::Router::new().route(
            "/api/user/login/",
            post(|| async {
                Json(serde_json::json!({"access": "at_1", "refresh": "rt_1", "username": "alice"}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config = Config::default();
        config.client.base_url = format!("http://{addr}");
        let store = session_auth::MemoryCredentialStore::new();

        login(&config, &store, "alice", &Secret::new("pw".to_string()))
            .await
            .unwrap();

        assert_eq!(
            store.get(CredentialKind::Access).await.unwrap().expose(),
            "at_1"
        );
        assert_eq!(
            store.get(CredentialKind::Refresh).await.unwrap().expose(),
            "rt_1"
        );
    }
}
