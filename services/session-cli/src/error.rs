//! CLI-specific error types

use thiserror::Error;

/// Invocation errors detected before any request is made.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("usage: {0}")]
    Usage(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("request body is not valid JSON: {0}")]
    InvalidBody(String),

    #[error("SESSION_PASSWORD must be set for login")]
    MissingPassword,
}

/// Result alias using CLI Error
pub type Result<T> = std::result::Result<T, Error>;
