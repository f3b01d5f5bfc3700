//! Credential persistence and token endpoint exchanges
//!
//! Provides the credential store seam used by the request pipeline, a
//! file-backed and an in-memory implementation, and the HTTP exchanges
//! against the token endpoints. This crate knows nothing about request
//! replay or refresh coordination; that lives in `session-client`.
//!
//! Credential flow:
//! 1. `token::obtain_token_pair()` exchanges username/password for a pair
//! 2. Both tokens saved via `CredentialStore::set()`
//! 3. On expiry, `token::refresh_token()` trades the refresh credential for
//!    a new access credential (and possibly a rotated refresh credential)
//! 4. On logout or unrecoverable failure, `clear_all()` wipes both

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{
    CredentialKind, CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    clear_all,
};
pub use error::{Error, Result};
pub use token::{TokenResponse, obtain_token_pair, refresh_token};
