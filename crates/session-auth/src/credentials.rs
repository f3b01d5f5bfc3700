//! Credential storage for the access/refresh pair
//!
//! `CredentialStore` is the seam between the request pipeline and whatever
//! durable client-side storage the application uses. Two implementations
//! ship here: `FileCredentialStore` (JSON file, atomic temp-file + rename
//! writes, 0600 permissions) and `MemoryCredentialStore` (process-local).
//!
//! The store is the single source of truth for tokens. Callers read through
//! it at the start of every operation instead of caching tokens themselves.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Token;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Which half of the credential pair an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Access,
    Refresh,
}

impl CredentialKind {
    /// Label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            CredentialKind::Access => "access",
            CredentialKind::Refresh => "refresh",
        }
    }
}

/// A complete access/refresh pair, as handed out after a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: Token,
    pub refresh: Token,
}

/// Durable storage for the access and refresh credentials.
///
/// Uses `Pin<Box<dyn Future>>` return types so the store can be shared as
/// `Arc<dyn CredentialStore>` between the pipeline and the coordinator.
pub trait CredentialStore: Send + Sync {
    /// Read one credential. Absence is not an error.
    fn get(&self, kind: CredentialKind) -> Pin<Box<dyn Future<Output = Option<Token>> + Send + '_>>;

    /// Write one credential, replacing any previous value.
    fn set(
        &self,
        kind: CredentialKind,
        token: Token,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Remove one credential. Clearing an absent credential succeeds.
    fn clear(&self, kind: CredentialKind) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Clear both credentials, attempting the second even if the first fails.
///
/// Returns the first error encountered.
pub async fn clear_all(store: &dyn CredentialStore) -> Result<()> {
    let access = store.clear(CredentialKind::Access).await;
    let refresh = store.clear(CredentialKind::Refresh).await;
    if let Err(ref e) = access {
        warn!(error = %e, "failed to clear access credential");
    }
    if let Err(ref e) = refresh {
        warn!(error = %e, "failed to clear refresh credential");
    }
    access.and(refresh)
}

/// Process-local credential store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<HashMap<CredentialKind, Token>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with the given credentials.
    pub fn with_tokens(access: Option<&str>, refresh: Option<&str>) -> Self {
        let mut state = HashMap::new();
        if let Some(access) = access {
            state.insert(CredentialKind::Access, Token::from(access));
        }
        if let Some(refresh) = refresh {
            state.insert(CredentialKind::Refresh, Token::from(refresh));
        }
        Self {
            state: Mutex::new(state),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, kind: CredentialKind) -> Pin<Box<dyn Future<Output = Option<Token>> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.get(&kind).cloned() })
    }

    fn set(
        &self,
        kind: CredentialKind,
        token: Token,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.state.lock().await.insert(kind, token);
            Ok(())
        })
    }

    fn clear(&self, kind: CredentialKind) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            self.state.lock().await.remove(&kind);
            Ok(())
        })
    }
}

/// On-disk layout of the credential file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// Credential store persisted as a JSON file.
///
/// The Mutex serializes all writes. Reads lock briefly to clone the
/// in-memory copy, so request-time reads never touch the disk.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<CredentialKind, Token>>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (signed-out cold start).
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let file: CredentialFile = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            let mut state = HashMap::new();
            if let Some(access) = file.access_token {
                state.insert(CredentialKind::Access, Token::new(access));
            }
            if let Some(refresh) = file.refresh_token {
                state.insert(CredentialKind::Refresh, Token::new(refresh));
            }
            info!(
                path = %path.display(),
                has_access = state.contains_key(&CredentialKind::Access),
                has_refresh = state.contains_key(&CredentialKind::Refresh),
                "loaded credentials"
            );
            state
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            let state = HashMap::new();
            write_atomic(&path, &state).await?;
            state
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, kind: CredentialKind) -> Pin<Box<dyn Future<Output = Option<Token>> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.get(&kind).cloned() })
    }

    fn set(
        &self,
        kind: CredentialKind,
        token: Token,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.insert(kind, token);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(kind = kind.label(), "stored credential");
            Ok(())
        })
    }

    fn clear(&self, kind: CredentialKind) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !state.contains_key(&kind) {
                return Ok(());
            }
            let mut next = state.clone();
            next.remove(&kind);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(kind = kind.label(), "cleared credential");
            Ok(())
        })
    }
}

/// Write credentials to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target so a crash mid-write never leaves a truncated file. The file
/// holds bearer credentials, so permissions are 0600 on unix.
async fn write_atomic(path: &Path, state: &HashMap<CredentialKind, Token>) -> Result<()> {
    let file = CredentialFile {
        access_token: state.get(&CredentialKind::Access).map(|t| t.expose().clone()),
        refresh_token: state.get(&CredentialKind::Refresh).map(|t| t.expose().clone()),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
