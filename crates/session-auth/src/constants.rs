//! Backend endpoint layout
//!
//! Paths are relative to the configured base URL. They match the session
//! backend's JWT routes; all of them can be overridden through client config.

/// Base URL used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Token refresh endpoint. Requests to this path are never refreshed themselves.
pub const REFRESH_PATH: &str = "/api/token/refresh/";

/// Username/password login endpoint returning an access/refresh pair.
pub const LOGIN_PATH: &str = "/api/user/login/";

/// Logout endpoint that blacklists the posted refresh credential.
pub const LOGOUT_PATH: &str = "/api/user/logout/";

/// Status the backend uses to signal an invalid or expired access credential.
pub const EXPIRY_STATUS: u16 = 401;

/// Fragment of the backend error text for an already-blacklisted refresh
/// credential. Logout treats it as success.
pub const BLACKLISTED_TOKEN_MARKER: &str = "Token is blacklisted";
