//! Authenticated request pipeline with single-flight credential refresh
//!
//! Every request goes through `RequestPipeline::send`, which attaches the
//! stored access credential, and on a 401 asks the `RefreshCoordinator` for
//! a new one. The coordinator guarantees that only one refresh exchange is
//! in flight per client: the first caller to see an expired credential
//! leads the cycle, everyone else queues and is released in arrival order
//! with the leader's result. The original request is then replayed once.
//!
//! Request lifecycle:
//! 1. Caller builds a `RequestDescriptor` and calls `send`
//! 2. Access credential (if any) attached as a bearer header
//! 3. Non-401 response → success, or classified + notified + returned
//! 4. 401 on a request not yet retried → `request_refresh()`
//! 5. Refresh success → replay once with the new credential, return verbatim
//! 6. Refresh failure → credentials cleared, session-expired side effects
//!    fired once per cycle, `Error::Auth` returned to every dependent caller

pub mod classify;
pub mod collaborators;
pub mod error;
pub mod logout;
pub mod metrics;
pub mod pipeline;
pub mod refresh;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::classify_error;
pub use collaborators::{Navigator, Notifier, Route, on_session_expired};
pub use error::{Error, RefreshFailure, Result};
pub use logout::LogoutOutcome;
pub use pipeline::{ClientConfig, RequestPipeline};
pub use refresh::{RefreshCoordinator, RefreshState};
pub use transport::{HttpTransport, RequestDescriptor, Response, Transport, TransportError};
