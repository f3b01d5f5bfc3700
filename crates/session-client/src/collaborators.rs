//! UI collaborators invoked by the pipeline
//!
//! The pipeline never renders anything itself. It reports through two
//! injected traits: `Notifier` for error text and `Navigator` for sending
//! the user to log in again once the session is unrecoverable.

use tracing::info;

use crate::classify::SESSION_EXPIRED_MESSAGE;

/// The route the user is currently on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Full path including query, used as the post-login return target.
    pub path: String,
    /// Whether the route is only reachable when signed in.
    pub requires_auth: bool,
}

impl Route {
    pub fn new(path: impl Into<String>, requires_auth: bool) -> Self {
        Self {
            path: path.into(),
            requires_auth,
        }
    }
}

/// Surfaces human-readable error text to the user.
pub trait Notifier: Send + Sync {
    fn show_error(&self, message: &str);
}

/// Navigation controller hooks for an expired session.
pub trait Navigator: Send + Sync {
    /// The route active right now.
    fn current_route(&self) -> Route;

    /// Leave the current route for the login entry point. `origin_path` is
    /// where to return after a successful login.
    fn redirect_to_login(&self, origin_path: Option<&str>);

    /// Ask for a login prompt on top of the current route without leaving it.
    fn prompt_login_inline(&self);
}

/// Run the unrecoverable-session side effects.
///
/// Called once per failed refresh cycle, never once per dependent request.
/// Protected routes redirect to login and remember where the user was;
/// public routes keep the user in place and prompt inline.
pub fn on_session_expired(notifier: &dyn Notifier, navigator: &dyn Navigator) {
    notifier.show_error(SESSION_EXPIRED_MESSAGE);

    let route = navigator.current_route();
    if route.requires_auth {
        info!(origin = %route.path, "session expired on protected route, redirecting to login");
        navigator.redirect_to_login(Some(&route.path));
    } else {
        info!(route = %route.path, "session expired on public route, prompting login");
        navigator.prompt_login_inline();
    }
}
