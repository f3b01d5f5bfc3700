//! Terminal implementations of the notifier and navigator
//!
//! There is no real router in a CLI. The current route comes from
//! `--route`/`--requires-auth`, and "navigation" prints what the user has
//! to do next.

use std::io::Write;
use std::sync::Mutex;

use session_client::{Navigator, Notifier, Route};

type Sink = Mutex<Box<dyn Write + Send>>;

fn emit(sink: &Sink, line: &str) {
    let mut out = sink.lock().unwrap_or_else(|e| e.into_inner());
    // Nothing sensible to do if the terminal is gone
    let _ = writeln!(out, "{line}");
}

/// Prints error text to the terminal.
pub struct TerminalNotifier {
    sink: Sink,
}

impl TerminalNotifier {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }
}

impl Notifier for TerminalNotifier {
    fn show_error(&self, message: &str) {
        emit(&self.sink, &format!("error: {message}"));
    }
}

/// Reports login requirements for the route given on the command line.
pub struct TerminalNavigator {
    route: Route,
    sink: Sink,
}

impl TerminalNavigator {
    pub fn new(route: Route, sink: Box<dyn Write + Send>) -> Self {
        Self {
            route,
            sink: Mutex::new(sink),
        }
    }

    pub fn stderr(route: Route) -> Self {
        Self::new(route, Box::new(std::io::stderr()))
    }
}

impl Navigator for TerminalNavigator {
    fn current_route(&self) -> Route {
        self.route.clone()
    }

    fn redirect_to_login(&self, origin_path: Option<&str>) {
        let line = match origin_path {
            Some(origin) => format!(
                "login required: run `session-client login <username>`, then return to {origin}"
            ),
            None => "login required: run `session-client login <username>`".to_string(),
        };
        emit(&self.sink, &line);
    }

    fn prompt_login_inline(&self) {
        emit(
            &self.sink,
            "signed out: log in with `session-client login <username>` to continue",
        );
    }
}
