//! Side effects applied to failed API calls before they reach the cache.
//!
//! A 401 sends the user back to the anonymous landing page unless they are
//! already on a public route. A 403 is only reported.

use std::sync::{Arc, Mutex};

use tracing::{error, warn};

use crate::cache::{FetchError, mutex_lock};

const SOURCE: &str = "infra::http::boundary";

/// Routes reachable without a session.
pub const PUBLIC_ROUTES: [&str; 3] = ["/", "/login", "/register"];
pub const LANDING_ROUTE: &str = "/";

pub fn is_public_route(path: &str) -> bool {
    PUBLIC_ROUTES.contains(&path)
}

/// Where the user currently is, and how to move them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn redirect(&self, path: &str);
}

/// Navigator that only tracks a path and logs redirects; used by the CLI.
#[derive(Debug)]
pub struct TrackingNavigator {
    path: Mutex<String>,
}

impl TrackingNavigator {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Mutex::new(path.into()),
        }
    }

    pub fn set_path(&self, path: impl Into<String>) {
        *mutex_lock(&self.path, SOURCE, "set_path") = path.into();
    }
}

impl Default for TrackingNavigator {
    fn default() -> Self {
        Self::new(LANDING_ROUTE)
    }
}

impl Navigator for TrackingNavigator {
    fn current_path(&self) -> String {
        mutex_lock(&self.path, SOURCE, "current_path").clone()
    }

    fn redirect(&self, path: &str) {
        warn!(to = path, "Session rejected by server; returning to landing page");
        self.set_path(path);
    }
}

#[derive(Clone)]
pub struct AuthBoundary {
    navigator: Arc<dyn Navigator>,
}

impl AuthBoundary {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { navigator }
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Apply the boundary rules for one failed request.
    pub fn on_failure(&self, err: &FetchError) {
        if err.is_unauthorized() {
            let current = self.navigator.current_path();
            if !is_public_route(&current) {
                self.navigator.redirect(LANDING_ROUTE);
            }
        } else if err.is_forbidden() {
            error!(message = %err.message, "Access forbidden");
        }
    }
}
