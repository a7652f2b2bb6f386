//! Failure recovery: the guarded, idempotent path taken when credentials
//! cannot be restored.
//!
//! Many requests can fail in the same instant; only one client-wide action
//! (redirect to login, or reload in place) may result. The guard is an
//! atomic compare-and-set so the invariant is visible in code rather than
//! incidental to scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::auth::store::TokenStore;

/// Navigation surface supplied by the embedding shell. Route inspection and
/// the actual redirect/reload are UI concerns; the controller only decides
/// which one happens.
pub trait Navigator: Send + Sync {
    /// Route currently being displayed, e.g. `/admin/datasets/42`.
    fn current_route(&self) -> String;

    /// Navigate to the login entry point, optionally carrying the route to
    /// resume after authentication.
    fn navigate_to_login(&self, resume: Option<&str>);

    /// Reload the current view in place.
    fn reload(&self);
}

pub struct RecoveryController {
    guard: AtomicBool,
    store: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    privileged_prefixes: Vec<String>,
    settle_delay: Duration,
}

impl RecoveryController {
    pub fn new(
        store: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
        privileged_prefixes: Vec<String>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            guard: AtomicBool::new(false),
            store,
            navigator,
            privileged_prefixes,
            settle_delay,
        }
    }

    fn is_privileged(&self, route: &str) -> bool {
        self.privileged_prefixes
            .iter()
            .any(|prefix| route.starts_with(prefix.as_str()))
    }

    /// Run one recovery episode. A no-op while an episode is already in
    /// progress, so a storm of concurrent failures collapses into a single
    /// user-visible action.
    pub async fn handle(&self) {
        if self
            .guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("recovery already in progress, skipping");
            return;
        }

        let route = self.navigator.current_route();
        let privileged = self.is_privileged(&route);

        if privileged {
            // Remembered across the login round-trip so the operator lands
            // back where the session died.
            self.store.set_redirect_target(&route);
        }

        // Notification suppressed: listeners reacting to "session changed"
        // must not re-enter this same flow while it runs.
        self.store.clear(true);

        // Let in-flight cache invalidation settle before navigating, so a
        // component mounting during the transition cannot read a stale
        // session.
        tokio::time::sleep(self.settle_delay).await;

        if privileged {
            info!(route = %route, "session unrecoverable, redirecting to login");
            self.navigator.navigate_to_login(Some(&route));
        } else {
            info!(route = %route, "session unrecoverable, reloading view");
            self.navigator.reload();
        }

        self.guard.store(false, Ordering::SeqCst);
    }
}
