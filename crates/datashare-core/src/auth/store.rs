//! Token store: durable persistence of the credential pair plus the derived
//! session blob, with change notifications.
//!
//! The refresh credential is the sole arbiter of "is this session alive".
//! An absent or expired access credential only means the next request will
//! go through a refresh; it never, by itself, ends the session.

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::auth::claims::CredentialInspector;
use crate::models::Session;
use crate::storage::StorageBackend;

/// Storage keys for the store-owned entries.
const KEY_ACCESS: &str = "access-token";
const KEY_REFRESH: &str = "refresh-token";
const KEY_SESSION: &str = "cached-session";
const KEY_REDIRECT: &str = "redirect-target";

/// Broadcast channel capacity; listeners that fall behind lose old events,
/// which is fine since only the latest authentication state matters.
const EVENT_CAPACITY: usize = 8;

/// Session-changed notification delivered on credential set/clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct SessionEvent {
    pub is_authenticated: bool,
}

pub struct TokenStore {
    backend: Box<dyn StorageBackend>,
    inspector: Box<dyn CredentialInspector>,
    events: broadcast::Sender<SessionEvent>,
}

impl TokenStore {
    pub fn new(
        backend: Box<dyn StorageBackend>,
        inspector: Box<dyn CredentialInspector>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            inspector,
            events,
        }
    }

    /// Subscribe to session-changed notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "storage read failed");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.backend.set(key, value) {
            warn!(key, error = %e, "storage write failed");
        }
    }

    fn erase(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            warn!(key, error = %e, "storage remove failed");
        }
    }

    /// Current access credential, if one is set. An empty entry is the
    /// placeholder for "unset" and reads as absent.
    pub fn access(&self) -> Option<String> {
        self.read(KEY_ACCESS).filter(|t| !t.is_empty())
    }

    /// Current refresh credential, if one is set.
    pub fn refresh_credential(&self) -> Option<String> {
        self.read(KEY_REFRESH).filter(|t| !t.is_empty())
    }

    /// Replace both credentials. Refresh rotation is mandatory, so the pair
    /// is always written together.
    pub fn set_pair(&self, access: &str, refresh: &str) {
        self.write(KEY_ACCESS, access);
        self.write(KEY_REFRESH, refresh);
        let _ = self.events.send(SessionEvent {
            is_authenticated: self.is_authenticated(),
        });
    }

    /// Clear both credentials and the cached session together, never
    /// partially. `suppress_notify` lets internal recovery paths clear state
    /// without retriggering listeners that would re-enter the same flow.
    pub fn clear(&self, suppress_notify: bool) {
        self.erase(KEY_ACCESS);
        self.erase(KEY_REFRESH);
        self.erase(KEY_SESSION);
        if !suppress_notify {
            let _ = self.events.send(SessionEvent {
                is_authenticated: false,
            });
        }
    }

    /// Whether a credential's embedded expiry claim has passed. A token the
    /// inspector cannot decode is expired.
    pub fn is_expired(&self, token: &str) -> bool {
        match self.inspector.decode_expiry(token) {
            Ok(exp) => exp <= Utc::now().timestamp(),
            Err(_) => true,
        }
    }

    /// Defined only in terms of the refresh credential: present and not
    /// expired. The access credential's state is irrelevant here.
    pub fn is_authenticated(&self) -> bool {
        self.refresh_credential()
            .map(|t| !self.is_expired(&t))
            .unwrap_or(false)
    }

    /// Persist the route to resume after the login round-trip.
    pub fn set_redirect_target(&self, route: &str) {
        self.write(KEY_REDIRECT, route);
    }

    /// Consume the persisted resume route, if any.
    pub fn take_redirect_target(&self) -> Option<String> {
        let target = self.read(KEY_REDIRECT).filter(|r| !r.is_empty());
        if target.is_some() {
            self.erase(KEY_REDIRECT);
        }
        target
    }

    /// Persist the derived session blob alongside the credentials.
    pub fn save_session(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(json) => self.write(KEY_SESSION, &json),
            Err(e) => warn!(error = %e, "failed to serialize session for storage"),
        }
    }

    /// Load the persisted session blob, if present and readable.
    pub fn load_session(&self) -> Option<Session> {
        let json = self.read(KEY_SESSION)?;
        match serde_json::from_str(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "discarding unreadable persisted session");
                None
            }
        }
    }
}
