//! Derived session view: profile, roles, and institution.
//!
//! This is a cache, not a source of truth. It is rebuilt after login or on
//! explicit refresh and becomes unreadable the moment the refresh credential
//! is absent or expired, which forces re-derivation after any credential
//! change.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::api::transport::ApiRequest;
use crate::api::{ApiError, Dispatcher};
use crate::auth::store::TokenStore;
use crate::models::{Institution, Role, Session, UserProfile};

/// Endpoint paths the cache derives the session from.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub profile: String,
    pub roles: String,
    /// Path template with `{id}` standing in for the institution id.
    pub institution: String,
}

pub struct SessionCache {
    dispatcher: Arc<Dispatcher>,
    store: Arc<TokenStore>,
    paths: SessionPaths,
    cached: Mutex<Option<Session>>,
}

impl SessionCache {
    pub fn new(dispatcher: Arc<Dispatcher>, store: Arc<TokenStore>, paths: SessionPaths) -> Self {
        Self {
            dispatcher,
            store,
            paths,
            cached: Mutex::new(None),
        }
    }

    fn cached_slot(&self) -> MutexGuard<'_, Option<Session>> {
        self.cached.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rebuild the session from the backend: profile, then roles, then the
    /// institution the profile references. A failed institution lookup
    /// degrades to no institution rather than failing the refresh.
    pub async fn refresh(&self) -> Result<Session, ApiError> {
        let profile: UserProfile = self
            .dispatcher
            .execute(ApiRequest::get(&self.paths.profile))
            .await?;
        let roles: Vec<Role> = self
            .dispatcher
            .execute(ApiRequest::get(&self.paths.roles))
            .await?;

        let institution = match profile.institution_id {
            Some(id) => {
                let path = self.paths.institution.replace("{id}", &id.to_string());
                match self.dispatcher.execute::<Institution>(ApiRequest::get(path)).await {
                    Ok(institution) => Some(institution),
                    Err(e) => {
                        warn!(institution_id = id, error = %e, "institution lookup failed, continuing without it");
                        None
                    }
                }
            }
            None => None,
        };

        let session = Session {
            profile,
            roles,
            institution,
        };

        *self.cached_slot() = Some(session.clone());
        self.store.save_session(&session);
        debug!(username = %session.profile.username, "session view rebuilt");
        Ok(session)
    }

    /// Read-through view. Returns `None` whenever the refresh credential is
    /// absent or expired, regardless of what was assembled earlier.
    pub fn cached(&self) -> Option<Session> {
        if !self.store.is_authenticated() {
            return None;
        }
        self.cached_slot().clone()
    }

    /// Prime the in-memory view from the persisted blob, e.g. after the
    /// client is reconstructed. Subject to the same authentication gate.
    pub fn load_persisted(&self) -> Option<Session> {
        if !self.store.is_authenticated() {
            return None;
        }
        let session = self.store.load_session()?;
        *self.cached_slot() = Some(session.clone());
        Some(session)
    }

    /// Drop the in-memory view.
    pub fn invalidate(&self) {
        *self.cached_slot() = None;
    }
}
