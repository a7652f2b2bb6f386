//! Top-level client facade.
//!
//! Owns one instance of every lifecycle component - token store, refresh
//! coordinator, recovery controller, session cache - wired together at
//! construction and shared by reference. Nothing here is a module-level
//! singleton; embedders construct one client per backend they talk to.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;
use tracing::debug;

use crate::auth::claims::{CredentialInspector, JwtInspector};
use crate::auth::recovery::{Navigator, RecoveryController};
use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::{SessionEvent, TokenStore};
use crate::config::Config;
use crate::models::{Session, TokenPair};
use crate::session::{SessionCache, SessionPaths};
use crate::storage::{FileStorage, StorageBackend};

use super::dispatcher::Dispatcher;
use super::transport::{ApiRequest, HttpTransport, Transport};
use super::ApiError;

pub struct AdminClient {
    config: Config,
    store: Arc<TokenStore>,
    dispatcher: Arc<Dispatcher>,
    session: Arc<SessionCache>,
}

impl AdminClient {
    /// Build a client with the production transport and the durable file
    /// store under the configured storage directory.
    pub fn new(config: Config, navigator: Arc<dyn Navigator>) -> Result<Self> {
        let transport = Arc::new(
            HttpTransport::with_timeout(
                &config.base_url,
                Duration::from_secs(config.request_timeout_secs),
            )
            .context("Failed to build HTTP transport")?,
        );
        let backend = FileStorage::new(config.storage_dir()?)
            .context("Failed to open credential storage")?;
        Ok(Self::with_parts(
            config,
            transport,
            Box::new(backend),
            Box::new(JwtInspector::new()),
            navigator,
        ))
    }

    /// Build a client from injected parts. Used by tests and by embedders
    /// that bring their own transport or storage.
    pub fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        backend: Box<dyn StorageBackend>,
        inspector: Box<dyn CredentialInspector>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let store = Arc::new(TokenStore::new(backend, inspector));
        let recovery = Arc::new(RecoveryController::new(
            store.clone(),
            navigator,
            config.privileged_prefixes.clone(),
            Duration::from_millis(config.settle_delay_ms),
        ));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            recovery,
            transport.clone(),
            &config.refresh_path,
        ));
        let dispatcher = Arc::new(Dispatcher::new(transport, store.clone(), coordinator));
        let session = Arc::new(SessionCache::new(
            dispatcher.clone(),
            store.clone(),
            SessionPaths {
                profile: config.profile_path.clone(),
                roles: config.roles_path.clone(),
                institution: config.institution_path.clone(),
            },
        ));

        Self {
            config,
            store,
            dispatcher,
            session,
        }
    }

    /// Authenticate and establish a session: the issued credential pair is
    /// stored and the session view is rebuilt from the same authority.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let pair: TokenPair = self
            .dispatcher
            .execute(ApiRequest::post(
                &self.config.login_path,
                serde_json::json!({ "username": username, "password": password }),
            ))
            .await?;

        self.store.set_pair(&pair.access_token, &pair.refresh_token);
        self.session.refresh().await
    }

    /// End the session. The backend call is best-effort; local state is
    /// cleared (with notification) regardless.
    pub async fn logout(&self) {
        if let Err(e) = self
            .dispatcher
            .execute_empty(ApiRequest::post(
                &self.config.logout_path,
                serde_json::json!({}),
            ))
            .await
        {
            debug!(error = %e, "logout call failed, clearing local session anyway");
        }
        self.session.invalidate();
        self.store.clear(false);
    }

    /// Execute an arbitrary API call through the dispatcher.
    pub async fn execute<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        self.dispatcher.execute(req).await
    }

    /// Execute a call whose envelope carries no data payload.
    pub async fn execute_empty(&self, req: ApiRequest) -> Result<(), ApiError> {
        self.dispatcher.execute_empty(req).await
    }

    /// Fetch a binary stream.
    pub async fn download(&self, path: &str) -> Result<Bytes, ApiError> {
        self.dispatcher.download(path).await
    }

    /// Route persisted by failure recovery, consumed after the login
    /// round-trip to land the operator back where the session died.
    pub fn take_resume_path(&self) -> Option<String> {
        self.store.take_redirect_target()
    }

    /// Subscribe to session-changed notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn token_store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn session(&self) -> &Arc<SessionCache> {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
