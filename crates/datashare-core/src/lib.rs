//! datashare-core - client library for the Datashare admin console.
//!
//! The Datashare platform is a research-dataset sharing service; its admin
//! console is UI composition over thin API wrappers. This crate is the part
//! with real coordination requirements: the session token lifecycle. It
//! attaches credentials to outbound requests, collapses concurrent
//! authentication rejections into a single refresh call, replays or fails
//! queued requests consistently, and picks the one client-wide recovery
//! action when credentials cannot be restored.
//!
//! Visual components, form validation, and the REST endpoints themselves are
//! external collaborators, reached through the `Transport` and `Navigator`
//! traits.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testutil;

pub use api::{AdminClient, ApiError, ApiRequest, Dispatcher, Method};
pub use auth::{CredentialInspector, JwtInspector, Navigator, SessionEvent, TokenStore};
pub use config::Config;
pub use models::{Institution, Role, Session, TokenPair, UserProfile};
pub use session::SessionCache;
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, StorageBackend};
