//! Durable key/value storage for credentials and session state.
//!
//! The token store only ever reads and writes small string entries, so the
//! backend contract stays deliberately narrow. Three implementations are
//! provided:
//! - `MemoryStorage`: process-local, for tests and ephemeral sessions
//! - `FileStorage`: a JSON file on disk
//! - `KeyringStorage`: the OS keychain

pub mod file;
pub mod keyring;
pub mod memory;

use thiserror::Error;

pub use self::file::FileStorage;
pub use self::keyring::KeyringStorage;
pub use self::memory::MemoryStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// String key/value persistence used by the token store.
///
/// Implementations must be safe to call from concurrent tasks; operations are
/// synchronous because every backend here is a quick local read or write.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
