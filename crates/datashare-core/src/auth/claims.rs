//! Credential expiry inspection.
//!
//! Credentials are opaque strings with an embedded expiry claim. The default
//! inspector understands JWT-style tokens: the middle segment is base64url
//! JSON carrying `exp` as seconds since the epoch. Anything the inspector
//! cannot decode is treated as already expired - the lifecycle logic fails
//! closed rather than trusting an unreadable token.

use base64::Engine;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("credential is not in three-segment form")]
    Malformed,

    #[error("claims segment could not be decoded")]
    Undecodable,

    #[error("claims carry no exp field")]
    MissingExpiry,
}

/// Decodes the expiry claim out of an opaque credential.
///
/// Pluggable so the same lifecycle coordination works with any credential
/// encoding the backend might move to.
pub trait CredentialInspector: Send + Sync {
    /// Expiry instant as seconds since the epoch.
    fn decode_expiry(&self, token: &str) -> Result<i64, ClaimError>;
}

/// Default inspector for JWT-shaped credentials.
#[derive(Default)]
pub struct JwtInspector;

impl JwtInspector {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialInspector for JwtInspector {
    fn decode_expiry(&self, token: &str) -> Result<i64, ClaimError> {
        let mut segments = token.split('.');
        let claims_b64 = match (segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(claims), Some(_)) if segments.next().is_none() => claims,
            _ => return Err(ClaimError::Malformed),
        };

        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| ClaimError::Undecodable)?;
        let claims: Value =
            serde_json::from_slice(&decoded).map_err(|_| ClaimError::Undecodable)?;

        claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or(ClaimError::MissingExpiry)
    }
}
