//! Request dispatcher: attaches the current access credential to every
//! outbound call and drives the rejected-once retry cycle.
//!
//! Validity is enforced reactively. The dispatcher never blocks waiting for
//! a credential to become valid; an authentication rejection on the wire is
//! what triggers the refresh episode, and each request goes through at most
//! one refresh-and-retry cycle before its rejection becomes terminal.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::auth::refresh::RefreshCoordinator;
use crate::auth::store::TokenStore;

use super::transport::{ApiRequest, RawResponse, Transport};
use super::ApiError;

const STATUS_UNAUTHORIZED: u16 = 401;

/// Standard response envelope for every JSON endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator,
        }
    }

    async fn send_with_auth(&self, req: &ApiRequest) -> Result<RawResponse, ApiError> {
        let bearer = self.store.access();
        self.transport.send(req, bearer.as_deref()).await
    }

    /// Send `req`, riding through one refresh episode if the backend rejects
    /// the credential. The returned response is never a 401: a second
    /// rejection after retry surfaces as `ApiError::Unauthorized`.
    async fn send_with_recovery(&self, req: &ApiRequest) -> Result<RawResponse, ApiError> {
        let raw = self.send_with_auth(req).await?;
        if raw.status != STATUS_UNAUTHORIZED {
            return Ok(raw);
        }

        debug!(path = %req.path, "request rejected for authentication, entering refresh");
        self.coordinator.recover().await?;

        // Resubmission: same captured request, fresh credential attached at
        // send time. A second rejection is terminal regardless of cause.
        let raw = self.send_with_auth(req).await?;
        if raw.status == STATUS_UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        Ok(raw)
    }

    fn parse_envelope<T: DeserializeOwned>(raw: &RawResponse) -> Result<Envelope<T>, ApiError> {
        serde_json::from_slice(&raw.body)
            .map_err(|e| ApiError::InvalidResponse(format!("envelope parse failed: {e}")))
    }

    fn check_status(raw: &RawResponse) -> Result<(), ApiError> {
        if (200..300).contains(&raw.status) {
            Ok(())
        } else {
            Err(ApiError::from_status(
                raw.status,
                &String::from_utf8_lossy(&raw.body),
            ))
        }
    }

    /// Execute a request and return the envelope's data payload.
    pub async fn execute<T: DeserializeOwned>(&self, req: ApiRequest) -> Result<T, ApiError> {
        let raw = self.send_with_recovery(&req).await?;
        Self::check_status(&raw)?;

        let envelope: Envelope<T> = Self::parse_envelope(&raw)?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.message.unwrap_or_default()));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("envelope carried no data".to_string()))
    }

    /// Execute a request where the envelope carries no data payload.
    pub async fn execute_empty(&self, req: ApiRequest) -> Result<(), ApiError> {
        let raw = self.send_with_recovery(&req).await?;
        Self::check_status(&raw)?;

        let envelope: Envelope<serde_json::Value> = Self::parse_envelope(&raw)?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.message.unwrap_or_default()));
        }
        Ok(())
    }

    /// Fetch a binary stream (dataset file downloads). Same credential and
    /// retry semantics as JSON calls, without envelope parsing.
    pub async fn download(&self, path: &str) -> Result<Bytes, ApiError> {
        let req = ApiRequest::get(path);
        let raw = self.send_with_recovery(&req).await?;
        Self::check_status(&raw)?;
        Ok(raw.body)
    }
}
