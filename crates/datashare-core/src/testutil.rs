//! Shared test support: scripted transport, recording navigator, and
//! credential builders.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;

use crate::api::transport::{ApiRequest, RawResponse, Transport};
use crate::api::{AdminClient, ApiError, Dispatcher};
use crate::auth::claims::JwtInspector;
use crate::auth::recovery::Navigator;
use crate::auth::store::TokenStore;
use crate::config::Config;
use crate::models::{Session, UserProfile};
use crate::session::SessionCache;
use crate::storage::MemoryStorage;

/// Install a log subscriber for tests run with RUST_LOG set. Safe to call
/// from every test; only the first install wins.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a JWT-shaped token whose claims carry the given `exp`.
pub fn make_jwt(exp: i64) -> String {
    let claims = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(format!(r#"{{"exp":{exp}}}"#));
    format!("eyJhbGciOiJIUzI1NiJ9.{claims}.sig")
}

pub fn valid_jwt() -> String {
    make_jwt(Utc::now().timestamp() + 3600)
}

pub fn expired_jwt() -> String {
    make_jwt(Utc::now().timestamp() - 10)
}

pub fn sample_session() -> Session {
    Session {
        profile: UserProfile {
            id: 7,
            username: "curator".into(),
            display_name: None,
            email: None,
            institution_id: None,
        },
        roles: Vec::new(),
        institution: None,
    }
}

/// One observed send, as the backend saw it.
pub struct SentRequest {
    pub path: String,
    pub bearer: Option<String>,
    pub is_refresh: bool,
}

struct ScriptState {
    /// Access token the backend currently accepts.
    valid_access: String,
    /// Tokens that were valid once and have since been rotated away.
    retired: HashSet<String>,
    counter: u32,
    refresh_failure_status: Option<u16>,
    reject_all: bool,
    anonymous_paths: HashSet<String>,
    envelope_failures: HashMap<String, String>,
    http_errors: HashMap<String, u16>,
    binaries: HashMap<String, Vec<u8>>,
}

impl ScriptState {
    /// Issue a rotated pair: the old access token is retired, the new one
    /// becomes the only accepted credential.
    fn rotate(&mut self) -> (String, String) {
        self.counter += 1;
        let access = format!("access-{}", self.counter);
        if !self.valid_access.is_empty() {
            self.retired.insert(std::mem::take(&mut self.valid_access));
        }
        self.valid_access = access.clone();
        (access, valid_jwt())
    }
}

/// Scripted backend standing in for the platform API.
pub struct ScriptedTransport {
    refresh_path: String,
    login_path: String,
    refresh_delay: Duration,
    refresh_calls: AtomicUsize,
    retired_uses: AtomicUsize,
    state: Mutex<ScriptState>,
    log: Mutex<Vec<SentRequest>>,
}

impl ScriptedTransport {
    pub fn new(refresh_path: &str, login_path: &str, refresh_delay: Duration) -> Self {
        Self {
            refresh_path: refresh_path.to_string(),
            login_path: login_path.to_string(),
            refresh_delay,
            refresh_calls: AtomicUsize::new(0),
            retired_uses: AtomicUsize::new(0),
            state: Mutex::new(ScriptState {
                valid_access: String::new(),
                retired: HashSet::new(),
                counter: 0,
                refresh_failure_status: None,
                reject_all: false,
                anonymous_paths: HashSet::new(),
                envelope_failures: HashMap::new(),
                http_errors: HashMap::new(),
                binaries: HashMap::new(),
            }),
            log: Mutex::new(Vec::new()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap()
    }

    /// Mint an access token the backend will accept, without going through
    /// the login or refresh endpoints.
    pub fn issue_valid_access(&self) -> String {
        self.state().rotate().0
    }

    /// Access token the backend currently accepts.
    pub fn current_access(&self) -> String {
        self.state().valid_access.clone()
    }

    /// Revoke the currently-accepted access token server-side. The client
    /// only learns about it from the next rejection.
    pub fn invalidate_access(&self) {
        let mut state = self.state();
        state.counter += 1;
        state.valid_access = format!("revoked-{}", state.counter);
    }

    pub fn fail_refresh_with_status(&self, status: u16) {
        self.state().refresh_failure_status = Some(status);
    }

    /// Reject every bearer-authenticated request, valid credential or not.
    pub fn reject_all_bearers(&self) {
        self.state().reject_all = true;
    }

    pub fn allow_anonymous(&self, path: &str) {
        self.state().anonymous_paths.insert(path.to_string());
    }

    pub fn script_envelope_failure(&self, path: &str, message: &str) {
        self.state()
            .envelope_failures
            .insert(path.to_string(), message.to_string());
    }

    pub fn script_http_error(&self, path: &str, status: u16) {
        self.state().http_errors.insert(path.to_string(), status);
    }

    pub fn script_binary(&self, path: &str, bytes: Vec<u8>) {
        self.state().binaries.insert(path.to_string(), bytes);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of sends that carried an access token already rotated away.
    pub fn retired_bearer_uses(&self) -> usize {
        self.retired_uses.load(Ordering::SeqCst)
    }

    pub fn request_log(&self) -> Vec<SentRequest> {
        let log = self.log.lock().unwrap();
        log.iter()
            .map(|r| SentRequest {
                path: r.path.clone(),
                bearer: r.bearer.clone(),
                is_refresh: r.is_refresh,
            })
            .collect()
    }

    fn json_response(status: u16, value: serde_json::Value) -> RawResponse {
        RawResponse {
            status,
            body: Bytes::from(value.to_string()),
        }
    }

    fn ok_envelope(data: serde_json::Value) -> RawResponse {
        Self::json_response(
            200,
            serde_json::json!({
                "success": true,
                "message": null,
                "data": data,
                "timestamp": Utc::now().timestamp(),
            }),
        )
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        req: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<RawResponse, ApiError> {
        let is_refresh = req.path == self.refresh_path;
        self.log.lock().unwrap().push(SentRequest {
            path: req.path.clone(),
            bearer: bearer.map(str::to_string),
            is_refresh,
        });

        if is_refresh {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if !self.refresh_delay.is_zero() {
                tokio::time::sleep(self.refresh_delay).await;
            }
            let mut state = self.state();
            if let Some(status) = state.refresh_failure_status {
                return Ok(Self::json_response(
                    status,
                    serde_json::json!({"success": false, "message": "refresh rejected"}),
                ));
            }
            let (access, refresh) = state.rotate();
            return Ok(Self::ok_envelope(
                serde_json::json!({"accessToken": access, "refreshToken": refresh}),
            ));
        }

        let mut state = self.state();

        if req.path == self.login_path {
            let (access, refresh) = state.rotate();
            return Ok(Self::ok_envelope(
                serde_json::json!({"accessToken": access, "refreshToken": refresh}),
            ));
        }

        if let Some(status) = state.http_errors.get(&req.path) {
            return Ok(Self::json_response(
                *status,
                serde_json::json!({"success": false, "message": "scripted error"}),
            ));
        }

        if let Some(token) = bearer {
            if state.retired.contains(token) {
                self.retired_uses.fetch_add(1, Ordering::SeqCst);
            }
        }

        let authorized = state.anonymous_paths.contains(&req.path)
            || (!state.reject_all && bearer == Some(state.valid_access.as_str()));
        if !authorized {
            return Ok(Self::json_response(
                401,
                serde_json::json!({"success": false, "message": "credential rejected"}),
            ));
        }

        if let Some(message) = state.envelope_failures.get(&req.path) {
            return Ok(Self::json_response(
                200,
                serde_json::json!({"success": false, "message": message}),
            ));
        }

        if let Some(bytes) = state.binaries.get(&req.path) {
            return Ok(RawResponse {
                status: 200,
                body: Bytes::from(bytes.clone()),
            });
        }

        let data = match req.path.as_str() {
            "/users/me" => serde_json::json!({
                "id": 7,
                "username": "curator",
                "displayName": "Curator",
                "institutionId": 11,
            }),
            "/users/me/roles" => serde_json::json!([
                {"id": 1, "name": "Dataset Reviewer", "code": "reviewer"},
                {"id": 2, "name": "Institution Admin", "code": "inst-admin"},
            ]),
            "/institutions/11" => serde_json::json!({
                "id": 11,
                "name": "Institute of Open Data",
                "code": "IOD",
            }),
            _ => serde_json::Value::Null,
        };
        Ok(Self::ok_envelope(data))
    }
}

/// Navigator that records recovery actions instead of performing them.
pub struct RecordingNavigator {
    route: Mutex<String>,
    logins: Mutex<Vec<Option<String>>>,
    reloads: AtomicUsize,
}

impl RecordingNavigator {
    pub fn new(route: &str) -> Self {
        Self {
            route: Mutex::new(route.to_string()),
            logins: Mutex::new(Vec::new()),
            reloads: AtomicUsize::new(0),
        }
    }

    pub fn logins(&self) -> Vec<Option<String>> {
        self.logins.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }

    /// Total user-visible recovery actions: redirects plus reloads.
    pub fn recovery_actions(&self) -> usize {
        self.logins().len() + self.reloads()
    }
}

impl Navigator for RecordingNavigator {
    fn current_route(&self) -> String {
        self.route.lock().unwrap().clone()
    }

    fn navigate_to_login(&self, resume: Option<&str>) {
        self.logins.lock().unwrap().push(resume.map(str::to_string));
    }

    fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fully wired client over the scripted transport and in-memory storage.
pub struct Harness {
    pub client: AdminClient,
    pub dispatcher: Arc<Dispatcher>,
    pub session: Arc<SessionCache>,
    pub store: Arc<TokenStore>,
    pub transport: Arc<ScriptedTransport>,
    pub navigator: Arc<RecordingNavigator>,
}

pub fn harness() -> Harness {
    harness_with_refresh_delay(Duration::ZERO)
}

pub fn harness_with_refresh_delay(refresh_delay: Duration) -> Harness {
    init_tracing();
    let config = Config {
        settle_delay_ms: 5,
        ..Config::default()
    };
    let transport = Arc::new(ScriptedTransport::new(
        &config.refresh_path,
        &config.login_path,
        refresh_delay,
    ));
    let navigator = Arc::new(RecordingNavigator::new("/datasets"));
    let client = AdminClient::with_parts(
        config,
        transport.clone(),
        Box::new(MemoryStorage::new()),
        Box::new(JwtInspector::new()),
        navigator.clone(),
    );

    Harness {
        dispatcher: client.dispatcher().clone(),
        session: client.session().clone(),
        store: client.token_store().clone(),
        transport,
        navigator,
        client,
    }
}
