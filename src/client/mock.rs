//! In-memory Vigora API for testing
//!
//! Implements [`Transport`] by answering every auth and QR endpoint from
//! in-memory state, with the same single-use and expiry rules as the real
//! backend. Tests plug it under a [`VigoraClient`](super::VigoraClient) to
//! exercise the refresh interceptor and the QR flows without a network.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};

use super::models::QrStatus;
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::error::{ApiError, Result};
use crate::session::{TokenPair, UserProfile};

/// Protected endpoint served by the mock for interceptor tests
pub const ME_PATH: &str = "/users/me";

/// A request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
}

struct MockUser {
    password: String,
    profile: UserProfile,
}

struct QrCodeEntry {
    status: QrStatus,
    expires_at: DateTime<Utc>,
    approved_by: Option<usize>,
    consumed: bool,
}

struct QrTokenEntry {
    user: usize,
    expires_at: DateTime<Utc>,
    consumed: bool,
}

struct ServerState {
    users: Vec<MockUser>,
    access_tokens: HashMap<String, usize>,
    refresh_tokens: HashMap<String, usize>,
    qr_codes: HashMap<String, QrCodeEntry>,
    qr_tokens: HashMap<String, QrTokenEntry>,
    next_id: usize,
    clock_offset: chrono::Duration,
    qr_code_ttl: chrono::Duration,
    qr_token_ttl: chrono::Duration,
    refresh_failure: Option<StatusCode>,
    network_failures: HashMap<String, usize>,
    denied_paths: Vec<String>,
    calls: Vec<RecordedCall>,
}

/// Mock Vigora backend.
///
/// # Example
/// ```ignore
/// let server = MockVigoraServer::new().with_user("ana", "secret").await;
/// let client = VigoraClient::new(Arc::new(server), Arc::new(MemorySessionStore::new()));
/// client.login("ana", "secret").await?;
/// ```
pub struct MockVigoraServer {
    state: Arc<Mutex<ServerState>>,
    refresh_gate: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
}

impl Default for MockVigoraServer {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                users: Vec::new(),
                access_tokens: HashMap::new(),
                refresh_tokens: HashMap::new(),
                qr_codes: HashMap::new(),
                qr_tokens: HashMap::new(),
                next_id: 0,
                clock_offset: chrono::Duration::zero(),
                qr_code_ttl: chrono::Duration::minutes(5),
                qr_token_ttl: chrono::Duration::minutes(2),
                refresh_failure: None,
                network_failures: HashMap::new(),
                denied_paths: Vec::new(),
                calls: Vec::new(),
            })),
            refresh_gate: Arc::new(Mutex::new(None)),
        }
    }
}

impl MockVigoraServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user that can log in with `username` (or `username@vigora.test`)
    pub async fn with_user(self, username: &str, password: &str) -> Self {
        let mut state = self.state.lock().await;
        let id = state.users.len();
        state.users.push(MockUser {
            password: password.to_string(),
            profile: UserProfile {
                id: Some(format!("user-{}", id)),
                username: Some(username.to_string()),
                email: Some(format!("{}@vigora.test", username)),
                role: Some("client".to_string()),
                ..Default::default()
            },
        });
        drop(state);
        self
    }

    /// Issue a token pair for a registered user without going through login
    pub async fn sign_in(&self, username: &str) -> TokenPair {
        let mut state = self.state.lock().await;
        let user = state
            .find_user(username)
            .unwrap_or_else(|| panic!("unknown mock user {}", username));
        state.issue_tokens(user)
    }

    /// Invalidate every access token so the next authenticated call gets a 401
    pub async fn expire_access_tokens(&self) {
        self.state.lock().await.access_tokens.clear();
    }

    /// Make every refresh call answer with `status`
    pub async fn fail_refresh(&self, status: StatusCode) {
        self.state.lock().await.refresh_failure = Some(status);
    }

    /// Hold the next refresh call until the returned sender fires (or is dropped)
    pub async fn hold_refresh(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.refresh_gate.lock().await = Some(rx);
        tx
    }

    /// Fail the next `times` calls to `path` at the network level
    pub async fn fail_next(&self, path: &str, times: usize) {
        self.state
            .lock()
            .await
            .network_failures
            .insert(path.to_string(), times);
    }

    /// Answer every call to `path` with 401, whatever token it carries
    pub async fn deny_path(&self, path: &str) {
        self.state.lock().await.denied_paths.push(path.to_string());
    }

    /// Move the server clock forward (QR expiry)
    pub async fn advance_clock(&self, by: chrono::Duration) {
        self.state.lock().await.clock_offset += by;
    }

    /// Approve a code on behalf of `username`, as a second device would
    pub async fn approve_as(&self, username: &str, code: &str) -> ApiResponse {
        let token = self.sign_in(username).await;
        let mut request = ApiRequest::post("/auth/qr/approve")
            .json(&json!({ "code": code }))
            .expect("static body serializes");
        request.bearer = Some(token.access_token);
        self.state.lock().await.handle(&request)
    }

    /// Number of calls made to `path`
    pub async fn calls(&self, path: &str) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    /// Every call received, in arrival order
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.state.lock().await.calls.clone()
    }

    /// Current status of a QR code
    pub async fn code_status(&self, code: &str) -> Option<QrStatus> {
        self.state.lock().await.qr_codes.get(code).map(|e| e.status)
    }
}

#[async_trait]
impl Transport for MockVigoraServer {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        {
            let mut state = self.state.lock().await;
            state.calls.push(RecordedCall {
                method: request.method.clone(),
                path: request.path.clone(),
                bearer: request.bearer.clone(),
            });

            if let Some(remaining) = state.network_failures.get_mut(&request.path)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(ApiError::Network("simulated connection reset".to_string()).into());
            }
        }

        if request.path == "/auth/refresh" {
            let gate = self.refresh_gate.lock().await.take();
            if let Some(gate) = gate {
                let _ = gate.await;
            }
        }

        Ok(self.state.lock().await.handle(request))
    }
}

fn respond(status: StatusCode, body: Value) -> ApiResponse {
    ApiResponse::new(status, body.to_string())
}

fn message(status: StatusCode, msg: &str) -> ApiResponse {
    respond(status, json!({ "message": msg }))
}

fn body_str<'a>(request: &'a ApiRequest, field: &str) -> Option<&'a str> {
    request
        .body
        .as_ref()
        .and_then(|b| b.get(field))
        .and_then(Value::as_str)
}

impl ServerState {
    fn now(&self) -> DateTime<Utc> {
        Utc::now() + self.clock_offset
    }

    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id
    }

    fn find_user(&self, login: &str) -> Option<usize> {
        self.users.iter().position(|u| {
            u.profile.username.as_deref() == Some(login) || u.profile.email.as_deref() == Some(login)
        })
    }

    fn issue_tokens(&mut self, user: usize) -> TokenPair {
        let id = self.next_id();
        let pair = TokenPair::new(format!("access-{}", id), format!("refresh-{}", id));
        self.access_tokens.insert(pair.access_token.clone(), user);
        self.refresh_tokens.insert(pair.refresh_token.clone(), user);
        pair
    }

    fn auth_payload(&mut self, user: usize) -> Value {
        let tokens = self.issue_tokens(user);
        json!({
            "user": self.users[user].profile,
            "accessToken": tokens.access_token,
            "refreshToken": tokens.refresh_token,
        })
    }

    fn authenticate(&self, request: &ApiRequest) -> Option<usize> {
        request
            .bearer
            .as_ref()
            .and_then(|t| self.access_tokens.get(t))
            .copied()
    }

    fn handle(&mut self, request: &ApiRequest) -> ApiResponse {
        if self.denied_paths.contains(&request.path) {
            return message(StatusCode::UNAUTHORIZED, "Not allowed");
        }

        match (request.method.as_str(), request.path.as_str()) {
            ("POST", "/auth/login") => self.login(request),
            ("POST", "/auth/refresh") => self.refresh(request),
            ("POST", "/auth/qr/start") => self.qr_start(),
            ("GET", "/auth/qr/poll") => self.qr_poll(request),
            ("POST", "/auth/qr/approve") => self.qr_decide(request, QrStatus::Approved),
            ("POST", "/auth/qr/reject") => self.qr_decide(request, QrStatus::Rejected),
            ("POST", "/auth/qr/generate") => self.qr_generate(request),
            ("POST", "/auth/qr/scan-login") => self.qr_scan_login(request),
            ("GET", ME_PATH) => match self.authenticate(request) {
                Some(user) => respond(StatusCode::OK, json!(self.users[user].profile)),
                None => message(StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            },
            _ => message(StatusCode::NOT_FOUND, "Route not found"),
        }
    }

    fn login(&mut self, request: &ApiRequest) -> ApiResponse {
        let login = body_str(request, "emailOrUsername").unwrap_or_default();
        let password = body_str(request, "password").unwrap_or_default();

        match self.find_user(login) {
            Some(user) if self.users[user].password == password => {
                respond(StatusCode::OK, self.auth_payload(user))
            }
            _ => message(StatusCode::UNAUTHORIZED, "Invalid credentials"),
        }
    }

    fn refresh(&mut self, request: &ApiRequest) -> ApiResponse {
        if let Some(status) = self.refresh_failure {
            return message(status, "Invalid refresh token");
        }

        let presented = body_str(request, "refreshToken").unwrap_or_default();
        match self.refresh_tokens.remove(presented) {
            Some(user) => {
                let tokens = self.issue_tokens(user);
                respond(StatusCode::OK, json!(tokens))
            }
            None => message(StatusCode::UNAUTHORIZED, "Invalid refresh token"),
        }
    }

    fn qr_start(&mut self) -> ApiResponse {
        let id = self.next_id();
        let code = format!("qr-code-{}", id);
        let expires_at = self.now() + self.qr_code_ttl;
        self.qr_codes.insert(
            code.clone(),
            QrCodeEntry {
                status: QrStatus::Pending,
                expires_at,
                approved_by: None,
                consumed: false,
            },
        );
        respond(
            StatusCode::OK,
            json!({ "code": code, "expiresAt": expires_at.to_rfc3339() }),
        )
    }

    /// Lazily move a pending code past its expiry to `EXPIRED`
    fn refresh_code_expiry(&mut self, code: &str) {
        let now = self.now();
        if let Some(entry) = self.qr_codes.get_mut(code)
            && entry.status == QrStatus::Pending
            && entry.expires_at <= now
        {
            entry.status = QrStatus::Expired;
        }
    }

    fn qr_poll(&mut self, request: &ApiRequest) -> ApiResponse {
        let code = request
            .query
            .iter()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.clone())
            .unwrap_or_default();

        self.refresh_code_expiry(&code);
        let Some(entry) = self.qr_codes.get_mut(&code) else {
            return message(StatusCode::NOT_FOUND, "QR code not found");
        };
        if entry.consumed {
            return message(StatusCode::GONE, "QR code already used");
        }

        match (entry.status, entry.approved_by) {
            (QrStatus::Approved, Some(user)) => {
                entry.consumed = true;
                let mut payload = self.auth_payload(user);
                payload["status"] = json!(QrStatus::Approved);
                respond(StatusCode::OK, payload)
            }
            (status, _) => respond(StatusCode::OK, json!({ "status": status })),
        }
    }

    fn qr_decide(&mut self, request: &ApiRequest, decision: QrStatus) -> ApiResponse {
        let approver = self.authenticate(request);
        if decision == QrStatus::Approved && approver.is_none() {
            return message(StatusCode::UNAUTHORIZED, "Authentication required");
        }

        let Some(code) = body_str(request, "code").map(str::to_string) else {
            return message(StatusCode::BAD_REQUEST, "Code is required");
        };

        let now = self.now();
        let Some(entry) = self.qr_codes.get_mut(&code) else {
            return message(StatusCode::NOT_FOUND, "QR code not found");
        };
        if entry.status == QrStatus::Pending && entry.expires_at <= now {
            entry.status = QrStatus::Expired;
            return message(StatusCode::BAD_REQUEST, "QR code expired");
        }
        if entry.status != QrStatus::Pending {
            return message(
                StatusCode::CONFLICT,
                &format!("QR code already {}", entry.status),
            );
        }

        entry.status = decision;
        entry.approved_by = approver.filter(|_| decision == QrStatus::Approved);
        let verb = if decision == QrStatus::Approved {
            "approved"
        } else {
            "rejected"
        };
        message(StatusCode::OK, &format!("QR login {}", verb))
    }

    fn qr_generate(&mut self, request: &ApiRequest) -> ApiResponse {
        let Some(user) = self.authenticate(request) else {
            return message(StatusCode::UNAUTHORIZED, "Authentication required");
        };

        let id = self.next_id();
        let token = format!("qr-token-{}", id);
        let expires_at = self.now() + self.qr_token_ttl;
        self.qr_tokens.insert(
            token.clone(),
            QrTokenEntry {
                user,
                expires_at,
                consumed: false,
            },
        );
        respond(
            StatusCode::OK,
            json!({ "token": token, "expiresAt": expires_at.to_rfc3339() }),
        )
    }

    fn qr_scan_login(&mut self, request: &ApiRequest) -> ApiResponse {
        let Some(token) = body_str(request, "token").map(str::to_string) else {
            return message(StatusCode::BAD_REQUEST, "Token is required");
        };

        let now = self.now();
        let user = match self.qr_tokens.get_mut(&token) {
            Some(entry) if !entry.consumed && entry.expires_at > now => {
                entry.consumed = true;
                entry.user
            }
            Some(entry) if !entry.consumed => {
                return message(StatusCode::BAD_REQUEST, "QR token expired");
            }
            _ => return message(StatusCode::BAD_REQUEST, "Invalid or already used QR token"),
        };

        respond(StatusCode::OK, self.auth_payload(user))
    }
}
