//! Vigora API client with transparent token refresh
//!
//! Every request carries the stored access token. A 401 triggers at most one
//! refresh per request; concurrent 401s share a single in-flight refresh
//! through the [`RefreshCoordinator`], and the requests queued behind it are
//! replayed with the new token (or fail with their own error).

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use super::api::{AuthApi, QrApi};
use super::models::{
    AuthResponse, LoginRequest, MessageResponse, QrCode, QrCodeRequest, QrPollBody,
    QrPollResponse, QrScanRequest, QrToken, RefreshRequest, RefreshResponse,
};
use super::refresh::{RefreshCoordinator, Role};
use super::transport::{ApiRequest, ApiResponse, Transport};
use crate::error::{ApiError, Result};
use crate::session::{SessionStore, TokenPair};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const QR_START_PATH: &str = "/auth/qr/start";
pub const QR_POLL_PATH: &str = "/auth/qr/poll";
pub const QR_APPROVE_PATH: &str = "/auth/qr/approve";
pub const QR_REJECT_PATH: &str = "/auth/qr/reject";
pub const QR_GENERATE_PATH: &str = "/auth/qr/generate";
pub const QR_SCAN_LOGIN_PATH: &str = "/auth/qr/scan-login";

/// Endpoints whose 401 means "these credentials are wrong", not "the access
/// token expired". They are never refreshed or replayed.
const CREDENTIAL_PATHS: [&str; 3] = [LOGIN_PATH, REFRESH_PATH, QR_SCAN_LOGIN_PATH];

/// Vigora API client
pub struct VigoraClient<T: Transport, S: SessionStore> {
    transport: Arc<T>,
    session: Arc<S>,
    coordinator: RefreshCoordinator,
}

impl<T: Transport, S: SessionStore> VigoraClient<T, S> {
    /// Create a client over a transport and a session store
    pub fn new(transport: Arc<T>, session: Arc<S>) -> Self {
        Self {
            transport,
            session,
            coordinator: RefreshCoordinator::new(),
        }
    }

    /// The session store this client reads and writes
    pub fn session(&self) -> &Arc<S> {
        &self.session
    }

    /// Number of requests parked behind an in-flight refresh
    #[cfg(test)]
    pub fn pending_refresh_waiters(&self) -> usize {
        self.coordinator.pending_waiters()
    }

    /// Send a request, recovering from an expired access token.
    ///
    /// Non-401 responses are returned untouched, whatever their status.
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let sent_with = self.session.tokens().map(|t| t.access_token);
        request.bearer = sent_with.clone();

        let response = self.transport.send(&request).await?;
        if response.status != StatusCode::UNAUTHORIZED
            || CREDENTIAL_PATHS.contains(&request.path.as_str())
        {
            return Ok(response);
        }

        self.recover_unauthorized(request, sent_with, response.into_error())
            .await
    }

    /// Send a request and decode the successful response
    pub async fn request<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R> {
        self.execute(request).await?.parse()
    }

    async fn recover_unauthorized(
        &self,
        request: ApiRequest,
        sent_with: Option<String>,
        original: ApiError,
    ) -> Result<ApiResponse> {
        if request.retried {
            return self.give_up(&request, original);
        }

        let Some(tokens) = self.session.tokens().filter(|t| !t.refresh_token.is_empty()) else {
            debug!("401 on {} with no refresh token available", request.path);
            return self.give_up(&request, original);
        };

        // Another request already rotated the token while this one was in flight
        if let Some(sent) = &sent_with
            && *sent != tokens.access_token
        {
            debug!("Access token rotated while {} was in flight", request.path);
            return self.replay(request, tokens.access_token).await;
        }

        match self.coordinator.acquire() {
            Role::Waiter(outcome) => match outcome.await {
                Ok(Some(access_token)) => self.replay(request, access_token).await,
                _ => Err(original.into()),
            },
            Role::Refresher(guard) => {
                // A refresh may have settled between the check above and acquire
                let Some(current) = self.session.tokens() else {
                    guard.settle(None);
                    return Err(original.into());
                };
                if sent_with.as_deref() != Some(current.access_token.as_str()) {
                    debug!("Token refreshed before {} could start a refresh", request.path);
                    guard.settle(Some(current.access_token.clone()));
                    return self.replay(request, current.access_token).await;
                }

                match self.refresh(&current.refresh_token).await {
                    Ok(fresh) => {
                        guard.settle(Some(fresh.access_token.clone()));
                        self.replay(request, fresh.access_token).await
                    }
                    Err(err) => {
                        warn!("Token refresh failed: {}", err);
                        // Clear before releasing waiters so nobody reads the dead token
                        self.clear_session();
                        guard.settle(None);
                        Err(err)
                    }
                }
            }
        }
    }

    /// Replay a request once with a fresh access token
    async fn replay(&self, mut request: ApiRequest, access_token: String) -> Result<ApiResponse> {
        request.retried = true;
        request.bearer = Some(access_token);

        let response = self.transport.send(&request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            let original = response.into_error();
            return self.give_up(&request, original);
        }
        Ok(response)
    }

    /// Terminal 401: drop the session and surface the error
    fn give_up(&self, request: &ApiRequest, original: ApiError) -> Result<ApiResponse> {
        warn!("{} is still unauthorized, signing out", request.path);
        self.clear_session();
        Err(original.into())
    }

    /// Drop the session. A failure to delete its backing storage is logged so
    /// the auth error stays the one reported.
    fn clear_session(&self) {
        if let Err(err) = self.session.clear() {
            warn!("Failed to remove stored session: {}", err);
        }
    }

    fn require_session(&self) -> Result<()> {
        match self.session.tokens() {
            Some(_) => Ok(()),
            None => Err(ApiError::NotAuthenticated.into()),
        }
    }

    fn store_auth(&self, auth: &AuthResponse) -> Result<()> {
        self.session
            .set(auth.tokens.clone(), Some(auth.user.clone()))
    }
}

#[async_trait]
impl<T: Transport, S: SessionStore> AuthApi for VigoraClient<T, S> {
    async fn login(&self, email_or_username: &str, password: &str) -> Result<AuthResponse> {
        let request = ApiRequest::post(LOGIN_PATH).json(&LoginRequest {
            email_or_username: email_or_username.to_string(),
            password: password.to_string(),
        })?;

        let auth: AuthResponse = self.request(request).await?;
        self.store_auth(&auth)?;
        Ok(auth)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let request = ApiRequest::post(REFRESH_PATH).json(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?;

        // Straight to the transport: the refresh call must never recurse into recovery
        let body: RefreshResponse = self.transport.send(&request).await?.parse()?;
        self.session.set(body.tokens.clone(), body.user)?;
        Ok(body.tokens)
    }
}

#[async_trait]
impl<T: Transport, S: SessionStore> QrApi for VigoraClient<T, S> {
    async fn qr_start(&self) -> Result<QrCode> {
        self.request(ApiRequest::post(QR_START_PATH)).await
    }

    async fn qr_poll(&self, code: &str) -> Result<QrPollResponse> {
        let body: QrPollBody = self
            .request(ApiRequest::get(QR_POLL_PATH).query("code", code))
            .await?;

        let response = QrPollResponse::try_from(body)?;
        if let QrPollResponse::Approved(auth) = &response {
            self.store_auth(auth)?;
        }
        Ok(response)
    }

    async fn qr_approve(&self, code: &str) -> Result<String> {
        self.require_session()?;
        let request = ApiRequest::post(QR_APPROVE_PATH).json(&QrCodeRequest {
            code: code.to_string(),
        })?;

        let ack: MessageResponse = self.request(request).await?;
        Ok(ack.message)
    }

    async fn qr_reject(&self, code: &str) -> Result<String> {
        let request = ApiRequest::post(QR_REJECT_PATH).json(&QrCodeRequest {
            code: code.to_string(),
        })?;

        let ack: MessageResponse = self.request(request).await?;
        Ok(ack.message)
    }

    async fn qr_generate(&self) -> Result<QrToken> {
        self.require_session()?;
        self.request(ApiRequest::post(QR_GENERATE_PATH)).await
    }

    async fn qr_scan_login(&self, token: &str) -> Result<AuthResponse> {
        let request = ApiRequest::post(QR_SCAN_LOGIN_PATH).json(&QrScanRequest {
            token: token.to_string(),
        })?;

        let auth: AuthResponse = self.request(request).await?;
        self.store_auth(&auth)?;
        Ok(auth)
    }
}
