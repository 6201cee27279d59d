//! QR login models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthResponse;
use crate::error::ApiError;
use crate::session::{TokenPair, UserProfile};

/// Code issued by `POST /auth/qr/start` (unauthenticated-initiated flow)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Token issued by `POST /auth/qr/generate` (authenticated-initiated flow)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl QrToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Status of a QR login code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QrStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl std::fmt::Display for QrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QrStatus::Pending => "PENDING",
            QrStatus::Approved => "APPROVED",
            QrStatus::Rejected => "REJECTED",
            QrStatus::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Body of `POST /auth/qr/approve` and `POST /auth/qr/reject`
#[derive(Debug, Clone, Serialize)]
pub struct QrCodeRequest {
    pub code: String,
}

/// Body of `POST /auth/qr/scan-login`
#[derive(Debug, Clone, Serialize)]
pub struct QrScanRequest {
    pub token: String,
}

/// Raw `GET /auth/qr/poll` body as sent by the server
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPollBody {
    pub status: QrStatus,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum QrPollResponse {
    Pending,
    Approved(AuthResponse),
    Rejected,
    Expired,
}

impl QrPollResponse {
    pub fn status(&self) -> QrStatus {
        match self {
            QrPollResponse::Pending => QrStatus::Pending,
            QrPollResponse::Approved(_) => QrStatus::Approved,
            QrPollResponse::Rejected => QrStatus::Rejected,
            QrPollResponse::Expired => QrStatus::Expired,
        }
    }
}

impl TryFrom<QrPollBody> for QrPollResponse {
    type Error = ApiError;

    /// An `APPROVED` status is only accepted together with the full auth
    /// payload; a partial payload is never turned into a session.
    fn try_from(body: QrPollBody) -> Result<Self, Self::Error> {
        match body.status {
            QrStatus::Pending => Ok(QrPollResponse::Pending),
            QrStatus::Rejected => Ok(QrPollResponse::Rejected),
            QrStatus::Expired => Ok(QrPollResponse::Expired),
            QrStatus::Approved => match (body.user, body.access_token, body.refresh_token) {
                (Some(user), Some(access), Some(refresh)) => {
                    Ok(QrPollResponse::Approved(AuthResponse {
                        user,
                        tokens: TokenPair::new(access, refresh),
                    }))
                }
                _ => Err(ApiError::InvalidResponse(
                    "QR login approved without a complete auth payload".to_string(),
                )),
            },
        }
    }
}
