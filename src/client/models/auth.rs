//! Authentication models

use serde::{Deserialize, Serialize};

use crate::session::{TokenPair, UserProfile};

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email_or_username: String,
    pub password: String,
}

/// Body of `POST /auth/refresh`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Full authenticated-session payload: user record plus token pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// Response of `POST /auth/refresh`. The user is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,

    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Plain `{message}` acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
