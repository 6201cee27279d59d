//! Vigora API data models
//!
//! Wire types for the authentication and QR login endpoints.

mod auth;
mod qr;

pub use auth::{AuthResponse, LoginRequest, MessageResponse, RefreshRequest, RefreshResponse};
pub use qr::{
    QrCode, QrCodeRequest, QrPollBody, QrPollResponse, QrScanRequest, QrStatus, QrToken,
};
