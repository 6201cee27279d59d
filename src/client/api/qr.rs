//! QR login API trait

use async_trait::async_trait;

use crate::client::models::{AuthResponse, QrCode, QrPollResponse, QrToken};
use crate::error::Result;

/// QR login handshake operations
///
/// Two flows share this surface:
/// - start / poll / approve / reject: the signed-out device shows a code and
///   waits for a signed-in session to approve it
/// - generate / scan-login: the signed-in device shows a token and the
///   signed-out device submits it once
#[async_trait]
pub trait QrApi: Send + Sync {
    /// Issue a fresh pending code (no authentication needed)
    async fn qr_start(&self) -> Result<QrCode>;

    /// Read the current status of a code. An approval stores the session.
    async fn qr_poll(&self, code: &str) -> Result<QrPollResponse>;

    /// Approve a pending code from a signed-in session
    async fn qr_approve(&self, code: &str) -> Result<String>;

    /// Reject a pending code
    async fn qr_reject(&self, code: &str) -> Result<String>;

    /// Issue a single-use login token for display (signed-in session)
    async fn qr_generate(&self) -> Result<QrToken>;

    /// Consume a generated token and store the resulting session
    async fn qr_scan_login(&self, token: &str) -> Result<AuthResponse>;
}
