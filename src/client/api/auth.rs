//! Authentication API trait

use async_trait::async_trait;

use crate::client::models::AuthResponse;
use crate::error::Result;
use crate::session::TokenPair;

/// Credential operations for the Vigora API
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Sign in with email or username and password.
    ///
    /// The returned session is stored before this returns.
    async fn login(&self, email_or_username: &str, password: &str) -> Result<AuthResponse>;

    /// Exchange a refresh token for a new token pair and store it
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}
