//! Session state: the persisted access/refresh token pair
//!
//! The session store is the only mutable state shared between the API client,
//! the QR login flows and the CLI commands. It is injected wherever it is
//! needed so tests can run against an in-memory store.
//!
//! - [`MemorySessionStore`] - process-local store
//! - [`FileSessionStore`] - memory store mirrored to `session.yaml`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

mod file;
mod memory;

pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Short-lived bearer credential sent with each request
    pub access_token: String,

    /// Longer-lived credential used only to mint new access tokens
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// User record carried by auth payloads.
///
/// Only the fields the CLI displays are typed; everything else the server
/// sends is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Platform role (client, trainer, admin)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    /// Best human-readable identifier for the user
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.username.clone())
            .or_else(|| self.email.clone())
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| "unknown user".to_string())
    }
}

/// A signed-in session as persisted by a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub tokens: TokenPair,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,

    pub updated_at: DateTime<Utc>,
}

impl StoredSession {
    /// Build the session that results from storing `tokens`.
    ///
    /// Refresh responses may omit the user, in which case the previously
    /// stored user is carried over.
    pub(crate) fn merged(
        previous: Option<&StoredSession>,
        tokens: TokenPair,
        user: Option<UserProfile>,
    ) -> Self {
        let user = user.or_else(|| previous.and_then(|s| s.user.clone()));
        Self {
            tokens,
            user,
            updated_at: Utc::now(),
        }
    }
}

/// Change notifications broadcast by a session store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new token pair was stored
    Updated,
    /// The token pair was removed (logout, refresh failure, persistent 401)
    Cleared,
}

/// Storage for the current session.
///
/// Implementations broadcast [`SessionEvent::Cleared`] exactly once per
/// `clear()` that actually removed a session, so dependent state can reset.
pub trait SessionStore: Send + Sync {
    /// Current session, if signed in
    fn load(&self) -> Option<StoredSession>;

    /// Store a token pair. `user: None` keeps the previously stored user.
    fn set(&self, tokens: TokenPair, user: Option<UserProfile>) -> Result<()>;

    /// Remove the session. Returns whether anything was removed.
    fn clear(&self) -> Result<bool>;

    /// Subscribe to session changes
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    /// Current token pair
    fn tokens(&self) -> Option<TokenPair> {
        self.load().map(|s| s.tokens)
    }

    /// Current user record
    fn user(&self) -> Option<UserProfile> {
        self.load().and_then(|s| s.user)
    }
}
