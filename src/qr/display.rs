//! The signed-in side of the generate/scan flow shows one QR token at a time.
//! Generating a new token replaces whatever was on screen.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use log::debug;

use crate::client::QrApi;
use crate::client::models::QrToken;
use crate::error::Result;

/// The token currently offered for scanning
#[derive(Default)]
pub struct QrDisplay {
    current: Mutex<Option<QrToken>>,
}

impl QrDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<QrToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask the server for a fresh token and show it instead of the previous one.
    ///
    /// On failure the previous token stays displayed.
    pub async fn generate<A: QrApi + ?Sized>(&self, api: &A) -> Result<QrToken> {
        let token = api.qr_generate().await?;
        if let Some(previous) = self.lock().replace(token.clone()) {
            debug!("QR token {} superseded by {}", previous.token, token.token);
        }
        Ok(token)
    }

    /// The displayed token, unless it has expired
    pub fn current(&self) -> Option<QrToken> {
        self.lock()
            .as_ref()
            .filter(|t| !t.is_expired_at(Utc::now()))
            .cloned()
    }

    pub fn clear(&self) {
        self.lock().take();
    }
}
