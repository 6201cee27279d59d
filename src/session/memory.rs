//! In-memory session store

use std::sync::{Mutex, PoisonError};

use log::debug;
use tokio::sync::broadcast;

use super::{SessionEvent, SessionStore, StoredSession, TokenPair, UserProfile};
use crate::error::Result;

/// Capacity of the session event channel
const EVENT_CAPACITY: usize = 16;

/// Process-local session store
pub struct MemorySessionStore {
    state: Mutex<Option<StoredSession>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(None),
            events,
        }
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that starts out signed in
    pub fn with_session(session: StoredSession) -> Self {
        let store = Self::default();
        *store.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        store
    }

    /// Replace the stored session without any I/O. Used by persisting wrappers.
    pub(crate) fn replace(&self, session: StoredSession) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
        let _ = self.events.send(SessionEvent::Updated);
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<StoredSession> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, tokens: TokenPair, user: Option<UserProfile>) -> Result<()> {
        let session = {
            let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            StoredSession::merged(state.as_ref(), tokens, user)
        };
        self.replace(session);
        Ok(())
    }

    fn clear(&self) -> Result<bool> {
        let removed = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();

        if removed {
            debug!("Session cleared");
            let _ = self.events.send(SessionEvent::Cleared);
        }
        Ok(removed)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
