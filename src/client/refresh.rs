//! Single-flight token refresh coordination
//!
//! A burst of requests that all hit a 401 must produce one call to the
//! refresh endpoint. The first request to ask becomes the refresher; everyone
//! else is parked in a FIFO queue until the refresher settles.
//!
//! ```text
//! Idle --acquire--> Refreshing { waiters } --settle--> Idle
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use tokio::sync::oneshot;

/// Outcome handed to waiters: the new access token, or `None` if the refresh failed
pub type RefreshOutcome = Option<String>;

enum RefreshState {
    Idle,
    Refreshing {
        waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    },
}

/// What the caller of [`RefreshCoordinator::acquire`] has to do next
pub enum Role<'a> {
    /// Perform the refresh, then settle the guard
    Refresher(RefreshGuard<'a>),
    /// Wait for the in-flight refresh to settle
    Waiter(oneshot::Receiver<RefreshOutcome>),
}

/// Per-client refresh state machine
pub struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self {
            state: Mutex::new(RefreshState::Idle),
        }
    }
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Become the refresher if idle, otherwise join the waiter queue
    pub fn acquire(&self) -> Role<'_> {
        let mut state = self.lock();
        if let RefreshState::Refreshing { waiters } = &mut *state {
            let (tx, rx) = oneshot::channel();
            waiters.push_back(tx);
            debug!("Token refresh in flight, {} request(s) waiting", waiters.len());
            return Role::Waiter(rx);
        }

        *state = RefreshState::Refreshing {
            waiters: VecDeque::new(),
        };
        debug!("Token refresh started");
        Role::Refresher(RefreshGuard {
            coordinator: self,
            settled: false,
        })
    }

    /// Whether a refresh is in flight
    #[cfg(test)]
    pub fn is_refreshing(&self) -> bool {
        matches!(*self.lock(), RefreshState::Refreshing { .. })
    }

    /// Number of requests parked behind the in-flight refresh
    #[cfg(test)]
    pub fn pending_waiters(&self) -> usize {
        match &*self.lock() {
            RefreshState::Idle => 0,
            RefreshState::Refreshing { waiters } => waiters.len(),
        }
    }

    /// Return to idle and release every waiter in queue order
    fn settle(&self, outcome: RefreshOutcome) {
        let waiters = match std::mem::replace(&mut *self.lock(), RefreshState::Idle) {
            RefreshState::Idle => VecDeque::new(),
            RefreshState::Refreshing { waiters } => waiters,
        };

        debug!(
            "Token refresh {}, releasing {} waiter(s)",
            if outcome.is_some() { "succeeded" } else { "failed" },
            waiters.len()
        );

        for waiter in waiters {
            // A waiter whose request was dropped is simply skipped
            let _ = waiter.send(outcome.clone());
        }
    }
}

/// Exclusive right to perform the in-flight refresh.
///
/// Dropping the guard without settling (the refresher's future was cancelled,
/// or an error escaped) settles it as failed so waiters never hang.
pub struct RefreshGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl RefreshGuard<'_> {
    /// Finish the refresh with the new access token, or `None` on failure
    pub fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(outcome);
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.settle(None);
        }
    }
}
