//! Cancellable QR login polling
//!
//! The signed-out side of the start/approve flow asks the server for the
//! status of its code on a fixed interval until the code reaches a terminal
//! status, the code's lifetime runs out, or the poller is cancelled.

use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::QrApi;
use crate::client::models::{AuthResponse, QrCode, QrPollResponse};

/// How a polling run ended
#[derive(Debug, Clone, PartialEq)]
pub enum QrLoginOutcome {
    /// Approved; the session has already been stored by the client
    Approved(AuthResponse),
    Rejected,
    Expired,
    /// Stopped locally before a terminal status was seen
    Cancelled,
}

/// Polls one QR code until it settles
pub struct QrPoller<'a, A: QrApi + ?Sized> {
    api: &'a A,
    code: QrCode,
    interval: Duration,
    cancel: CancellationToken,
}

impl<'a, A: QrApi + ?Sized> QrPoller<'a, A> {
    pub fn new(api: &'a A, code: QrCode, interval: Duration) -> Self {
        Self {
            api,
            code,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle that cancels this poller
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Local deadline: the code's expiry plus one interval of slack for clock skew
    fn deadline(&self) -> Instant {
        let remaining = (self.code.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        Instant::now() + remaining + self.interval
    }

    /// Poll until a terminal status, expiry or cancellation.
    ///
    /// Failed polls (network errors, server errors) are logged and retried on
    /// the next tick; they never end the run on their own.
    pub async fn run(self) -> QrLoginOutcome {
        let deadline = self.deadline();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempt: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return QrLoginOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            if Instant::now() >= deadline {
                debug!("QR code {} passed its expiry locally", self.code.code);
                return QrLoginOutcome::Expired;
            }

            attempt += 1;
            let polled = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return QrLoginOutcome::Cancelled,
                polled = self.api.qr_poll(&self.code.code) => polled,
            };

            let response = match polled {
                Ok(response) => response,
                Err(err) => {
                    warn!("QR poll {} failed, retrying: {}", attempt, err);
                    continue;
                }
            };

            debug!("QR code {} is {} (poll {})", self.code.code, response.status(), attempt);
            match response {
                QrPollResponse::Pending => {}
                QrPollResponse::Approved(auth) => return QrLoginOutcome::Approved(auth),
                QrPollResponse::Rejected => return QrLoginOutcome::Rejected,
                QrPollResponse::Expired => return QrLoginOutcome::Expired,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::client::VigoraClient;
    use crate::client::mock::MockVigoraServer;
    use crate::client::vigora::QR_POLL_PATH;
    use crate::session::{MemorySessionStore, SessionStore};

    const INTERVAL: Duration = Duration::from_secs(2);

    type TestClient = VigoraClient<MockVigoraServer, MemorySessionStore>;

    async fn new_device() -> (Arc<MockVigoraServer>, TestClient) {
        let server = Arc::new(MockVigoraServer::new().with_user("ana", "secret").await);
        let client = VigoraClient::new(server.clone(), Arc::new(MemorySessionStore::new()));
        (server, client)
    }

    /// Let the poller run until the server has seen `count` polls
    async fn wait_for_polls(server: &MockVigoraServer, count: usize) {
        while server.calls(QR_POLL_PATH).await < count {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_approval_stops_polling_and_stores_session() {
        let (server, client) = new_device().await;
        let code = client.qr_start().await.unwrap();

        let poller = QrPoller::new(&client, code.clone(), INTERVAL);
        let approve = async {
            wait_for_polls(&server, 2).await;
            let resp = server.approve_as("ana", &code.code).await;
            assert!(resp.status.is_success());
        };

        let (outcome, ()) = tokio::join!(poller.run(), approve);

        match outcome {
            QrLoginOutcome::Approved(auth) => {
                assert_eq!(client.session().tokens(), Some(auth.tokens));
            }
            other => panic!("expected approval, got {:?}", other),
        }

        let polls = server.calls(QR_POLL_PATH).await;
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(server.calls(QR_POLL_PATH).await, polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_stops_polling() {
        let (server, client) = new_device().await;
        let code = client.qr_start().await.unwrap();
        client.qr_reject(&code.code).await.unwrap();

        let outcome = QrPoller::new(&client, code, INTERVAL).run().await;

        assert_eq!(outcome, QrLoginOutcome::Rejected);
        assert_eq!(server.calls(QR_POLL_PATH).await, 1);
        assert!(client.session().tokens().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_expiry_stops_polling() {
        let (server, client) = new_device().await;
        let code = client.qr_start().await.unwrap();
        server.advance_clock(chrono::Duration::minutes(10)).await;

        let outcome = QrPoller::new(&client, code, INTERVAL).run().await;

        assert_eq!(outcome, QrLoginOutcome::Expired);
        assert_eq!(server.calls(QR_POLL_PATH).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_do_not_end_polling() {
        let (server, client) = new_device().await;
        let code = client.qr_start().await.unwrap();
        server.fail_next(QR_POLL_PATH, 3).await;
        client.qr_reject(&code.code).await.unwrap();

        let outcome = QrPoller::new(&client, code, INTERVAL).run().await;

        assert_eq!(outcome, QrLoginOutcome::Rejected);
        assert_eq!(server.calls(QR_POLL_PATH).await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_polling() {
        let (server, client) = new_device().await;
        let code = client.qr_start().await.unwrap();

        let poller = QrPoller::new(&client, code, INTERVAL);
        let cancel = poller.cancellation_token();
        let stop = async {
            wait_for_polls(&server, 3).await;
            cancel.cancel();
        };

        let (outcome, ()) = tokio::join!(poller.run(), stop);

        assert_eq!(outcome, QrLoginOutcome::Cancelled);
        let polls = server.calls(QR_POLL_PATH).await;
        tokio::time::sleep(INTERVAL * 5).await;
        assert_eq!(server.calls(QR_POLL_PATH).await, polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_deadline_ends_unanswered_polling() {
        let (server, client) = new_device().await;
        // Every poll fails, so only the code's own lifetime can end the run
        server.fail_next(QR_POLL_PATH, usize::MAX).await;
        let code = QrCode {
            code: "qr-code-offline".to_string(),
            expires_at: Utc::now() + chrono::Duration::seconds(10),
        };

        let outcome = QrPoller::new(&client, code, INTERVAL).run().await;

        assert_eq!(outcome, QrLoginOutcome::Expired);
        assert!(server.calls(QR_POLL_PATH).await >= 5);
    }
}
