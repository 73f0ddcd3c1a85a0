//! Repeating fetches for the chat screen.
//!
//! The server has no push channel, so an open conversation is kept fresh by
//! re-fetching the thread and the unread map on a timer.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use cofound_shared::api::{ThreadResponse, UnreadCounts};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::client::{ApiClient, ApiError};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3);

/// Stops its poll loop when stopped or dropped.
pub struct PollHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Waits for the loop to exit. Does not stop it.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Poll task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
    token: CancellationToken,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            token: CancellationToken::new(),
        }
    }

    /// Ties the poller to a parent token: cancelling the parent stops every
    /// loop spawned from it.
    pub fn with_parent(interval: Duration, parent: &CancellationToken) -> Self {
        Self {
            interval,
            token: parent.child_token(),
        }
    }

    /// Runs `tick` now and then every interval until the handle is stopped
    /// or dropped, or `tick` breaks.
    pub fn spawn<F, Fut>(&self, mut tick: F) -> PollHandle
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let token = self.token.child_token();
        let period = self.interval;
        let loop_token = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if tick().await.is_break() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Poller stopped");
        });

        PollHandle {
            token,
            task: Some(task),
        }
    }
}

/// One refresh of an open conversation.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub thread: ThreadResponse,
    pub unread: UnreadCounts,
}

async fn fetch_snapshot(client: &Mutex<ApiClient>, partner: &str) -> Result<ChatSnapshot, ApiError> {
    let mut client = client.lock().await;
    let thread = client.thread(partner).await?;
    let unread = client.unread_counts().await?;
    Ok(ChatSnapshot { thread, unread })
}

/// Polls the conversation with `partner` and sends each snapshot to `tx`.
/// Stops once the receiver is gone or the session is no longer valid.
pub fn watch_thread(
    poller: &Poller,
    client: Arc<Mutex<ApiClient>>,
    partner: String,
    tx: mpsc::Sender<ChatSnapshot>,
) -> PollHandle {
    poller.spawn(move || {
        let client = client.clone();
        let partner = partner.clone();
        let tx = tx.clone();
        async move {
            match fetch_snapshot(&client, &partner).await {
                Ok(snapshot) => {
                    if tx.send(snapshot).await.is_err() {
                        return ControlFlow::Break(());
                    }
                }
                Err(ApiError::Unauthorized) => return ControlFlow::Break(()),
                Err(e) => tracing::warn!("Chat refresh failed: {}", e),
            }
            ControlFlow::Continue(())
        }
    })
}
