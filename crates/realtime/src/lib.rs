//! Live subscription driver with bounded reconnects.
//!
//! `Connecting -> Subscribed -> Retrying(n) -> Failed`. A [`Feed`] pushes
//! [`LinkEvent`]s into a channel; the driver reacts to them, forwards
//! messages to the consumer and reconnects with exponential backoff. A
//! successful subscription resets the retry count.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connecting,
    Subscribed,
    Retrying(u32),
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent<T> {
    Subscribed,
    Message(T),
    Error(String),
    Closed,
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("subscription failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// A source of live events. `open` runs one connection attempt, sending
/// events until the connection ends; returning drops the sender.
#[async_trait]
pub trait Feed: Send + Sync {
    type Item: Send + 'static;

    async fn open(&self, events: mpsc::Sender<LinkEvent<Self::Item>>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    /// `base * 2^(attempt-1)`, capped at `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Backoff {
                base: Duration::from_secs(1),
                max: Duration::from_secs(30),
            },
        }
    }
}

pub struct Subscription<F: Feed> {
    feed: F,
    policy: RetryPolicy,
    state: watch::Sender<LinkState>,
}

enum SessionEnd {
    Lost(String),
    Cancelled,
    ConsumerGone,
}

impl<F: Feed> Subscription<F> {
    pub fn new(feed: F, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(LinkState::Connecting);
        Self {
            feed,
            policy,
            state,
        }
    }

    /// Observe state transitions.
    pub fn watch(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    fn enter(&self, next: LinkState) {
        tracing::debug!(?next, "subscription state");
        self.state.send_replace(next);
    }

    /// Drive the feed until cancelled, the consumer hangs up, or retries
    /// run out.
    pub async fn run(
        self,
        out: mpsc::Sender<F::Item>,
        cancel: CancellationToken,
    ) -> Result<(), LinkError> {
        let mut attempt: u32 = 0;
        loop {
            self.enter(LinkState::Connecting);
            let last_error = match self.session(&out, &cancel, &mut attempt).await {
                SessionEnd::Cancelled | SessionEnd::ConsumerGone => return Ok(()),
                SessionEnd::Lost(reason) => reason,
            };

            attempt += 1;
            if attempt > self.policy.max_retries {
                self.enter(LinkState::Failed);
                tracing::error!(attempts = attempt, error = %last_error, "giving up on subscription");
                return Err(LinkError::RetriesExhausted {
                    attempts: attempt,
                    last_error,
                });
            }

            self.enter(LinkState::Retrying(attempt));
            let delay = self.policy.backoff.delay(attempt);
            tracing::warn!(attempt, ?delay, error = %last_error, "subscription lost, retrying");
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn session(
        &self,
        out: &mpsc::Sender<F::Item>,
        cancel: &CancellationToken,
        attempt: &mut u32,
    ) -> SessionEnd {
        let (tx, mut rx) = mpsc::channel(64);
        let session = self.feed.open(tx);
        tokio::pin!(session);
        let mut feed_done = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return SessionEnd::Cancelled,
                _ = &mut session, if !feed_done => feed_done = true,
                ev = rx.recv() => match ev {
                    Some(LinkEvent::Subscribed) => {
                        *attempt = 0;
                        self.enter(LinkState::Subscribed);
                    }
                    Some(LinkEvent::Message(item)) => {
                        if out.send(item).await.is_err() {
                            return SessionEnd::ConsumerGone;
                        }
                    }
                    Some(LinkEvent::Error(e)) => return SessionEnd::Lost(e),
                    Some(LinkEvent::Closed) | None => return SessionEnd::Lost("feed closed".to_owned()),
                },
            }
        }
    }
}
