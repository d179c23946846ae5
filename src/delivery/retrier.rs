//! # Feature: Delivery Retrier
//!
//! Wraps one outbound transport operation with rate-limit waiting, error classification
//! and linear backoff. Two modes:
//!
//! - synchronous [`DeliveryRetrier::run`], for callers that need the result (e.g. to record
//!   the transport event id)
//! - fire-and-forget [`DeliveryRetrier::spawn`] / [`DeliveryRetrier::submit`], executed by a
//!   fixed pool of background workers fed through a channel
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Bounded worker pool for fire-and-forget deliveries
//! - 1.0.0: Initial retry loop with rate-limit awareness

use log::{debug, error, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::sleep;

use super::rate_limit::RateLimitGate;
use super::transport::TransportError;

/// Polling step while the rate-limit gate is closed
pub const RATE_LIMIT_POLL: Duration = Duration::from_secs(5);

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Retry budget and backoff step for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts that may fail transiently
    pub max_retries: u32,
    /// Sleep after the n-th transient failure is `base_backoff * n`
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Fire-and-forget messages
    pub const MESSAGE: RetryPolicy = RetryPolicy {
        max_retries: 10,
        base_backoff: Duration::from_secs(10),
    };

    /// Fire-and-forget reactions and redactions
    pub const REACTION: RetryPolicy = RetryPolicy {
        max_retries: 10,
        base_backoff: Duration::from_secs(15),
    };

    /// Interactive paths that wait for the result
    pub const SYNC: RetryPolicy = RetryPolicy {
        max_retries: 3,
        base_backoff: Duration::from_secs(5),
    };
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("delivery aborted: {0}")]
    Fatal(TransportError),

    #[error("amount of retries exceeded")]
    RetriesExceeded {
        attempts: u32,
        #[source]
        last: TransportError,
    },
}

/// Completion signal of a fire-and-forget delivery; dropping it is fine
pub struct DeliveryTicket {
    done: oneshot::Receiver<bool>,
}

impl DeliveryTicket {
    /// Wait for the background job; `true` when it succeeded
    pub async fn delivered(self) -> bool {
        self.done.await.unwrap_or(false)
    }
}

#[derive(Clone)]
pub struct DeliveryRetrier {
    gate: Arc<RateLimitGate>,
    poll_interval: Duration,
    jobs: mpsc::UnboundedSender<Job>,
}

impl DeliveryRetrier {
    /// Create a retrier with `workers` background workers for fire-and-forget jobs
    pub fn new(gate: Arc<RateLimitGate>, workers: usize) -> Self {
        let (jobs, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        for worker in 0..workers.max(1) {
            tokio::spawn(Self::worker(worker, Arc::clone(&receiver)));
        }

        DeliveryRetrier {
            gate,
            poll_interval: RATE_LIMIT_POLL,
            jobs,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn gate(&self) -> &Arc<RateLimitGate> {
        &self.gate
    }

    async fn worker(id: usize, receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>) {
        loop {
            let job = receiver.lock().await.recv().await;
            match job {
                Some(job) => job.await,
                None => {
                    debug!("Delivery worker {id} stopping");
                    break;
                }
            }
        }
    }

    /// Run `operation` until it succeeds, fails fatally or the budget is used up
    pub async fn run<T, F, Fut>(&self, policy: RetryPolicy, mut operation: F) -> Result<T, DeliveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let budget = policy.max_retries.max(1);
        let mut retries_left = budget;

        loop {
            while self.gate.blocked() {
                sleep(self.poll_interval).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(TransportError::RateLimited { retry_after }) => {
                    warn!("Rate limited by transport, pausing sends (hint: {retry_after:?})");
                    self.gate.record_limit_hit(retry_after);
                }
                Err(e @ TransportError::Fatal(_)) => {
                    error!("Delivery failed permanently: {e}");
                    return Err(DeliveryError::Fatal(e));
                }
                Err(e) => {
                    retries_left -= 1;
                    if retries_left == 0 {
                        return Err(DeliveryError::RetriesExceeded {
                            attempts: budget,
                            last: e,
                        });
                    }
                    let attempted = budget - retries_left;
                    warn!("Delivery attempt {attempted}/{budget} failed: {e}");
                    sleep(policy.base_backoff * attempted).await;
                }
            }
        }
    }

    /// Queue a background job on the worker pool
    pub fn submit<Fut>(&self, label: impl Into<String>, job: Fut) -> DeliveryTicket
    where
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let (done_tx, done) = oneshot::channel();

        let wrapped: Job = Box::pin(async move {
            let delivered = match job.await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Background delivery '{label}' failed: {e}");
                    false
                }
            };
            let _ = done_tx.send(delivered);
        });

        if self.jobs.send(wrapped).is_err() {
            error!("Delivery workers are gone, job dropped");
        }
        DeliveryTicket { done }
    }

    /// Fire-and-forget variant of [`DeliveryRetrier::run`]
    pub fn spawn<T, F, Fut>(
        &self,
        label: impl Into<String>,
        policy: RetryPolicy,
        operation: F,
    ) -> DeliveryTicket
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
    {
        let retrier = self.clone();
        self.submit(label, async move {
            retrier.run(policy, operation).await?;
            Ok(())
        })
    }
}
