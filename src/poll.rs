//! Polling with cancellation.
//!
//! The push pipeline waits on the network three times: for the funding
//! transaction to show up, for mempool headroom, and for each funding
//! output. All three go through [`Poller::until`]. The clock is injected
//! so tests run without real sleeps.

use crate::error::PipelineError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real time
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately and counts how often it was asked to sleep.
#[derive(Debug, Default)]
pub struct InstantClock {
    sleeps: AtomicU32,
}

impl InstantClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Clock for InstantClock {
    async fn sleep(&self, _duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
    }
}

#[derive(Clone)]
pub struct Poller {
    clock: Arc<dyn Clock>,
    interval: Duration,
    /// `None` polls until satisfied or cancelled
    max_attempts: Option<u32>,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        clock: Arc<dyn Clock>,
        interval: Duration,
        max_attempts: Option<u32>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            clock,
            interval,
            max_attempts,
            cancel,
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fail with `Cancelled` if the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `check` until it yields a value.
    ///
    /// Network errors count as "not yet"; anything else ends the wait.
    pub async fn until<T, F, Fut>(&self, what: &str, mut check: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, PipelineError>>,
    {
        let mut attempts: u32 = 0;
        loop {
            self.check_cancelled()?;
            attempts += 1;

            match check().await {
                Ok(Some(value)) => {
                    debug!(what, attempts, "Poll satisfied");
                    return Ok(value);
                }
                Ok(None) => {}
                Err(err) if err.is_transient() => {
                    warn!(what, attempts, error = %err, "Poll attempt failed, retrying");
                }
                Err(err) => return Err(err),
            }

            if let Some(max) = self.max_attempts {
                if attempts >= max {
                    return Err(PipelineError::PollExhausted {
                        what: what.to_string(),
                        attempts,
                    });
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = self.clock.sleep(self.interval) => {}
            }
        }
    }
}
