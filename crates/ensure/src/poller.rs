//! Bounded readiness polling.
//!
//! Transient errors from the check count as "not yet ready", but only up to
//! a bound of consecutive failures. Past the bound the poll fails with
//! [`ProviderError::Unavailable`] instead of retrying until the deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// Default interval between checks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default bound on consecutive transient errors.
pub const DEFAULT_MAX_TRANSIENT_ERRORS: u32 = 5;

/// Polling configuration.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between checks.
    pub interval: Duration,
    /// Consecutive transient errors tolerated before giving up.
    pub max_transient_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_transient_errors: DEFAULT_MAX_TRANSIENT_ERRORS,
        }
    }
}

/// Repeatedly runs a readiness check until it passes, the timeout elapses,
/// or the cancellation token fires.
#[derive(Debug, Clone)]
pub struct Poller {
    config: PollConfig,
    cancel: CancellationToken,
}

impl Poller {
    /// Create a poller that is never cancelled.
    #[must_use]
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Poll `check` until it returns `true`.
    ///
    /// Returns `Ok(false)` on plain timeout or cancellation.
    ///
    /// # Errors
    /// Returns [`ProviderError::Unavailable`] once the consecutive transient
    /// error bound is exceeded, or the first non-transient error unchanged.
    pub async fn poll<F, Fut>(&self, timeout: Duration, mut check: F) -> Result<bool, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ProviderError>>,
    {
        let start = Instant::now();
        let mut consecutive_errors = 0u32;

        loop {
            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    info!("Poll cancelled");
                    return Ok(false);
                }
                outcome = check() => outcome,
            };

            match outcome {
                Ok(true) => {
                    debug!(elapsed_secs = start.elapsed().as_secs(), "Check passed");
                    return Ok(true);
                }
                Ok(false) => {
                    consecutive_errors = 0;
                    debug!(elapsed_secs = start.elapsed().as_secs(), "Not ready yet");
                }
                Err(e) if e.is_transient() => {
                    consecutive_errors += 1;
                    if consecutive_errors > self.config.max_transient_errors {
                        return Err(ProviderError::Unavailable {
                            attempts: consecutive_errors,
                            last_error: e.to_string(),
                        });
                    }
                    warn!(
                        error = %e,
                        attempt = consecutive_errors,
                        bound = self.config.max_transient_errors,
                        "Transient error while polling"
                    );
                }
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                info!(timeout_secs = timeout.as_secs(), "Poll timed out");
                return Ok(false);
            }

            // never sleep past the deadline
            let pause = self.config.interval.min(timeout - elapsed);
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("Poll cancelled");
                    return Ok(false);
                }
                () = tokio::time::sleep(pause) => {}
            }
        }
    }
}
