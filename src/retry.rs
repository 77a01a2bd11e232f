//! Bounded-attempt retry with a fixed inter-attempt delay
//!
//! Used by both the connect path (4 attempts) and the publish path
//! (3 attempts). The delay is constant by design: a single agent holds a
//! single director connection, so predictable recovery latency wins over
//! thundering-herd avoidance.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Outcome of one attempt that did not produce a value
#[derive(Debug)]
pub enum RetryDecision<E> {
    /// Try again if attempts remain
    Retry(E),
    /// Stop immediately; retrying cannot help
    Fatal(E),
}

/// Executes an operation up to `max_attempts` times, sleeping `delay`
/// between attempts
#[derive(Debug, Clone)]
pub struct AttemptRetryStrategy {
    max_attempts: u32,
    delay: Duration,
}

impl AttemptRetryStrategy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            // A zero bound would never run the operation.
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, fails fatally, or the bound is exhausted.
    /// On exhaustion the last error is returned.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RetryDecision<E>>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(RetryDecision::Fatal(err)) => return Err(err),
                Err(RetryDecision::Retry(err)) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    debug!(
                        "Attempt {attempt}/{} failed, retrying in {:?}",
                        self.max_attempts, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
