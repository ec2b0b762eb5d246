//! Bounded retry with exponential backoff around an [`EventSink`]

use std::time::Duration;

use super::{EventSink, SinkError};
use crate::detection::event::DisturbanceEvent;

/// Upper bound on a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Sink wrapper retrying failed writes
///
/// After `attempts` failures the last error is returned and the event is
/// given up on; nothing is queued for later.
pub struct RetryingSink<S> {
    inner: S,
    attempts: u32,
    backoff: Duration,
}

impl<S: EventSink> RetryingSink<S> {
    /// Wrap `inner`
    ///
    /// # Arguments
    /// * `attempts` - Total write attempts per event (at least 1)
    /// * `backoff` - Delay before the first retry, doubled per retry
    pub fn new(inner: S, attempts: u32, backoff: Duration) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Access the wrapped sink
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: EventSink> EventSink for RetryingSink<S> {
    fn record(&mut self, event: &DisturbanceEvent) -> Result<(), SinkError> {
        let mut delay = self.backoff;
        let mut attempt = 1;

        loop {
            match self.inner.record(event) {
                Ok(()) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Disturbance logged after retry");
                    }
                    return Ok(());
                }
                Err(e) if attempt < self.attempts => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to log disturbance, retrying"
                    );
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
