//! Retry pacing for discovery fetches (sitemaps and robots.txt).

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use crate::config::Limits;

pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 10,
        }
    }

    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt.min(20)));
        let capped = exponential.min(self.max_ms);
        let jitter = if self.jitter_percent > 0 {
            rand::thread_rng().gen_range(0..capped / self.jitter_percent + 1)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }
}

/// Run `op` up to `Limits::DISCOVERY_RETRIES` times, sleeping an
/// exponentially growing delay between attempts (500 ms, 1 s, ...).
/// Conclusive errors (`is_transient` returns false) end the loop early.
/// Returns the first success or the last error.
pub async fn retry_discovery<T, E, F, Fut, P>(mut op: F, is_transient: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let backoff = ExponentialBackoff::new(Limits::DISCOVERY_BACKOFF_MS, 60_000).with_jitter(0);
    let mut last_err = None;

    for attempt in 0..Limits::DISCOVERY_RETRIES {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let transient = is_transient(&e);
                last_err = Some(e);
                if !transient {
                    break;
                }
                if attempt + 1 < Limits::DISCOVERY_RETRIES {
                    tokio::time::sleep(backoff.delay(attempt)).await;
                }
            }
        }
    }

    Err(last_err.expect("at least one attempt runs"))
}
