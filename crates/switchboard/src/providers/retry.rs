use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::base::ProviderError;

/// Retry configuration for a single HTTP request-and-decode.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(3),
            jitter_ratio: 0.25,
        }
    }
}

/// Invoke `op` with exponential backoff on transient errors.
///
/// The delay for retry `n` is `min(base_delay * 2^(n-1), max_delay)` plus a
/// uniformly random jitter in `[0, jitter_ratio * delay]`. Terminal errors
/// and the last transient error after `max_attempts` surface verbatim.
/// Cancelling (dropping) the returned future aborts any in-flight attempt
/// or backoff sleep.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_transient() {
            return Err(err);
        }
        attempt += 1;
        if attempt >= config.max_attempts {
            return Err(err);
        }

        let exponential = config.base_delay.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
        let delay = exponential.min(config.max_delay.as_secs_f64());
        let jitter_bound = config.jitter_ratio * delay;
        let jitter = if jitter_bound > 0.0 {
            rand::thread_rng().gen_range(0.0..jitter_bound)
        } else {
            0.0
        };
        tokio::time::sleep(Duration::from_secs_f64(delay + jitter)).await;
    }
}
