//! Bounded retry with exponential backoff and jitter
//!
//! Wraps a dispatch attempt and re-runs it only for transient failures
//! (429 or 5xx). Each retry re-invokes the attempt closure in full,
//! including credential selection - a rate limit on one credential should
//! not pin the retry budget to that same credential.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

use super::DispatchError;

/// Default retry budget per logical call.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default base delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Backoff never exceeds this, so a retrying interactive call cannot stall
/// behind an unbounded exponential.
const MAX_BACKOFF: Duration = Duration::from_millis(6000);

/// Random jitter added on top of the capped backoff.
const MAX_JITTER_MS: u64 = 500;

/// Delay before retry number `attempt` (0-based): `min(base * 2^attempt,
/// 6s)` plus up to 500ms of jitter.
fn backoff_delay(attempt: u32, base_delay: Duration) -> Duration {
    let exponential = base_delay.saturating_mul(2u32.saturating_pow(attempt));
    let capped = exponential.min(MAX_BACKOFF);
    capped + Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS))
}

/// Run `attempt`, retrying transient failures up to `max_retries` times.
///
/// Returns the first success, or rethrows: immediately for non-transient
/// failures (other 4xx, parse errors, cancellation, statusless errors),
/// and after exhaustion for transient ones - always the last concrete
/// error, so the caller can still classify by status.
pub async fn with_retry<T, F, Fut>(
    mut attempt: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, DispatchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DispatchError>>,
{
    let mut last_error = None;

    for i in 0..=max_retries {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if i == max_retries {
                    log::error!("dispatch failed after {} retries: {}", max_retries, err);
                    last_error = Some(err);
                    break;
                }
                let delay = backoff_delay(i, base_delay);
                log::warn!(
                    "transient dispatch failure (status {:?}); retrying in {:?} (attempt {}/{})",
                    err.status(),
                    delay,
                    i + 1,
                    max_retries
                );
                last_error = Some(err);
                tokio::time::sleep(delay).await;
            }
            // Not worth retrying: a malformed request stays malformed.
            Err(err) => return Err(err),
        }
    }

    Err(last_error.unwrap_or_else(|| DispatchError::Network {
        status: None,
        message: "retries exhausted".to_string(),
    }))
}
