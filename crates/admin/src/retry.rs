//! Retry of creates that lose a version race.
//!
//! Only [`KeyStoreError::VersionConflict`] is retried. A conflict proves the
//! record was not written; a transient backend error after the guarded insert
//! does not, and retrying it could store the same key material twice.
//!
//! Retries use exponential backoff with jitter:
//! - Base delay doubles with each retry: `initial_backoff * 2^retry`
//! - Delay is capped at `max_backoff`
//! - Random jitter of 0–50% of the computed delay is added so racing creators spread out

use std::{future::Future, time::Duration};

use keyrot_storage::{KeyStoreError, KeyStoreResult};
use rand::Rng;

use crate::config::CreateRetryConfig;

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` attempts are used up.
///
/// The last error is returned when attempts run out.
#[tracing::instrument(skip(config, operation), fields(max_attempts = config.max_attempts))]
pub(crate) async fn with_create_retry<F, Fut, T>(
    config: &CreateRetryConfig,
    mut operation: F,
) -> KeyStoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = KeyStoreResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err @ KeyStoreError::VersionConflict { .. }) if attempt < max_attempts => {
                let delay = compute_backoff(config, attempt - 1);
                tracing::debug!(
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "create failed, retrying after backoff",
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(err) => {
                if attempt > 1 {
                    tracing::warn!(attempts = attempt, error = %err, "create retries exhausted");
                }
                return Err(err);
            },
        }
    }
}

/// Computes the backoff duration before retry number `retry` (0-based).
///
/// `min(initial_backoff * 2^retry, max_backoff) + random(0..50% of delay)`
fn compute_backoff(config: &CreateRetryConfig, retry: u32) -> Duration {
    let base =
        config.initial_backoff.saturating_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX));
    let capped = base.min(config.max_backoff);

    let jitter_range = u64::try_from(capped.as_millis() / 2).unwrap_or(u64::MAX);
    if jitter_range > 0 {
        let jitter = rand::rng().random_range(0..=jitter_range);
        capped + Duration::from_millis(jitter)
    } else {
        capped
    }
}
