//! Retry logic for ledger reads.
//!
//! # Responsibilities
//! - Retry only idempotent reads
//! - Retry only transient ledger failures (connection errors, timeouts)
//! - Execute retries with exponential backoff + jitter
//!
//! # Design Decisions
//! - Mutations are never retried: a resent transaction could double-apply
//! - Domain errors (not found, unauthorized) return immediately

use std::future::Future;

use crate::config::RetryConfig;
use crate::registry::error::RegistryResult;
use crate::resilience::backoff::backoff_for;

/// Run `op` until it succeeds, fails permanently or attempts run out.
pub async fn retry_read<T, F, Fut>(config: &RetryConfig, op_name: &str, mut op: F) -> RegistryResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RegistryResult<T>>,
{
    let max_attempts = if config.enabled {
        config.max_attempts.max(1)
    } else {
        1
    };

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = backoff_for(config, attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient ledger error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
