//! Async retry loop and per-attempt timeout.

use std::future::Future;
use std::time::Duration;

use super::classify;
use super::error::ChunkError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs `op` until it succeeds or the retry policy says to stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, ChunkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChunkError>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, ?kind, delay_ms = d.as_millis() as u64, error = %e, "retrying chunk");
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

/// Bounds a single attempt by `limit` when set; expiry is a retryable `TimedOut`.
pub async fn with_timeout<T, Fut>(limit: Option<Duration>, fut: Fut) -> Result<T, ChunkError>
where
    Fut: Future<Output = Result<T, ChunkError>>,
{
    match limit {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .unwrap_or(Err(ChunkError::TimedOut(d))),
        None => fut.await,
    }
}
