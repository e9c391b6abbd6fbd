use super::{CompletionClient, CompletionError, CompletionRequest};
use async_trait::async_trait;
use std::time::Duration;

/// Timeout and retry settings applied around every completion call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Additional attempts after the first one, for retryable errors only.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Wraps a client with per-call timeouts and bounded exponential-backoff retries.
pub struct ResilientClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> ResilientClient<C> {
    /// Wrap `inner` with `policy`.
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C> CompletionClient for ResilientClient<C>
where
    C: CompletionClient,
{
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let mut attempt = 0u32;
        loop {
            let outcome =
                match tokio::time::timeout(self.policy.timeout, self.inner.complete(request.clone()))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CompletionError::Timeout(self.policy.timeout)),
                };

            match outcome {
                Ok(text) => return Ok(text),
                Err(error) if error.is_retryable() && attempt < self.policy.max_retries => {
                    let delay = self.policy.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    attempt += 1;
                    tracing::warn!(
                        error = %error,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Completion call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
