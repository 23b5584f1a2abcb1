use crate::embedding::EmbeddingProvider;
use crate::http::API_ERROR_PREFIX;
use async_trait::async_trait;
use quarry_core::{QuarryError, QuarryResult, RetryPolicy};
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Whether a provider failure is transient.
///
/// Rate limits (429), server errors (5xx), timeouts and connection failures
/// are retried. Client errors such as 400 or 401 and every validation error
/// are not.
pub fn is_retryable(err: &QuarryError) -> bool {
    if err.is_validation() {
        return false;
    }
    let QuarryError::Http(msg) = err else {
        return false;
    };
    if let Some(status) = response_status(msg) {
        return status == 429 || (500..600).contains(&status);
    }
    let lower = msg.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out") || lower.contains("connection")
}

/// Status code of a non-success API response, read from the token right
/// after the error prefix. The response body is never inspected.
fn response_status(msg: &str) -> Option<u16> {
    msg.strip_prefix(API_ERROR_PREFIX)?
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|code| code.len() == 3)?
        .parse()
        .ok()
}

/// Wraps an [`EmbeddingProvider`] with exponential-backoff retries.
///
/// Transient failures are retried up to `max_retries` times, sleeping
/// `base * 2^attempt` milliseconds (capped) in between. Once retries are
/// exhausted, or on a non-retryable transport failure, the error is
/// surfaced as [`QuarryError::Provider`]. Validation errors pass through
/// unchanged.
pub struct RetryingEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

impl RetryingEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            #[cfg(test)]
            sleep_fn: None,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn do_sleep(&self, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = self.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    async fn with_retries<T, F, Fut>(&self, what: &str, mut call: F) -> QuarryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = QuarryResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            if err.is_validation() {
                return Err(err);
            }
            if !is_retryable(&err) {
                warn!(attempt, error = %err, "Non-retryable embedding failure");
                return Err(QuarryError::Provider(format!("{what} failed: {err}")));
            }
            if attempt >= self.policy.max_retries {
                warn!(
                    attempts = attempt + 1,
                    error = %err,
                    "Embedding retries exhausted"
                );
                return Err(QuarryError::Provider(format!(
                    "{what} failed after {} attempts: {err}",
                    attempt + 1
                )));
            }

            let delay = self.policy.backoff_ms(attempt);
            info!(
                attempt,
                delay_ms = delay,
                error = %err,
                "Retryable embedding failure, backing off"
            );
            self.do_sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl EmbeddingProvider for RetryingEmbedder {
    async fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        self.with_retries("embed", || self.inner.embed(text)).await
    }

    async fn embed_batch(&self, texts: &[&str]) -> QuarryResult<Vec<Vec<f32>>> {
        self.with_retries("embed_batch", || self.inner.embed_batch(texts))
            .await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}
