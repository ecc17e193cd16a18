use std::time::Duration;

use super::provider::{AssistantInput, AssistantOutput, LlmError, LlmProvider, LlmResult};

/// Decides whether a failed model call is worth another attempt.
pub type RetryPredicate = fn(&LlmError) -> bool;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    pub predicate: RetryPredicate,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2.0,
            predicate: LlmError::is_transient,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = (self.initial_backoff.as_millis() as f64 * factor)
            .min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }

    pub fn should_retry(&self, err: &LlmError, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1) && (self.predicate)(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    pub attempt: u32,
    pub delay: Duration,
    pub error: LlmError,
}

pub async fn generate_with_retry<P: LlmProvider, F: FnMut(RetryNotice)>(
    provider: &P,
    input: &AssistantInput,
    policy: &RetryPolicy,
    on_retry: &mut F,
) -> LlmResult<AssistantOutput> {
    let mut attempt = 1;
    loop {
        match provider.generate(input.clone()).await {
            Ok(output) => return Ok(output),
            Err(err) if policy.should_retry(&err, attempt) => {
                let delay = policy.backoff_for(attempt);
                on_retry(RetryNotice {
                    attempt,
                    delay,
                    error: err,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
