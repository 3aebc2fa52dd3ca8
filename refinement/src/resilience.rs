//! Resilience: bounded retry around generator calls
//!
//! Generator calls fail for reasons unrelated to the prompt (connection
//! resets, overloaded inference servers, slow responses). Those are retried
//! with exponential backoff up to a fixed cap; anything else surfaces
//! immediately so the loop can record it against the current iteration.
//!
//! ```text
//! call ──ok──────────────────────────────► response
//!   └─timeout/transport─► sleep(backoff) ─► call (up to max_attempts)
//!   └─malformed──────────────────────────► error (no retry)
//! ```

use crate::generator::{GenerationParams, Generator, GeneratorError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Retry policy for transient generator failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total calls allowed for one generation, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Upper bound for a single delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    /// Default: 3 calls, 2s initial backoff, 2x multiplier, 30s max.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Backoff to wait after `calls_made` failed calls.
    pub fn backoff_ms(&self, calls_made: u32) -> u64 {
        if calls_made == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(calls_made as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Backoff as a `Duration`.
    pub fn backoff_duration(&self, calls_made: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(calls_made))
    }

    /// Whether another call is allowed after `calls_made` calls.
    pub fn should_retry(&self, calls_made: u32) -> bool {
        calls_made < self.max_attempts
    }
}

/// Call the generator, retrying transient failures per `policy`.
///
/// Each individual call is bounded by `call_timeout`; an elapsed timeout is
/// reported as [`GeneratorError::Timeout`] and retried like a transport error.
pub async fn generate_with_retry<G>(
    generator: &G,
    prompt: &str,
    params: &GenerationParams,
    policy: &RetryPolicy,
    call_timeout: Duration,
) -> Result<String, GeneratorError>
where
    G: Generator + ?Sized,
{
    let mut calls_made = 0u32;
    loop {
        calls_made += 1;
        let result =
            match tokio::time::timeout(call_timeout, generator.generate(prompt, params)).await {
                Ok(result) => result,
                Err(_) => Err(GeneratorError::Timeout {
                    secs: call_timeout.as_secs(),
                }),
            };

        match result {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && policy.should_retry(calls_made) => {
                let backoff = policy.backoff_duration(calls_made);
                warn!(
                    attempt = calls_made,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient generator error, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::Sequence;

    mock! {
        Gen {}

        #[async_trait]
        impl Generator for Gen {
            async fn generate(
                &self,
                prompt: &str,
                params: &GenerationParams,
            ) -> Result<String, GeneratorError>;
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 10,
            backoff_multiplier: 2.0,
            max_backoff_ms: 100,
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 0);
        assert_eq!(policy.backoff_ms(1), 2_000);
        assert_eq!(policy.backoff_ms(2), 4_000);
        assert_eq!(policy.backoff_ms(3), 8_000);
        assert_eq!(policy.backoff_ms(10), 30_000);
    }

    #[test]
    fn test_should_retry_bound() {
        let policy = fast_policy(3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let mut gen = MockGen::new();
        let mut seq = Sequence::new();
        gen.expect_generate()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _| Err(GeneratorError::Transport("503".into())));
        gen.expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("module m; endmodule".into()));

        let result = generate_with_retry(
            &gen,
            "prompt",
            &GenerationParams::default(),
            &fast_policy(3),
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(result.unwrap(), "module m; endmodule");
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_cap() {
        let mut gen = MockGen::new();
        gen.expect_generate()
            .times(3)
            .returning(|_, _| Err(GeneratorError::Transport("connection refused".into())));

        let result = generate_with_retry(
            &gen,
            "prompt",
            &GenerationParams::default(),
            &fast_policy(3),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(GeneratorError::Transport(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_is_not_retried() {
        let mut gen = MockGen::new();
        gen.expect_generate()
            .times(1)
            .returning(|_, _| Err(GeneratorError::Malformed("no text field".into())));

        let result = generate_with_retry(
            &gen,
            "prompt",
            &GenerationParams::default(),
            &fast_policy(3),
            Duration::from_secs(5),
        )
        .await;

        assert!(matches!(result, Err(GeneratorError::Malformed(_))));
    }

    struct SlowGen;

    #[async_trait]
    impl Generator for SlowGen {
        async fn generate(&self, _: &str, _: &GenerationParams) -> Result<String, GeneratorError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_maps_to_timeout_error() {
        let result = generate_with_retry(
            &SlowGen,
            "prompt",
            &GenerationParams::default(),
            &fast_policy(2),
            Duration::from_secs(30),
        )
        .await;

        assert_eq!(result, Err(GeneratorError::Timeout { secs: 30 }));
    }
}
