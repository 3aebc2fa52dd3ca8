//! Refinement options
//!
//! A single immutable record built once by the caller (defaults, file, env,
//! CLI, in that order) and passed by reference into the loop. Nothing in
//! this crate reads the environment.

use crate::generator::GenerationParams;
use crate::resilience::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Rough characters-per-token ratio used for prompt sizing.
pub const CHARS_PER_TOKEN: usize = 4;

/// Share of the model's token window reserved for the prompt; the rest is
/// left for the response.
pub const PROMPT_SHARE: f64 = 0.75;

/// Invalid option values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_iterations must be positive")]
    ZeroIterations,

    #[error("context_item_char_cap must be positive")]
    ZeroCharCap,

    #[error("{field} must be positive")]
    ZeroTimeout { field: &'static str },

    #[error("max_prompt_tokens too small ({got}, min: {min})")]
    PromptWindowTooSmall { got: usize, min: usize },

    #[error("retry.max_attempts must be at least 1")]
    ZeroRetryAttempts,
}

/// Options consumed by [`crate::feedback::RefinementLoop`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementOptions {
    /// Main generate/validate iterations before giving up.
    pub max_iterations: u32,
    /// Run the port usage analyzer (and its refinement path) on compiled code.
    pub enable_port_validation: bool,
    /// Maximum number of context items placed in a prompt.
    pub max_context_files: usize,
    /// Per-item character cap for context content.
    pub context_item_char_cap: usize,
    /// Include few-shot exemplars in the initial prompt.
    pub use_few_shot_examples: bool,
    /// Model token window used to size prompts.
    pub max_prompt_tokens: usize,
    /// Per-call generation timeout (seconds).
    pub generation_timeout_secs: u64,
    /// Per-call compile/test timeout (seconds).
    pub compile_timeout_secs: u64,
    /// Wall-clock deadline for the whole run (seconds). `None` = unbounded.
    pub overall_deadline_secs: Option<u64>,
    /// Sampling parameters for every generation call.
    pub generation: GenerationParams,
    /// Retry policy for transient generator failures.
    pub retry: RetryPolicy,
}

impl Default for RefinementOptions {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            enable_port_validation: true,
            max_context_files: 10,
            context_item_char_cap: 8_000,
            use_few_shot_examples: true,
            max_prompt_tokens: 8192,
            generation_timeout_secs: 300,
            compile_timeout_secs: 120,
            overall_deadline_secs: None,
            generation: GenerationParams::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl RefinementOptions {
    /// Smallest token window that still leaves room for a module.
    pub const MIN_PROMPT_TOKENS: usize = 1024;

    /// Single-shot profile: one iteration, no semantic check, no retries.
    pub fn single_shot() -> Self {
        Self {
            max_iterations: 1,
            enable_port_validation: false,
            retry: RetryPolicy::none(),
            ..Default::default()
        }
    }

    /// Check every field; call once after the record is assembled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.context_item_char_cap == 0 {
            return Err(ConfigError::ZeroCharCap);
        }
        if self.generation_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "generation_timeout_secs",
            });
        }
        if self.compile_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout {
                field: "compile_timeout_secs",
            });
        }
        if self.overall_deadline_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout {
                field: "overall_deadline_secs",
            });
        }
        if self.max_prompt_tokens < Self::MIN_PROMPT_TOKENS {
            return Err(ConfigError::PromptWindowTooSmall {
                got: self.max_prompt_tokens,
                min: Self::MIN_PROMPT_TOKENS,
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroRetryAttempts);
        }
        Ok(())
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_secs(self.compile_timeout_secs)
    }

    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_secs.map(Duration::from_secs)
    }

    /// Character budget for a whole prompt (75% of the window, ~4 chars/token).
    pub fn prompt_char_budget(&self) -> usize {
        let input_tokens = (self.max_prompt_tokens as f64 * PROMPT_SHARE) as usize;
        input_tokens * CHARS_PER_TOKEN
    }
}
