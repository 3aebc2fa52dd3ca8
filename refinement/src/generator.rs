//! Language-model boundary.
//!
//! The refinement loop only ever sees a [`Generator`]: a call that turns a
//! prompt into response text. Transport, authentication and model selection
//! belong to the implementor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Sampling parameters forwarded with every generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    /// Sampling temperature (0.0–1.0).
    pub temperature: f32,
    /// Maximum generation length in tokens.
    pub max_length: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_length: 8192,
        }
    }
}

/// Failure modes of a generation call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GeneratorError {
    /// The call did not complete within its timeout.
    #[error("generation timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection failure, non-success HTTP status, or similar.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered but the payload could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl GeneratorError {
    /// Whether another attempt at the same call may succeed.
    ///
    /// Malformed payloads are deterministic for a given prompt and are handed
    /// to the extractor as an empty response instead.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport(_))
    }
}

/// Text-completion service consumed by the refinement loop.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a response for `prompt`.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GeneratorError>;
}

#[async_trait]
impl<T: Generator + ?Sized> Generator for Box<T> {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GeneratorError> {
        (**self).generate(prompt, params).await
    }
}
