//! HTTP generation client
//!
//! Speaks either the plain SLM `/generate` protocol or an OpenAI-compatible
//! chat-completions endpoint, and maps transport failures onto
//! [`GeneratorError`] so the refinement loop's retry policy can act on them.

use crate::config::{ApiFlavor, EndpointConfig};
use async_trait::async_trait;
use refinement::{GenerationParams, Generator, GeneratorError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Response fields checked, in order, for the generated text.
pub const TEXT_FIELDS: &[&str] = &["generated_text", "text", "response", "output", "result"];

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    max_length: u32,
    model: &'a str,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Pull the generated text out of a `/generate` response body.
///
/// Falls back to the whole JSON document rendered as a string.
pub fn response_text(body: &Value) -> String {
    if let Value::String(text) = body {
        return text.clone();
    }
    for field in TEXT_FIELDS {
        match body.get(field) {
            Some(Value::String(text)) => return text.clone(),
            Some(Value::Null) | None => continue,
            Some(other) => return other.to_string(),
        }
    }
    body.to_string()
}

/// Generation client backed by `reqwest`.
#[derive(Clone)]
pub struct SlmClient {
    http: reqwest::Client,
    endpoint: EndpointConfig,
    timeout: Duration,
}

impl SlmClient {
    pub fn new(endpoint: EndpointConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        info!(
            url = %endpoint.url,
            model = %endpoint.model,
            flavor = ?endpoint.flavor,
            timeout_secs = timeout.as_secs(),
            "Initialized generation client"
        );
        Ok(Self {
            http,
            endpoint,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.url.trim_end_matches('/'), path)
    }

    fn map_send_error(&self, err: reqwest::Error) -> GeneratorError {
        if err.is_timeout() {
            GeneratorError::Timeout {
                secs: self.timeout.as_secs(),
            }
        } else {
            GeneratorError::Transport(format!("HTTP request failed: {err}"))
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, GeneratorError> {
        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Transport(format!(
                "API error ({status}): {body}"
            )));
        }
        Ok(response)
    }

    async fn generate_native(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GeneratorError> {
        let request = GenerateRequest {
            prompt,
            max_length: params.max_length,
            model: &self.endpoint.model,
            temperature: params.temperature,
        };
        let response = self
            .send(self.http.post(self.url("generate")).json(&request))
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| GeneratorError::Malformed(format!("Failed to parse response: {e}")))?;
        Ok(response_text(&body))
    }

    async fn generate_chat(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GeneratorError> {
        let request = ChatRequest {
            model: &self.endpoint.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: params.max_length,
            temperature: params.temperature,
        };
        let mut builder = self.http.post(self.url("chat/completions")).json(&request);
        if let Some(key) = &self.endpoint.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = self.send(builder).await?;
        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::Malformed(format!("Failed to parse response: {e}")))?;
        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| GeneratorError::Malformed("No choices in response".into()))
    }
}

#[async_trait]
impl Generator for SlmClient {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, GeneratorError> {
        info!(
            model = %self.endpoint.model,
            temperature = params.temperature,
            prompt_chars = prompt.len(),
            "Calling generation endpoint"
        );
        let text = match self.endpoint.flavor {
            ApiFlavor::Generate => self.generate_native(prompt, params).await?,
            ApiFlavor::ChatCompletions => self.generate_chat(prompt, params).await?,
        };
        debug!(response_chars = text.len(), "Received generation");
        Ok(text)
    }
}
