//! OpenAI-compatible chat completions client (Groq, OpenAI, vLLM, Ollama, ...)

use super::{parse_suggestions, GenerationClient, GenerationResult};
use crate::config::{EngineConfig, GenerationConfig};
use crate::db::QueryOutput;
use crate::error::{Error, Result};
use crate::prompt::{answer_messages, suggestion_messages, ChatMessage, GenerationRequest};
use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generation client speaking the `/chat/completions` protocol
pub struct OpenAiClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    sql_temperature: f32,
    answer_temperature: f32,
    max_tokens: u32,
    answer_max_tokens: u32,
    answer_preview_rows: usize,
    max_suggestions: usize,
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl OpenAiClient {
    pub fn new(config: &GenerationConfig, engine: &EngineConfig) -> Result<Self> {
        // Url::join drops the last segment unless the base ends with '/'
        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| Error::Config(format!("Invalid generation base URL: {}", e)))?;

        let client = Client::builder().timeout(config.timeout()).build()?;
        let limiter = NonZeroU32::new(config.requests_per_minute)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key(),
            model: config.model.clone(),
            timeout: config.timeout(),
            sql_temperature: config.sql_temperature,
            answer_temperature: config.answer_temperature,
            max_tokens: config.max_tokens,
            answer_max_tokens: config.answer_max_tokens,
            answer_preview_rows: engine.answer_preview_rows,
            max_suggestions: engine.max_suggestions,
            limiter,
        })
    }

    /// Override the API key (normally read from the environment)
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join("chat/completions")
            .map_err(|e| Error::Config(format!("Invalid generation base URL: {}", e)))
    }

    async fn chat(&self, messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Result<String> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };
        let mut request = self.client.post(self.endpoint()?).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!("Requesting completion from {} ({} messages)", self.model, messages.len());
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::GenerationUnavailable(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                ))
            } else {
                Error::GenerationUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::GenerationUnavailable(
                "provider rate limit reached (HTTP 429)".to_string(),
            ));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::GenerationUnavailable(format!(
                "provider returned HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::GenerationUnavailable(format!("malformed completion: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| Error::GenerationUnavailable("provider returned no content".to_string()))
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn generate_sql(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let raw = self
            .chat(&request.to_messages(), self.sql_temperature, self.max_tokens)
            .await?;
        Ok(GenerationResult::from_raw(raw))
    }

    async fn generate_answer(&self, question: &str, sql: &str, output: &QueryOutput) -> Result<String> {
        let messages = answer_messages(question, sql, output, self.answer_preview_rows);
        self.chat(&messages, self.answer_temperature, self.answer_max_tokens)
            .await
    }

    async fn generate_suggestions(&self, question: &str, answer: &str) -> Result<Vec<String>> {
        if self.max_suggestions == 0 {
            return Ok(Vec::new());
        }
        let messages = suggestion_messages(question, answer, self.max_suggestions);
        let reply = self
            .chat(&messages, self.answer_temperature, self.answer_max_tokens)
            .await?;
        Ok(parse_suggestions(&reply, self.max_suggestions))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
