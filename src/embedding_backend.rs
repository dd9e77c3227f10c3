//! Client for an external text-embedding service
//!
//! Posts `{model, inputs}` to `<base>/v1/embed/text` and accepts the common
//! response shapes (`embeddings`, `vectors` or OpenAI-style `data`).
//! Server errors and connection failures are retried with a short backoff;
//! client errors are not.

use crate::error::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

const EMBED_TEXT_PATH: &str = "/v1/embed/text";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 2;

#[derive(Debug, Serialize)]
struct EmbedTextRequest<'a> {
    model: &'a str,
    inputs: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmbedTextResponse {
    Embeddings { embeddings: Vec<Vec<f32>> },
    Vectors { vectors: Vec<Vec<f32>> },
    Data { data: Vec<EmbeddingItem> },
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

impl From<EmbedTextResponse> for Vec<Vec<f32>> {
    fn from(response: EmbedTextResponse) -> Self {
        match response {
            EmbedTextResponse::Embeddings { embeddings } => embeddings,
            EmbedTextResponse::Vectors { vectors } => vectors,
            EmbedTextResponse::Data { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

enum Failure {
    Retryable(String),
    Fatal(String),
}

pub struct EmbeddingBackendClient {
    client: Client,
    endpoint: Url,
}

impl EmbeddingBackendClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let endpoint = Url::parse(base_url)?
            .join(EMBED_TEXT_PATH)
            .map_err(|e| Error::Config(format!("Invalid embedding backend URL: {}", e)))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, endpoint })
    }

    async fn post_once(&self, model: &str, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, Failure> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbedTextRequest { model, inputs })
            .send()
            .await
            .map_err(|e| Failure::Retryable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Failure::Retryable(format!("embedding service returned HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Failure::Fatal(format!(
                "embedding service returned HTTP {}: {}",
                status.as_u16(),
                detail.trim()
            )));
        }

        response
            .json::<EmbedTextResponse>()
            .await
            .map(Into::into)
            .map_err(|e| Failure::Fatal(format!("malformed embedding response: {}", e)))
    }

    /// Embed `inputs` with `model`, one vector per input
    pub async fn embed_text(&self, model: &str, inputs: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0;
        loop {
            match self.post_once(model, &inputs).await {
                Ok(vectors) => return Ok(vectors),
                Err(Failure::Fatal(message)) => return Err(Error::Embedding(message)),
                Err(Failure::Retryable(message)) if attempt >= MAX_RETRIES => {
                    return Err(Error::Embedding(message))
                }
                Err(Failure::Retryable(message)) => {
                    attempt += 1;
                    warn!("Embedding request failed ({}), retry {}/{}", message, attempt, MAX_RETRIES);
                    tokio::time::sleep(Duration::from_millis(200 * attempt as u64)).await;
                }
            }
        }
    }
}
