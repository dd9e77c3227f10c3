//! Text generation capability: SQL, answers and follow-up suggestions

pub mod extract;
mod openai;

pub use extract::{extract_sql, parse_suggestions};
pub use openai::OpenAiClient;

use crate::db::QueryOutput;
use crate::error::Result;
use crate::prompt::GenerationRequest;
use async_trait::async_trait;
use serde::Serialize;

/// Reply to a SQL generation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    pub raw_text: String,
    /// `None` when no statement could be recovered from `raw_text`
    pub extracted_sql: Option<String>,
}

impl GenerationResult {
    pub fn from_raw(raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let extracted_sql = extract_sql(&raw_text);
        Self {
            raw_text,
            extracted_sql,
        }
    }
}

/// Trait for text generation providers.
///
/// Every call is bounded by the implementation's timeout. Provider errors,
/// rate limiting and timeouts all surface as `Error::GenerationUnavailable`;
/// retrying is the caller's decision.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate_sql(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    async fn generate_answer(&self, question: &str, sql: &str, output: &QueryOutput)
        -> Result<String>;

    async fn generate_suggestions(&self, question: &str, answer: &str) -> Result<Vec<String>>;

    /// Get the model name
    fn model_name(&self) -> &str;
}
