//! Answer synthesis: natural-language summary and follow-up questions

use crate::config::MAX_SUGGESTIONS;
use crate::db::QueryOutput;
use crate::generate::GenerationClient;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Answer shown when the provider cannot summarize results
pub fn fallback_answer(error: &str) -> String {
    format!(
        "I found the results but couldn't generate a summary: {}",
        error
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Synthesis {
    pub answer: String,
    pub suggestions: Vec<String>,
    /// True when `answer` is the fallback notice
    pub degraded: bool,
}

/// Best-effort: never fails, so validated results are never discarded
pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerationClient>,
    max_suggestions: usize,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn GenerationClient>, max_suggestions: usize, timeout: Duration) -> Self {
        Self {
            generator,
            max_suggestions: max_suggestions.min(MAX_SUGGESTIONS),
            timeout,
        }
    }

    pub async fn synthesize(&self, question: &str, sql: &str, output: &QueryOutput) -> Synthesis {
        let answer = match tokio::time::timeout(
            self.timeout,
            self.generator.generate_answer(question, sql, output),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("Answer generation failed: {}", e);
                return Synthesis {
                    answer: fallback_answer(&e.to_string()),
                    suggestions: Vec::new(),
                    degraded: true,
                };
            }
            Err(_) => {
                warn!("Answer generation timed out");
                return Synthesis {
                    answer: fallback_answer(&format!("timed out after {:?}", self.timeout)),
                    suggestions: Vec::new(),
                    degraded: true,
                };
            }
        };

        let suggestions = if self.max_suggestions == 0 {
            Vec::new()
        } else {
            match tokio::time::timeout(
                self.timeout,
                self.generator.generate_suggestions(question, &answer),
            )
            .await
            {
                Ok(Ok(suggestions)) => self.clean(suggestions),
                Ok(Err(e)) => {
                    warn!("Suggestion generation failed: {}", e);
                    Vec::new()
                }
                Err(_) => {
                    warn!("Suggestion generation timed out");
                    Vec::new()
                }
            }
        };

        Synthesis {
            answer,
            suggestions,
            degraded: false,
        }
    }

    fn clean(&self, suggestions: Vec<String>) -> Vec<String> {
        let mut seen = HashSet::new();
        suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.to_lowercase()))
            .take(self.max_suggestions)
            .collect()
    }
}
