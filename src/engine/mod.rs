//! Schema-aware query engine
//!
//! Drives one question through retrieval, the bounded
//! generate/validate/execute/repair loop and answer synthesis.

mod answer;
pub mod state;

pub use answer::{fallback_answer, AnswerSynthesizer, Synthesis};
pub use state::{Event, Feedback, FeedbackKind, Phase};

use crate::config::Config;
use crate::db::{Database, QueryOutput};
use crate::error::{Error, Result};
use crate::generate::GenerationClient;
use crate::guard::{self, RejectionReason, ValidationVerdict};
use crate::prompt::{ChatTurn, PromptAssembler};
use crate::retrieve::Retriever;
use crate::schema::SchemaFragment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Response handed to the caller. Field names are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sql: Option<String>,
    pub results: Option<QueryOutput>,
    /// Wall-clock seconds for the whole request, two decimals
    pub execution_time: f64,
    pub error: Option<String>,
    pub suggestions: Vec<String>,
}

/// How an attempt ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded { row_count: usize },
    Rejected { reason: RejectionReason },
    ExecutionFailed { error: String },
    GenerationUnavailable { error: String },
}

impl From<&Feedback> for AttemptOutcome {
    fn from(feedback: &Feedback) -> Self {
        match &feedback.kind {
            FeedbackKind::Rejected { reason } => AttemptOutcome::Rejected {
                reason: reason.clone(),
            },
            FeedbackKind::ExecutionFailed => AttemptOutcome::ExecutionFailed {
                error: feedback.message.clone(),
            },
            FeedbackKind::GenerationUnavailable => AttemptOutcome::GenerationUnavailable {
                error: feedback.message.clone(),
            },
        }
    }
}

/// One generate/validate/execute iteration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub number: u32,
    pub sql: Option<String>,
    pub verdict: Option<ValidationVerdict>,
    pub outcome: AttemptOutcome,
    pub elapsed_ms: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Exhausted,
}

/// Response plus the diagnostics gathered on the way
#[derive(Debug, Clone, Serialize)]
pub struct Answered {
    pub request_id: Uuid,
    pub status: RunStatus,
    pub response: ChatResponse,
    pub attempts: Vec<Attempt>,
    pub retrieved: Vec<String>,
}

/// Tunables for the loop
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Repair attempts after the first generation
    pub max_retries: u32,
    pub top_k: usize,
    pub generation_timeout: Duration,
    pub execution_timeout: Duration,
    pub max_suggestions: usize,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.engine.max_retries,
            top_k: config.retrieval.top_k,
            generation_timeout: config.generation.timeout(),
            execution_timeout: config.database.query_timeout(),
            max_suggestions: config.engine.max_suggestions,
        }
    }
}

struct AttemptDraft {
    number: u32,
    sql: Option<String>,
    verdict: Option<ValidationVerdict>,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl AttemptDraft {
    fn begin(number: u32) -> Self {
        Self {
            number,
            sql: None,
            verdict: None,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    fn finish(&mut self, outcome: AttemptOutcome) -> Attempt {
        Attempt {
            number: self.number,
            sql: self.sql.take(),
            verdict: self.verdict.take(),
            outcome,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            started_at: self.started_at,
        }
    }
}

fn round_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100.0).round() / 100.0
}

/// Message text fed back to the generator for a failed call
fn failure_text(err: Error) -> String {
    match err {
        Error::Execution(message) => message,
        other => other.to_string(),
    }
}

/// Question-answering engine. Shared read-only across concurrent requests.
pub struct Engine {
    retriever: Arc<Retriever>,
    assembler: PromptAssembler,
    generator: Arc<dyn GenerationClient>,
    database: Arc<dyn Database>,
    synthesizer: AnswerSynthesizer,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        retriever: Arc<Retriever>,
        assembler: PromptAssembler,
        generator: Arc<dyn GenerationClient>,
        database: Arc<dyn Database>,
        settings: EngineSettings,
    ) -> Self {
        let synthesizer = AnswerSynthesizer::new(
            generator.clone(),
            settings.max_suggestions,
            settings.generation_timeout,
        );
        Self {
            retriever,
            assembler,
            generator,
            database,
            synthesizer,
            settings,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn database(&self) -> &dyn Database {
        self.database.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn generation_model(&self) -> &str {
        self.generator.model_name()
    }

    /// Answer a question.
    ///
    /// Only retrieval failures return `Err`. Generation, validation and
    /// execution failures are retried within the budget and, once it is
    /// spent, reported on `ChatResponse.error`.
    pub async fn ask(&self, question: &str, history: &[ChatTurn]) -> Result<Answered> {
        let request_id = Uuid::new_v4();
        let span = info_span!("ask", request_id = %request_id);
        self.run(request_id, question, history).instrument(span).await
    }

    async fn run(&self, request_id: Uuid, question: &str, history: &[ChatTurn]) -> Result<Answered> {
        let started = Instant::now();
        info!("Question: {}", question);

        let fragments = self.retriever.retrieve(question, self.settings.top_k).await?;
        let retrieved: Vec<String> = fragments.iter().map(|f| f.id.clone()).collect();
        debug!("Schema context: {:?}", retrieved);

        let (terminal, attempts) = self.drive(question, &fragments, history).await;

        let answered = match terminal {
            Phase::Succeeded { sql, output } => {
                let synthesis = self.synthesizer.synthesize(question, &sql, &output).await;
                info!(
                    "Answered in {} attempt(s), {} rows",
                    attempts.len(),
                    output.row_count
                );
                Answered {
                    request_id,
                    status: RunStatus::Succeeded,
                    response: ChatResponse {
                        answer: synthesis.answer,
                        sql: Some(sql),
                        results: Some(output),
                        execution_time: round_secs(started.elapsed()),
                        error: None,
                        suggestions: synthesis.suggestions,
                    },
                    attempts,
                    retrieved,
                }
            }
            Phase::Exhausted { last_failure } => {
                warn!(
                    "Retry budget exhausted after {} attempt(s): {}",
                    attempts.len(),
                    last_failure.message
                );
                Answered {
                    request_id,
                    status: RunStatus::Exhausted,
                    response: ChatResponse {
                        answer: format!(
                            "I couldn't produce a working query for that question after {} attempt(s). Last error: {}",
                            attempts.len(),
                            last_failure.message
                        ),
                        sql: None,
                        results: None,
                        execution_time: round_secs(started.elapsed()),
                        error: Some(last_failure.message),
                        suggestions: Vec::new(),
                    },
                    attempts,
                    retrieved,
                }
            }
            other => {
                return Err(Error::Other(format!(
                    "controller stopped in non-terminal phase {}",
                    other.name()
                )))
            }
        };

        Ok(answered)
    }

    /// Run the state machine to a terminal phase
    async fn drive(
        &self,
        question: &str,
        fragments: &[SchemaFragment],
        history: &[ChatTurn],
    ) -> (Phase, Vec<Attempt>) {
        let budget = self.settings.max_retries;
        let mut phase = Phase::start();
        let mut attempts = Vec::new();
        let mut draft = AttemptDraft::begin(1);

        loop {
            let event = match &phase {
                Phase::Generating { repairs, carry } => {
                    draft = AttemptDraft::begin(repairs + 1);
                    let prior = carry.as_ref().map(Feedback::repair_context);
                    let request =
                        self.assembler
                            .assemble(question, fragments, history, prior.as_ref());
                    debug!(
                        "Attempt {}: generating ({})",
                        draft.number,
                        if request.is_repair() { "repair" } else { "fresh" }
                    );
                    match tokio::time::timeout(
                        self.settings.generation_timeout,
                        self.generator.generate_sql(&request),
                    )
                    .await
                    {
                        Ok(Ok(result)) => Event::Generated(result),
                        Ok(Err(e)) => Event::GenerationFailed(failure_text(e)),
                        Err(_) => Event::GenerationFailed(format!(
                            "Generation provider unavailable: timed out after {:?}",
                            self.settings.generation_timeout
                        )),
                    }
                }
                Phase::Validating { sql, .. } => {
                    draft.sql = Some(sql.clone());
                    let verdict = guard::validate(sql);
                    draft.verdict = Some(verdict.clone());
                    Event::Validated(verdict)
                }
                Phase::Executing { sql, .. } => {
                    match tokio::time::timeout(
                        self.settings.execution_timeout,
                        self.database.execute(sql),
                    )
                    .await
                    {
                        Ok(Ok(output)) => Event::Executed(output),
                        Ok(Err(e)) => Event::ExecutionFailed(failure_text(e)),
                        Err(_) => Event::ExecutionFailed(format!(
                            "query timed out after {:?}",
                            self.settings.execution_timeout
                        )),
                    }
                }
                Phase::Repairing { .. } => Event::Retry,
                Phase::Succeeded { .. } | Phase::Exhausted { .. } => break,
            };

            phase = state::transition(phase, event, budget);

            match &phase {
                Phase::Repairing { feedback, .. } => {
                    let attempt = draft.finish(AttemptOutcome::from(feedback));
                    info!(
                        "Attempt {} failed after {}ms: {}",
                        attempt.number, attempt.elapsed_ms, feedback.message
                    );
                    attempts.push(attempt);
                }
                Phase::Succeeded { output, .. } => {
                    let attempt = draft.finish(AttemptOutcome::Succeeded {
                        row_count: output.row_count,
                    });
                    info!(
                        "Attempt {} succeeded after {}ms",
                        attempt.number, attempt.elapsed_ms
                    );
                    attempts.push(attempt);
                }
                _ => {}
            }
        }

        (phase, attempts)
    }
}
