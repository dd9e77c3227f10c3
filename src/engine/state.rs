//! Retry controller state machine
//!
//! Pure: `transition` takes a phase and the event produced by running it and
//! returns the next phase. The async driver in `engine/mod.rs` performs the
//! I/O; nothing here awaits.
//!
//! ```text
//! Generating -> Validating -> Executing -> Succeeded
//!      \             \            \
//!       `-------------`------------`--> Repairing -> Generating
//!                                              `---> Exhausted
//! ```

use crate::db::QueryOutput;
use crate::generate::GenerationResult;
use crate::guard::{RejectionReason, ValidationVerdict};
use crate::prompt::RepairContext;
use serde::Serialize;

/// What went wrong in an attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedbackKind {
    Rejected { reason: RejectionReason },
    ExecutionFailed,
    GenerationUnavailable,
}

/// Failure of one attempt, fed to the next prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Feedback {
    #[serde(flatten)]
    pub kind: FeedbackKind,
    pub failed_sql: Option<String>,
    pub message: String,
}

impl Feedback {
    pub fn rejected(reason: RejectionReason, failed_sql: Option<String>) -> Self {
        Self {
            message: reason.to_string(),
            kind: FeedbackKind::Rejected { reason },
            failed_sql,
        }
    }

    pub fn execution_failed(sql: String, message: String) -> Self {
        Self {
            kind: FeedbackKind::ExecutionFailed,
            failed_sql: Some(sql),
            message,
        }
    }

    pub fn generation_unavailable(message: String) -> Self {
        Self {
            kind: FeedbackKind::GenerationUnavailable,
            failed_sql: None,
            message,
        }
    }

    pub fn repair_context(&self) -> RepairContext {
        RepairContext {
            failed_sql: self.failed_sql.clone(),
            error: self.message.clone(),
        }
    }
}

/// Controller phase. `repairs` counts repair attempts started so far.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    /// `carry` becomes the prompt's prior error
    Generating {
        repairs: u32,
        carry: Option<Feedback>,
    },
    Validating {
        repairs: u32,
        sql: String,
    },
    Executing {
        repairs: u32,
        sql: String,
    },
    Repairing {
        repairs: u32,
        feedback: Feedback,
        carry: Option<Feedback>,
    },
    Succeeded {
        sql: String,
        output: QueryOutput,
    },
    Exhausted {
        last_failure: Feedback,
    },
}

impl Phase {
    pub fn start() -> Self {
        Phase::Generating {
            repairs: 0,
            carry: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded { .. } | Phase::Exhausted { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Generating { .. } => "generating",
            Phase::Validating { .. } => "validating",
            Phase::Executing { .. } => "executing",
            Phase::Repairing { .. } => "repairing",
            Phase::Succeeded { .. } => "succeeded",
            Phase::Exhausted { .. } => "exhausted",
        }
    }
}

/// Result of running the work a phase calls for
#[derive(Debug, Clone)]
pub enum Event {
    Generated(GenerationResult),
    GenerationFailed(String),
    Validated(ValidationVerdict),
    Executed(QueryOutput),
    ExecutionFailed(String),
    Retry,
}

fn repair(repairs: u32, feedback: Feedback, previous: Option<Feedback>) -> Phase {
    // A provider outage says nothing about the SQL, so the last SQL
    // feedback stays the prompt's prior error
    let carry = match feedback.kind {
        FeedbackKind::GenerationUnavailable => previous,
        _ => Some(feedback.clone()),
    };
    Phase::Repairing {
        repairs,
        feedback,
        carry,
    }
}

/// Advance the controller.
///
/// At most `1 + budget` generations happen before a terminal phase. An event
/// that does not belong to the phase ends the run as exhausted.
pub fn transition(phase: Phase, event: Event, budget: u32) -> Phase {
    match (phase, event) {
        (Phase::Generating { repairs, carry }, Event::Generated(result)) => {
            match result.extracted_sql {
                Some(sql) => Phase::Validating { repairs, sql },
                None => repair(
                    repairs,
                    Feedback::rejected(RejectionReason::NoSqlExtracted, None),
                    carry,
                ),
            }
        }
        (Phase::Generating { repairs, carry }, Event::GenerationFailed(message)) => {
            repair(repairs, Feedback::generation_unavailable(message), carry)
        }
        (Phase::Validating { repairs, sql }, Event::Validated(verdict)) => match verdict {
            ValidationVerdict::Accepted { sql } => Phase::Executing { repairs, sql },
            ValidationVerdict::Rejected { reason } => {
                repair(repairs, Feedback::rejected(reason, Some(sql)), None)
            }
        },
        (Phase::Executing { sql, .. }, Event::Executed(output)) => {
            Phase::Succeeded { sql, output }
        }
        (Phase::Executing { repairs, sql }, Event::ExecutionFailed(message)) => {
            repair(repairs, Feedback::execution_failed(sql, message), None)
        }
        (
            Phase::Repairing {
                repairs,
                feedback,
                carry,
            },
            Event::Retry,
        ) => {
            let repairs = repairs + 1;
            if repairs > budget {
                Phase::Exhausted {
                    last_failure: feedback,
                }
            } else {
                Phase::Generating { repairs, carry }
            }
        }
        (terminal, _) if terminal.is_terminal() => terminal,
        (phase, event) => Phase::Exhausted {
            last_failure: Feedback::generation_unavailable(format!(
                "unexpected event {:?} while {}",
                event,
                phase.name()
            )),
        },
    }
}
