//! Ask and chat commands

use crate::db::QueryOutput;
use crate::engine::{Answered, AttemptOutcome, Engine, RunStatus};
use crate::error::Result;
use crate::prompt::ChatTurn;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Turns kept in memory by an interactive session
pub const CHAT_HISTORY_LIMIT: usize = 20;

/// Rows printed in the console results table
const DISPLAY_ROWS: usize = 20;

/// Answer a single question
pub async fn cmd_ask(engine: &Engine, question: &str) -> Result<Answered> {
    engine.ask(question, &[]).await
}

/// In-memory conversation for one interactive session
#[derive(Debug, Clone)]
pub struct ChatSession {
    turns: VecDeque<ChatTurn>,
    limit: usize,
}

impl ChatSession {
    pub fn new(limit: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(limit),
            limit,
        }
    }

    /// Append a turn, dropping the oldest past the limit
    pub fn record(&mut self, question: &str, answer: &str) {
        if self.limit == 0 {
            return;
        }
        while self.turns.len() >= self.limit {
            self.turns.pop_front();
        }
        self.turns.push_back(ChatTurn {
            question: question.to_string(),
            answer: answer.to_string(),
        });
    }

    /// Oldest first
    pub fn history(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

enum ChatInput {
    Quit,
    Clear,
    History,
    Question(String),
    Blank,
}

fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => ChatInput::Blank,
        "exit" | "quit" | "/exit" | "/quit" => ChatInput::Quit,
        "clear" | "/clear" | "/reset" => ChatInput::Clear,
        "history" | "/history" => ChatInput::History,
        _ => ChatInput::Question(trimmed.to_string()),
    }
}

/// Interactive question loop on stdin
pub async fn cmd_chat(engine: &Engine, json: bool) -> Result<()> {
    let mut session = ChatSession::new(CHAT_HISTORY_LIMIT);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    if !json {
        println!("💬 Ask questions about your database. Type 'exit' to quit, 'clear' to reset the conversation.");
    }

    loop {
        if !json {
            print!("\n› ");
            let _ = std::io::stdout().flush();
        }

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match parse_input(&line) {
            ChatInput::Blank => continue,
            ChatInput::Quit => break,
            ChatInput::Clear => {
                session.clear();
                if !json {
                    println!("✓ Conversation cleared");
                }
            }
            ChatInput::History => {
                for (i, turn) in session.history().iter().enumerate() {
                    println!("{}. {}", i + 1, turn.question);
                }
            }
            ChatInput::Question(question) => {
                match engine.ask(&question, &session.history()).await {
                    Ok(answered) => {
                        session.record(&question, &answered.response.answer);
                        if json {
                            println!("{}", serde_json::to_string(&answered.response)?);
                        } else {
                            print_answered(&answered, false);
                        }
                    }
                    Err(e) => error!("{}", e),
                }
            }
        }
    }

    Ok(())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print query rows as a plain table
pub fn print_results(output: &QueryOutput) {
    if output.rows.is_empty() {
        println!("  (no rows)");
        return;
    }

    println!("  {}", output.columns.join(" | "));
    for row in output.rows.iter().take(DISPLAY_ROWS) {
        let cells: Vec<String> = output
            .columns
            .iter()
            .map(|c| row.get(c).map(display_value).unwrap_or_default())
            .collect();
        println!("  {}", cells.join(" | "));
    }
    if output.row_count > DISPLAY_ROWS {
        println!("  ... and {} more rows", output.row_count - DISPLAY_ROWS);
    }
}

/// Print an answer to console
pub fn print_answered(answered: &Answered, show_attempts: bool) {
    let response = &answered.response;

    match answered.status {
        RunStatus::Succeeded => println!("\n{}", response.answer),
        RunStatus::Exhausted => println!("\n⚠ {}", response.answer),
    }

    if let Some(sql) = &response.sql {
        println!("\nSQL:\n  {}", sql);
    }

    if let Some(results) = &response.results {
        println!("\nResults ({} rows):", results.row_count);
        print_results(results);
    }

    if !response.suggestions.is_empty() {
        println!("\nYou could also ask:");
        for suggestion in &response.suggestions {
            println!("  • {}", suggestion);
        }
    }

    if show_attempts {
        println!("\nAttempts:");
        for attempt in &answered.attempts {
            let outcome = match &attempt.outcome {
                AttemptOutcome::Succeeded { row_count } => format!("✓ {} rows", row_count),
                AttemptOutcome::Rejected { reason } => format!("✗ {}", reason),
                AttemptOutcome::ExecutionFailed { error } => format!("✗ {}", error),
                AttemptOutcome::GenerationUnavailable { error } => format!("✗ {}", error),
            };
            println!("  {}. [{}ms] {}", attempt.number, attempt.elapsed_ms, outcome);
            if let Some(sql) = &attempt.sql {
                println!("     {}", sql);
            }
        }
        println!("  Schema context: {}", answered.retrieved.join(", "));
    }

    println!("\n({:.2}s)", response.execution_time);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_keeps_most_recent_turns() {
        let mut session = ChatSession::new(3);
        for i in 0..5 {
            session.record(&format!("q{}", i), &format!("a{}", i));
        }
        let questions: Vec<String> = session.history().into_iter().map(|t| t.question).collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);

        session.clear();
        assert!(session.is_empty());
    }

    #[test]
    fn test_session_default_limit() {
        let mut session = ChatSession::new(CHAT_HISTORY_LIMIT);
        for i in 0..25 {
            session.record(&format!("q{}", i), "a");
        }
        assert_eq!(session.len(), 20);
        assert_eq!(session.history()[0].question, "q5");
    }

    #[test]
    fn test_parse_input() {
        assert!(matches!(parse_input("  "), ChatInput::Blank));
        assert!(matches!(parse_input("EXIT"), ChatInput::Quit));
        assert!(matches!(parse_input("/reset"), ChatInput::Clear));
        assert!(matches!(
            parse_input(" How many orders? "),
            ChatInput::Question(ref q) if q == "How many orders?"
        ));
    }
}
