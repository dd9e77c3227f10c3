//! MCP tool definitions and handlers

use super::types::{ToolDefinition, ToolResult};
use crate::commands::{cmd_check, cmd_describe, cmd_tables};
use crate::engine::{Engine, RunStatus};
use crate::prompt::ChatTurn;
use crate::schema::SchemaCorpus;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Everything the tools read from
#[derive(Clone)]
pub struct ToolContext {
    pub engine: Arc<Engine>,
    pub corpus: Arc<SchemaCorpus>,
}

/// Get all available tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "ask_database".to_string(),
            description: "Answer a natural-language question about the database. Generates a read-only SQL query, runs it and summarizes the rows.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "The question, in plain language"
                    },
                    "history": {
                        "type": "array",
                        "description": "Optional earlier turns of the conversation, oldest first",
                        "items": {
                            "type": "object",
                            "properties": {
                                "question": { "type": "string" },
                                "answer": { "type": "string" }
                            },
                            "required": ["question", "answer"]
                        }
                    }
                },
                "required": ["question"]
            }),
        },
        ToolDefinition {
            name: "list_tables".to_string(),
            description: "List the tables the engine knows about, with row and column counts.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "describe_table".to_string(),
            description: "Show the schema documentation for one table: columns, keys and sample rows.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": "Table name (case-insensitive)"
                    }
                },
                "required": ["table"]
            }),
        },
        ToolDefinition {
            name: "validate_sql".to_string(),
            description: "Check whether a SQL statement would pass the read-only guard, without running it.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "The statement to check"
                    }
                },
                "required": ["sql"]
            }),
        },
    ]
}

/// Handle a tool call
pub async fn handle_tool_call(
    name: &str,
    arguments: &HashMap<String, Value>,
    context: &ToolContext,
) -> ToolResult {
    match name {
        "ask_database" => handle_ask(arguments, &context.engine).await,
        "list_tables" => ToolResult::json(&cmd_tables(&context.corpus)),
        "describe_table" => handle_describe(arguments, &context.corpus),
        "validate_sql" => handle_validate(arguments),
        _ => ToolResult::error(format!("Unknown tool: {}", name)),
    }
}

fn string_arg<'a>(arguments: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    match arguments.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Handle ask_database tool
async fn handle_ask(arguments: &HashMap<String, Value>, engine: &Engine) -> ToolResult {
    let Some(question) = string_arg(arguments, "question") else {
        return ToolResult::error("Missing required parameter: question");
    };

    let history: Vec<ChatTurn> = match arguments.get("history") {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(history) => history,
            Err(e) => return ToolResult::error(format!("Invalid history: {}", e)),
        },
    };

    match engine.ask(question, &history).await {
        Ok(answered) => {
            let mut result = ToolResult::json(&answered.response);
            result.is_error = answered.status == RunStatus::Exhausted;
            result
        }
        Err(e) => {
            error!("ask_database failed: {}", e);
            ToolResult::error(format!("Question failed: {}", e))
        }
    }
}

/// Handle describe_table tool
fn handle_describe(arguments: &HashMap<String, Value>, corpus: &SchemaCorpus) -> ToolResult {
    let Some(table) = string_arg(arguments, "table") else {
        return ToolResult::error("Missing required parameter: table");
    };

    match cmd_describe(corpus, table) {
        Ok(description) => {
            let text: Vec<&str> = description.fragments.iter().map(|f| f.text.as_str()).collect();
            ToolResult::text(text.join("\n---\n"))
        }
        Err(e) => ToolResult::error(e.to_string()),
    }
}

/// Handle validate_sql tool
fn handle_validate(arguments: &HashMap<String, Value>) -> ToolResult {
    match arguments.get("sql") {
        Some(Value::String(sql)) => ToolResult::json(&cmd_check(sql)),
        _ => ToolResult::error("Missing required parameter: sql"),
    }
}
