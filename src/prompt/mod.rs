//! Prompt assembly for SQL generation and answer synthesis
//!
//! Every generation request is built here from retrieved schema fragments,
//! the curated few-shot examples, recent conversation turns and, on a repair
//! attempt, the previous failure.

pub mod templates;

use crate::db::QueryOutput;
use crate::schema::SchemaFragment;
use serde::{Deserialize, Serialize};
use templates::*;

/// A curated question to SQL demonstration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub question: String,
    pub sql: String,
}

impl FewShotExample {
    pub fn new(question: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql: sql.into(),
        }
    }
}

/// Built-in examples covering counting, ordering, joins and aggregation
pub fn default_few_shot_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample::new(
            "How many customers are there?",
            "SELECT COUNT(*) AS total_customers FROM customers;",
        ),
        FewShotExample::new(
            "Show all products with their prices",
            "SELECT product_name, list_price, standard_cost, category FROM products ORDER BY list_price DESC;",
        ),
        FewShotExample::new(
            "Which employees processed the most orders?",
            "SELECT e.first_name, e.last_name, COUNT(o.id) AS order_count FROM employees e JOIN orders o ON e.id = o.employee_id GROUP BY e.id, e.first_name, e.last_name ORDER BY order_count DESC;",
        ),
        FewShotExample::new(
            "What are the top 5 customers by total spending?",
            "SELECT c.company, c.first_name || ' ' || c.last_name AS contact_name, SUM(od.quantity * od.unit_price * (1 - od.discount)) AS total_spent FROM customers c JOIN orders o ON c.id = o.customer_id JOIN order_details od ON o.id = od.order_id GROUP BY c.id, c.company, c.first_name, c.last_name ORDER BY total_spent DESC LIMIT 5;",
        ),
        FewShotExample::new(
            "Show orders with customer and employee names",
            "SELECT o.id AS order_id, o.order_date, c.company AS customer, e.first_name || ' ' || e.last_name AS employee, o.shipping_fee FROM orders o LEFT JOIN customers c ON o.customer_id = c.id LEFT JOIN employees e ON o.employee_id = e.id ORDER BY o.order_date DESC;",
        ),
    ]
}

/// Chat message roles understood by OpenAI-compatible providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One earlier question and the answer it received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub question: String,
    pub answer: String,
}

/// Failure carried into a repair attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairContext {
    /// Statement that failed, if one was extracted
    pub failed_sql: Option<String>,
    /// Rejection reason or database error text, verbatim
    pub error: String,
}

/// Everything sent to the generation provider for one attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub system_context: String,
    pub retrieved_fragments: Vec<SchemaFragment>,
    pub few_shot_examples: Vec<FewShotExample>,
    pub conversation_history: Vec<ChatTurn>,
    pub user_question: String,
    pub prior_error: Option<RepairContext>,
}

impl GenerationRequest {
    pub fn is_repair(&self) -> bool {
        self.prior_error.is_some()
    }

    /// Render the request as a chat transcript.
    ///
    /// Layout: one system message (instructions, schema context, examples),
    /// the history as user/assistant pairs, then the question or repair turn.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2 + self.conversation_history.len() * 2);
        messages.push(ChatMessage::system(self.render_system()));

        for turn in &self.conversation_history {
            messages.push(ChatMessage::user(turn.question.clone()));
            messages.push(ChatMessage::assistant(turn.answer.clone()));
        }

        let user = match &self.prior_error {
            Some(repair) => fill(
                REPAIR_TEMPLATE,
                &[
                    ("error", repair.error.as_str()),
                    (
                        "failed_sql",
                        repair.failed_sql.as_deref().unwrap_or(NO_PREVIOUS_SQL),
                    ),
                    ("question", self.user_question.as_str()),
                ],
            ),
            None => fill(USER_TEMPLATE, &[("question", self.user_question.as_str())]),
        };
        messages.push(ChatMessage::user(user));
        messages
    }

    fn render_system(&self) -> String {
        let mut system = String::from(self.system_context.as_str());

        system.push_str("\n\n");
        system.push_str(SCHEMA_CONTEXT_HEADER);
        system.push('\n');
        if self.retrieved_fragments.is_empty() {
            system.push_str("(no schema context retrieved)");
        } else {
            let context: Vec<&str> = self
                .retrieved_fragments
                .iter()
                .map(|f| f.text.as_str())
                .collect();
            system.push_str(&context.join(FRAGMENT_SEPARATOR));
        }

        if !self.few_shot_examples.is_empty() {
            system.push_str("\n\n");
            system.push_str(EXAMPLES_HEADER);
            for example in &self.few_shot_examples {
                system.push_str(&format!(
                    "\n\nQuestion: {}\nSQL: {}",
                    example.question, example.sql
                ));
            }
        }

        system
    }
}

/// Builds generation requests. Pure: the same inputs give the same request.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_context: String,
    few_shot: Vec<FewShotExample>,
    history_turns: usize,
}

impl PromptAssembler {
    /// An empty `few_shot` list selects the built-in examples.
    pub fn new(dialect: &str, few_shot: Vec<FewShotExample>, history_turns: usize) -> Self {
        let few_shot = if few_shot.is_empty() {
            default_few_shot_examples()
        } else {
            few_shot
        };
        Self {
            system_context: fill(SQL_SYSTEM_PROMPT, &[("dialect", dialect)]),
            few_shot,
            history_turns,
        }
    }

    pub fn few_shot(&self) -> &[FewShotExample] {
        &self.few_shot
    }

    pub fn assemble(
        &self,
        question: &str,
        fragments: &[SchemaFragment],
        history: &[ChatTurn],
        prior_error: Option<&RepairContext>,
    ) -> GenerationRequest {
        let skip = history.len().saturating_sub(self.history_turns);
        GenerationRequest {
            system_context: self.system_context.clone(),
            retrieved_fragments: fragments.to_vec(),
            few_shot_examples: self.few_shot.clone(),
            conversation_history: history[skip..].to_vec(),
            user_question: question.trim().to_string(),
            prior_error: prior_error.cloned(),
        }
    }
}

/// Messages asking the provider to summarize an executed query
pub fn answer_messages(
    question: &str,
    sql: &str,
    output: &QueryOutput,
    preview_rows: usize,
) -> Vec<ChatMessage> {
    let results = if output.rows.is_empty() {
        NO_RESULTS.to_string()
    } else {
        let mut text = String::new();
        for row in output.rows.iter().take(preview_rows) {
            text.push_str(&format!("  {}\n", serde_json::Value::Object(row.clone())));
        }
        if output.row_count > preview_rows {
            text.push_str(&format!(
                "  ... and {} more rows\n",
                output.row_count - preview_rows
            ));
        }
        text
    };

    let row_count = output.row_count.to_string();
    let user = fill(
        ANSWER_USER_TEMPLATE,
        &[
            ("question", question),
            ("sql", sql),
            ("row_count", row_count.as_str()),
            ("results", results.as_str()),
        ],
    );

    vec![
        ChatMessage::system(ANSWER_SYSTEM_PROMPT),
        ChatMessage::user(user),
    ]
}

/// Messages asking for follow-up questions
pub fn suggestion_messages(question: &str, answer: &str, max: usize) -> Vec<ChatMessage> {
    let max = max.to_string();
    vec![
        ChatMessage::system(fill(SUGGESTIONS_SYSTEM_PROMPT, &[("max", max.as_str())])),
        ChatMessage::user(fill(
            SUGGESTIONS_USER_TEMPLATE,
            &[("question", question), ("answer", answer)],
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use std::collections::BTreeMap;

    fn fragment(table: &str) -> SchemaFragment {
        SchemaFragment {
            id: SchemaFragment::table_id(table),
            text: format!("Table: {}\nColumns:\n  - id: INTEGER, not null (PRIMARY KEY)", table),
            source_table: table.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    fn assembler() -> PromptAssembler {
        PromptAssembler::new("SQLite", Vec::new(), 2)
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let fragments = vec![fragment("customers"), fragment("orders")];
        let history = vec![ChatTurn {
            question: "How many orders?".to_string(),
            answer: "There are 48 orders.".to_string(),
        }];
        let a = assembler().assemble("Top customers?", &fragments, &history, None);
        let b = assembler().assemble("Top customers?", &fragments, &history, None);
        assert_eq!(a, b);
        assert_eq!(a.to_messages(), b.to_messages());
    }

    #[test]
    fn test_fresh_request_layout() {
        let request = assembler().assemble(
            "  How many customers are there? ",
            &[fragment("customers"), fragment("orders")],
            &[],
            None,
        );
        assert!(!request.is_repair());

        let messages = request.to_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("SQLite database"));
        assert!(messages[0]
            .content
            .contains("Table: customers\nColumns:\n  - id: INTEGER, not null (PRIMARY KEY)\n---\nTable: orders"));
        assert!(messages[0].content.contains("## EXAMPLES:"));
        assert_eq!(
            messages[1].content,
            "Question: How many customers are there?\nSQL:"
        );
    }

    #[test]
    fn test_few_shot_included_in_order_on_every_attempt() {
        let repair = RepairContext {
            failed_sql: Some("SELECT nme FROM customers;".to_string()),
            error: "no such column: nme".to_string(),
        };
        for prior in [None, Some(&repair)] {
            let request = assembler().assemble("q", &[fragment("customers")], &[], prior);
            assert_eq!(request.few_shot_examples, default_few_shot_examples());
            let system = &request.to_messages()[0].content;
            let first = system.find("How many customers are there?").unwrap();
            let last = system.find("Show orders with customer and employee names").unwrap();
            assert!(first < last);
        }
    }

    #[test]
    fn test_repair_quotes_error_and_sql_verbatim() {
        let repair = RepairContext {
            failed_sql: Some("SELECT company_name FROM customers;".to_string()),
            error: "no such column: company_name".to_string(),
        };
        let request = assembler().assemble("List customers", &[], &[], Some(&repair));
        assert!(request.is_repair());

        let messages = request.to_messages();
        let user = &messages.last().unwrap().content;
        assert!(user.contains("failed with the following error:\nno such column: company_name"));
        assert!(user.contains("The failed query was:\nSELECT company_name FROM customers;"));
        assert!(user.ends_with("Question: List customers\nSQL:"));
    }

    #[test]
    fn test_repair_keeps_placeholder_text_verbatim() {
        let repair = RepairContext {
            failed_sql: Some("SELECT '{question}' FROM t;".to_string()),
            error: "near \"{failed_sql}\": syntax error".to_string(),
        };
        let request = assembler().assemble("How many customers?", &[], &[], Some(&repair));

        let messages = request.to_messages();
        let user = &messages.last().unwrap().content;
        assert!(user.contains("error:\nnear \"{failed_sql}\": syntax error\n"));
        assert!(user.contains("The failed query was:\nSELECT '{question}' FROM t;\n"));
        assert!(user.ends_with("Question: How many customers?\nSQL:"));
    }

    #[test]
    fn test_repair_without_sql() {
        let repair = RepairContext {
            failed_sql: None,
            error: "no_sql_extracted".to_string(),
        };
        let request = assembler().assemble("q", &[], &[], Some(&repair));
        let messages = request.to_messages();
        let user = &messages.last().unwrap().content;
        assert!(user.contains(NO_PREVIOUS_SQL));
    }

    #[test]
    fn test_history_is_trimmed_to_recent_turns() {
        let history: Vec<ChatTurn> = (0..5)
            .map(|i| ChatTurn {
                question: format!("q{}", i),
                answer: format!("a{}", i),
            })
            .collect();
        let request = assembler().assemble("next", &[], &history, None);
        assert_eq!(request.conversation_history.len(), 2);
        assert_eq!(request.conversation_history[0].question, "q3");

        let messages = request.to_messages();
        assert_eq!(messages.len(), 6);
        assert_eq!(messages[1], ChatMessage::user("q3"));
        assert_eq!(messages[2], ChatMessage::assistant("a3"));
    }

    #[test]
    fn test_custom_examples_replace_builtin() {
        let custom = vec![FewShotExample::new("Count shippers", "SELECT COUNT(*) FROM shippers;")];
        let assembler = PromptAssembler::new("SQLite", custom.clone(), 0);
        assert_eq!(assembler.few_shot(), custom.as_slice());
    }

    fn output(n: usize) -> QueryOutput {
        let rows: Vec<Map<String, Value>> = (0..n)
            .map(|i| {
                let mut row = Map::new();
                row.insert("id".to_string(), json!(i));
                row
            })
            .collect();
        QueryOutput {
            columns: vec!["id".to_string()],
            row_count: rows.len(),
            rows,
        }
    }

    #[test]
    fn test_answer_messages_preview_and_remainder() {
        let messages = answer_messages("q", "SELECT id FROM t;", &output(25), 20);
        let user = &messages[1].content;
        assert!(user.contains("Query Results (25 rows):"));
        assert!(user.contains("  {\"id\":19}"));
        assert!(!user.contains("{\"id\":20}"));
        assert!(user.contains("... and 5 more rows"));
    }

    #[test]
    fn test_answer_messages_keep_question_braces() {
        let messages = answer_messages("Rows with {sql} in notes?", "SELECT id FROM t;", &output(0), 20);
        assert!(messages[1]
            .content
            .starts_with("User Question: Rows with {sql} in notes?\n"));
        assert!(messages[1].content.contains("SQL Query Executed: SELECT id FROM t;"));
    }

    #[test]
    fn test_answer_messages_empty_results() {
        let messages = answer_messages("q", "SELECT id FROM t;", &output(0), 20);
        assert!(messages[1].content.contains("(No results found)"));
    }
}
