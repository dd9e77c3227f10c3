//! MCP stdio server implementation

use super::tools::{get_tool_definitions, handle_tool_call, ToolContext};
use super::types::{
    ErrorCode, McpError, McpMessage, McpNotification, McpRequest, McpResponse,
};
use crate::engine::Engine;
use crate::schema::SchemaCorpus;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// MCP server exposing the engine as tools. One request at a time per stream.
pub struct McpServer {
    context: ToolContext,
}

impl McpServer {
    pub fn new(engine: Arc<Engine>, corpus: Arc<SchemaCorpus>) -> Self {
        Self {
            context: ToolContext { engine, corpus },
        }
    }

    /// Serve on the process's stdin/stdout
    pub async fn run(&self) -> Result<(), McpError> {
        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    /// Serve newline-delimited JSON-RPC until the reader closes
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<(), McpError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server starting on stdio");
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if let Some(reply) = self.handle_line(&line).await {
                debug!("Sending: {}", reply);
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        info!("MCP server shutting down");
        Ok(())
    }

    /// Process one line; `None` when nothing should be written back
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        debug!("Received: {}", line);

        let response = match serde_json::from_str::<McpMessage>(line) {
            Ok(McpMessage::Request(request)) => self.handle_request(request).await,
            Ok(McpMessage::Notification(notification)) => {
                self.handle_notification(notification);
                return None;
            }
            Ok(McpMessage::Response(response)) => {
                warn!(
                    "Ignoring unexpected response message (id {})",
                    response.id.unwrap_or(serde_json::Value::Null)
                );
                return None;
            }
            Err(e) => {
                error!("Failed to parse message: {}", e);
                McpResponse::error(
                    None,
                    McpError::new(ErrorCode::ParseError, format!("Parse error: {}", e)),
                )
            }
        };

        match serde_json::to_string(&response) {
            Ok(reply) => Some(reply),
            Err(e) => {
                error!("Failed to encode response: {}", e);
                None
            }
        }
    }

    async fn handle_request(&self, request: McpRequest) -> McpResponse {
        let id = request.id.clone();

        if request.jsonrpc != "2.0" {
            return McpResponse::error(
                id,
                McpError::new(ErrorCode::InvalidRequest, "jsonrpc must be \"2.0\""),
            );
        }

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "ping" => McpResponse::success(id, json!({})),
            "tools/list" => McpResponse::success(id, json!({ "tools": get_tool_definitions() })),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "resources/list" => McpResponse::success(id, json!({ "resources": [] })),
            "prompts/list" => McpResponse::success(id, json!({ "prompts": [] })),
            other => McpResponse::error(id, McpError::method_not_found(other)),
        }
    }

    fn handle_notification(&self, notification: McpNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => info!("Client initialized"),
            "notifications/cancelled" => info!("Request cancelled"),
            other => debug!("Unknown notification: {}", other),
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> McpResponse {
        McpResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false },
                    "resources": { "subscribe": false, "listChanged": false },
                    "prompts": { "listChanged": false }
                },
                "serverInfo": {
                    "name": "querywright",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }),
        )
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> McpResponse {
        let Some(params) = params else {
            return McpResponse::error(id, McpError::invalid_params("Missing params"));
        };

        let Some(name) = params.get("name").and_then(|v| v.as_str()) else {
            return McpResponse::error(id, McpError::invalid_params("Missing tool name"));
        };

        let arguments: HashMap<String, Value> = match params.get("arguments") {
            None | Some(Value::Null) => HashMap::new(),
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(arguments) => arguments,
                Err(e) => {
                    return McpResponse::error(
                        id,
                        McpError::invalid_params(format!("Invalid arguments: {}", e)),
                    )
                }
            },
        };

        debug!("Calling tool: {} with args: {:?}", name, arguments);
        let result = handle_tool_call(name, &arguments, &self.context).await;

        match serde_json::to_value(&result) {
            Ok(value) => McpResponse::success(id, value),
            Err(e) => McpResponse::error(id, McpError::new(ErrorCode::InternalError, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, QueryOutput};
    use crate::embed::HashingEmbedder;
    use crate::engine::EngineSettings;
    use crate::error::{Error, Result};
    use crate::generate::{GenerationClient, GenerationResult};
    use crate::index::{EmbeddingIndex, SimilarityMetric};
    use crate::prompt::{GenerationRequest, PromptAssembler};
    use crate::retrieve::Retriever;
    use crate::schema::{ColumnInfo, TableInfo};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::time::Duration;

    struct FixedGenerator;

    #[async_trait]
    impl GenerationClient for FixedGenerator {
        async fn generate_sql(&self, _request: &GenerationRequest) -> Result<GenerationResult> {
            Ok(GenerationResult::from_raw(
                "```sql\nSELECT COUNT(*) AS n FROM customers;\n```".to_string(),
            ))
        }

        async fn generate_answer(&self, _q: &str, _sql: &str, _output: &QueryOutput) -> Result<String> {
            Ok("There are 91 customers.".to_string())
        }

        async fn generate_suggestions(&self, _q: &str, _a: &str) -> Result<Vec<String>> {
            Ok(vec!["Which country has the most customers?".to_string()])
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct CountDatabase;

    #[async_trait]
    impl Database for CountDatabase {
        async fn execute(&self, sql: &str) -> Result<QueryOutput> {
            if !sql.contains("customers") {
                return Err(Error::Execution("no such table".to_string()));
            }
            let mut row = Map::new();
            row.insert("n".to_string(), json!(91));
            Ok(QueryOutput {
                columns: vec!["n".to_string()],
                rows: vec![row],
                row_count: 1,
            })
        }
    }

    fn table(name: &str) -> TableInfo {
        TableInfo {
            name: name.to_string(),
            row_count: 91,
            columns: vec![ColumnInfo {
                name: "id".to_string(),
                data_type: "INTEGER".to_string(),
                nullable: false,
                primary_key: true,
            }],
            foreign_keys: Vec::new(),
            sample_rows: Vec::new(),
        }
    }

    async fn server() -> McpServer {
        let corpus = SchemaCorpus::from_tables(vec![table("customers"), table("orders")], &[]);
        let embedder = Arc::new(HashingEmbedder::new(64));
        let index = EmbeddingIndex::build(corpus.fragments(), embedder.as_ref(), SimilarityMetric::Cosine, 8)
            .await
            .unwrap();
        let retriever = Retriever::new(Arc::new(index), embedder).unwrap();
        let engine = Engine::new(
            Arc::new(retriever),
            PromptAssembler::new("SQLite", Vec::new(), 6),
            Arc::new(FixedGenerator),
            Arc::new(CountDatabase),
            EngineSettings {
                max_retries: 2,
                top_k: 2,
                generation_timeout: Duration::from_secs(5),
                execution_timeout: Duration::from_secs(5),
                max_suggestions: 3,
            },
        );
        McpServer::new(Arc::new(engine), Arc::new(corpus))
    }

    async fn call(server: &McpServer, request: Value) -> Value {
        let reply = server.handle_line(&request.to_string()).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    fn tool_text(response: &Value) -> String {
        response["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_initialize_and_list_tools() {
        let server = server().await;
        let init = call(&server, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})).await;
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["serverInfo"]["name"], "querywright");

        let list = call(&server, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        let names: Vec<&str> = list["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["ask_database", "list_tables", "describe_table", "validate_sql"]);
    }

    #[tokio::test]
    async fn test_notifications_get_no_reply() {
        let server = server().await;
        let reply = server
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
        assert!(server.handle_line("   ").await.is_none());
    }

    #[tokio::test]
    async fn test_client_responses_are_ignored() {
        let server = server().await;
        let reply = server
            .handle_line(r#"{"jsonrpc":"2.0","id":9,"result":{}}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server().await;
        let parse: Value = serde_json::from_str(&server.handle_line("{not json").await.unwrap()).unwrap();
        assert_eq!(parse["error"]["code"], -32700);
        assert!(parse["id"].is_null());

        let unknown = call(&server, json!({"jsonrpc": "2.0", "id": 3, "method": "nope"})).await;
        assert_eq!(unknown["error"]["code"], -32601);

        let missing = call(&server, json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call"})).await;
        assert_eq!(missing["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_ask_database_tool() {
        let server = server().await;
        let response = call(
            &server,
            json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "ask_database", "arguments": {"question": "How many customers are there?"}}
            }),
        )
        .await;
        assert_eq!(response["result"]["isError"], false);

        let body: Value = serde_json::from_str(&tool_text(&response)).unwrap();
        assert_eq!(body["answer"], "There are 91 customers.");
        assert_eq!(body["sql"], "SELECT COUNT(*) AS n FROM customers;");
        assert_eq!(body["results"]["rows"][0]["n"], 91);
        assert!(body["error"].is_null());
    }

    #[tokio::test]
    async fn test_schema_and_guard_tools() {
        let server = server().await;

        let tables = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call", "params": {"name": "list_tables"}}),
        )
        .await;
        let tables: Value = serde_json::from_str(&tool_text(&tables)).unwrap();
        assert_eq!(tables.as_array().unwrap().len(), 2);

        let described = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call",
                   "params": {"name": "describe_table", "arguments": {"table": "Orders"}}}),
        )
        .await;
        assert!(tool_text(&described).starts_with("Table: orders"));

        let missing = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call",
                   "params": {"name": "describe_table", "arguments": {"table": "suppliers"}}}),
        )
        .await;
        assert_eq!(missing["result"]["isError"], true);

        let checked = call(
            &server,
            json!({"jsonrpc": "2.0", "id": 9, "method": "tools/call",
                   "params": {"name": "validate_sql", "arguments": {"sql": "DELETE FROM orders"}}}),
        )
        .await;
        let verdict: Value = serde_json::from_str(&tool_text(&checked)).unwrap();
        assert_eq!(verdict["verdict"], "rejected");
    }

    #[tokio::test]
    async fn test_serve_over_streams() {
        let server = server().await;
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n"
        );
        let mut output = Vec::new();
        server.serve(input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        let reply: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(reply["id"], 1);
    }
}
