//! Default values for configuration

/// Default database URL (SQLite file in the working directory)
pub fn default_database_url() -> String {
    std::env::var("QUERYWRIGHT_DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://northwind.db".to_string())
}

/// Default connection pool size
pub fn default_database_max_connections() -> u32 {
    5
}

/// Default time to wait for a pooled connection
pub fn default_database_acquire_timeout() -> u64 {
    5
}

/// Default per-query execution timeout
pub fn default_database_query_timeout() -> u64 {
    30
}

/// Default LIMIT appended to queries that have none
pub fn default_database_row_limit() -> usize {
    50
}

/// Default number of sample rows captured per table
pub fn default_database_sample_rows() -> usize {
    3
}

/// Default embedding backend kind
pub fn default_embedding_backend() -> String {
    if cfg!(feature = "local-embed") {
        "local".to_string()
    } else {
        "hashing".to_string()
    }
}

/// Default embedding model (same model the schema index was designed around)
pub fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

/// Default embedding dimension
pub fn default_embedding_dimension() -> usize {
    384
}

/// Default batch size for embedding
pub fn default_embedding_batch_size() -> usize {
    32
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("QUERYWRIGHT_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default number of schema fragments retrieved per question
pub fn default_retrieval_top_k() -> usize {
    5
}

/// Default similarity metric
pub fn default_retrieval_metric() -> String {
    "cosine".to_string()
}

/// Default OpenAI-compatible provider URL (Groq)
pub fn default_generation_base_url() -> String {
    std::env::var("QUERYWRIGHT_GENERATION_URL")
        .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string())
}

/// Default generation model
pub fn default_generation_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

/// Default environment variable holding the provider API key
pub fn default_generation_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

/// Default provider request timeout in seconds
pub fn default_generation_timeout() -> u64 {
    30
}

/// Low temperature keeps SQL output stable
pub fn default_sql_temperature() -> f32 {
    0.1
}

/// Default temperature for answers and suggestions
pub fn default_answer_temperature() -> f32 {
    0.5
}

/// Default token cap for SQL generation
pub fn default_generation_max_tokens() -> u32 {
    1024
}

/// Default token cap for answers
pub fn default_answer_max_tokens() -> u32 {
    512
}

/// Default client-side request rate (0 = unlimited)
pub fn default_requests_per_minute() -> u32 {
    0
}

/// Default number of repair attempts after the first generation
pub fn default_engine_max_retries() -> u32 {
    2
}

/// Default number of conversation turns passed to the prompt
pub fn default_engine_history_turns() -> usize {
    6
}

/// Default number of follow-up suggestions
pub fn default_engine_max_suggestions() -> usize {
    3
}

/// Default number of result rows shown to the answer model
pub fn default_engine_answer_preview_rows() -> usize {
    20
}

/// Default SQL dialect named in the system prompt
pub fn default_engine_dialect() -> String {
    "SQLite".to_string()
}
