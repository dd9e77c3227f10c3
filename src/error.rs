//! Custom error types for querywright

use thiserror::Error;

/// Main error type for querywright operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Cannot build an index from an empty schema corpus")]
    EmptyCorpus,

    #[error("Duplicate schema fragment id: {0}")]
    DuplicateFragment(String),

    #[error("Invalid k: {0} (must be at least 1)")]
    InvalidK(usize),

    #[error("Index was built with {indexed}, but the active embedder is {active}")]
    IndexVersionMismatch { indexed: String, active: String },

    #[error("Schema retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    #[error("Generation provider unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'querywright init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("MCP protocol error: {0}")]
    McpProtocol(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for querywright
pub type Result<T> = std::result::Result<T, Error>;
