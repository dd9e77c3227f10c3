//! querywright: ask a relational database questions in plain language.
//!
//! The pipeline retrieves the schema fragments relevant to a question,
//! assembles a generation request, asks a language model for SQL, checks the
//! SQL with a read-only guard, executes it and repairs failures within a fixed
//! retry budget. Successful results are summarized into a natural-language
//! answer with follow-up suggestions.

pub mod app;
pub mod commands;
pub mod config;
pub mod db;
pub mod embed;
pub mod embedding_backend;
pub mod engine;
pub mod error;
pub mod generate;
pub mod guard;
pub mod index;
pub mod mcp;
pub mod progress;
pub mod prompt;
pub mod retrieve;
pub mod schema;
