//! Status command implementation

use crate::app::load_corpus;
use crate::config::Config;
use crate::db::{Database, SqliteDatabase};
use crate::error::Result;
use crate::index::{corpus_fingerprint, EmbeddingIndex, IndexVersion};
use crate::schema::CorpusStats;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Index snapshot state relative to the live schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub path: String,
    pub version: Option<IndexVersion>,
    pub entries: usize,
    /// None when the corpus could not be read
    pub current: Option<bool>,
}

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub database_url: String,
    pub database_connected: bool,
    pub database_error: Option<String>,
    pub generation_model: String,
    pub generation_base_url: String,
    pub api_key_set: bool,
    pub embedding_backend: String,
    pub embedding_model: String,
    pub index: IndexStatus,
    pub corpus: Option<CorpusStats>,
}

/// Get system status. Never builds the index.
pub async fn cmd_status(config: &Config) -> Result<StatusInfo> {
    info!("Getting status");

    let (database_error, corpus) = match SqliteDatabase::connect(&config.database).await {
        Ok(db) => match db.ping().await {
            Ok(()) => match load_corpus(config, &db).await {
                Ok(corpus) => (None, Some(corpus)),
                Err(e) => {
                    debug!("Introspection error: {:?}", e);
                    (None, None)
                }
            },
            Err(e) => (Some(e.to_string()), None),
        },
        Err(e) => (Some(e.to_string()), None),
    };

    let snapshot = match EmbeddingIndex::load(&config.paths.index_file) {
        Ok(index) => index,
        Err(e) => {
            debug!("Index snapshot error: {:?}", e);
            None
        }
    };
    let version = snapshot.as_ref().map(|index| index.version().clone());
    let current = match (&version, &corpus) {
        (Some(version), Some(corpus)) => {
            Some(version.corpus_fingerprint == corpus_fingerprint(corpus.fragments()))
        }
        (None, _) => Some(false),
        (Some(_), None) => None,
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        database_url: config.database.url.clone(),
        database_connected: database_error.is_none(),
        database_error,
        generation_model: config.generation.model.clone(),
        generation_base_url: config.generation.base_url.clone(),
        api_key_set: config.generation.api_key().is_some(),
        embedding_backend: config.embedding.backend.clone(),
        embedding_model: config.embedding.model.clone(),
        index: IndexStatus {
            path: config.paths.index_file.display().to_string(),
            entries: snapshot.as_ref().map(|index| index.len()).unwrap_or(0),
            version,
            current,
        },
        corpus: corpus.map(|c| c.stats()),
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 querywright Status\n");
    println!("Configuration: {}", status.config_path);

    println!("\nDatabase:");
    println!("  URL: {}", status.database_url);
    match &status.database_error {
        None => println!("  Status: ✓ Connected"),
        Some(e) => println!("  Status: ✗ Not connected ({})", e),
    }
    if let Some(stats) = &status.corpus {
        println!("  Tables: {}", stats.table_count);
        println!("  Total rows: {}", stats.total_rows);
        println!("  Total columns: {}", stats.total_columns);
        println!("  Schema fragments: {}", stats.fragment_count);
    }

    println!("\nGeneration:");
    println!("  Model: {}", status.generation_model);
    println!("  Endpoint: {}", status.generation_base_url);
    println!(
        "  API key: {}",
        if status.api_key_set { "✓ set" } else { "⚠ not set" }
    );

    println!(
        "\nEmbedding Model: {} ({})",
        status.embedding_model, status.embedding_backend
    );

    println!("\nIndex:");
    println!("  Path: {}", status.index.path);
    match &status.index.version {
        Some(version) => {
            println!("  Version: {}", version.describe());
            println!("  Fingerprint: {}", version.corpus_fingerprint);
            println!("  Entries: {}", status.index.entries);
        }
        None => println!("  Version: none (run 'querywright index' to build)"),
    }
    let state = match status.index.current {
        Some(true) => "✓ Up to date",
        Some(false) => "⚠ Stale or missing (rebuilt on next start)",
        None => "? Unknown (database unavailable)",
    };
    println!("  Status: {}", state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_status_without_database_or_index() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(dir.path().to_path_buf()));
        config.database.url = format!(
            "sqlite://{}",
            dir.path().join("missing.db").display()
        );

        let status = cmd_status(&config).await.unwrap();
        assert!(!status.database_connected);
        assert!(status.database_error.is_some());
        assert!(status.corpus.is_none());
        assert!(status.index.version.is_none());
        assert_eq!(status.index.current, Some(false));
    }
}
