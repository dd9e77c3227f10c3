//! Process bootstrap
//!
//! Wires configuration into a running engine: database, schema corpus,
//! embedding index (reused from disk when its version tag still matches),
//! retriever and generation client. Everything built here is read-only and
//! shared behind `Arc`s.

use crate::config::Config;
use crate::db::SqliteDatabase;
use crate::embed::{create_embedder, Embedder};
use crate::engine::{Engine, EngineSettings};
use crate::error::Result;
use crate::generate::OpenAiClient;
use crate::index::{EmbeddingIndex, IndexVersion};
use crate::progress::embedding_progress_bar;
use crate::prompt::PromptAssembler;
use crate::retrieve::Retriever;
use crate::schema::SchemaCorpus;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Where the index came from at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrigin {
    Snapshot,
    Built,
}

/// A fully wired engine and the pieces commands inspect
pub struct App {
    pub config: Config,
    pub database: Arc<SqliteDatabase>,
    pub corpus: Arc<SchemaCorpus>,
    pub engine: Arc<Engine>,
    pub index_origin: IndexOrigin,
}

/// Introspect the database and merge the curated corpus file
pub async fn load_corpus(config: &Config, database: &SqliteDatabase) -> Result<SchemaCorpus> {
    let tables = database.introspect(config.database.sample_rows).await?;
    let mut corpus = SchemaCorpus::from_tables(tables, &config.schema.exclude_tables);
    if let Some(path) = &config.schema.corpus_file {
        corpus.load_curated(path)?;
    }
    Ok(corpus)
}

/// Reuse the snapshot when its tag matches, otherwise embed the corpus and save
pub async fn load_or_build_index(
    config: &Config,
    corpus: &SchemaCorpus,
    embedder: &dyn Embedder,
    force_rebuild: bool,
) -> Result<(EmbeddingIndex, IndexOrigin)> {
    let metric = config.retrieval.similarity_metric()?;
    let expected = IndexVersion::new(embedder, metric, corpus.fragments());
    let path = &config.paths.index_file;

    if !force_rebuild {
        match EmbeddingIndex::load(path) {
            Ok(Some(index)) if *index.version() == expected => {
                info!("Reusing index snapshot {}", expected.describe());
                return Ok((index, IndexOrigin::Snapshot));
            }
            Ok(Some(index)) => {
                info!(
                    "Index snapshot is stale ({} vs {}), rebuilding",
                    index.version().describe(),
                    expected.describe()
                );
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable index snapshot {:?}: {}", path, e),
        }
    }

    let bar = embedding_progress_bar(corpus.fragments().len() as u64);
    let built = EmbeddingIndex::build_with_progress(
        corpus.fragments(),
        embedder,
        metric,
        config.embedding.batch_size,
        Some(&bar),
    )
    .await;
    bar.finish_and_clear();
    let index = built?;

    if let Err(e) = index.save(path) {
        warn!("Could not save index snapshot: {}", e);
    }
    Ok((index, IndexOrigin::Built))
}

/// Database, corpus and retriever: everything short of generation
pub struct SchemaStack {
    pub database: Arc<SqliteDatabase>,
    pub corpus: SchemaCorpus,
    pub retriever: Retriever,
    pub index_origin: IndexOrigin,
}

/// Connect, introspect and load or build the index
pub async fn open_schema(config: &Config, force_reindex: bool) -> Result<SchemaStack> {
    let database = Arc::new(SqliteDatabase::connect(&config.database).await?);
    let corpus = load_corpus(config, &database).await?;

    let embedder = create_embedder(&config.embedding)?;
    let (index, index_origin) =
        load_or_build_index(config, &corpus, embedder.as_ref(), force_reindex).await?;
    let retriever = Retriever::new(Arc::new(index), embedder)?;

    Ok(SchemaStack {
        database,
        corpus,
        retriever,
        index_origin,
    })
}

impl App {
    pub async fn start(config: Config, force_reindex: bool) -> Result<Self> {
        let SchemaStack {
            database,
            corpus,
            retriever,
            index_origin,
        } = open_schema(&config, force_reindex).await?;

        if config.generation.api_key().is_none() {
            warn!(
                "{} is not set; provider requests will be sent without an API key",
                config.generation.api_key_env
            );
        }
        let generator = Arc::new(OpenAiClient::new(&config.generation, &config.engine)?);

        let engine = Engine::new(
            Arc::new(retriever),
            PromptAssembler::new(
                &config.engine.dialect,
                config.few_shot.clone(),
                config.engine.history_turns,
            ),
            generator,
            database.clone(),
            EngineSettings::from_config(&config),
        );

        info!(
            "Ready: {} tables, {} fragments, model {}",
            corpus.stats().table_count,
            corpus.fragments().len(),
            engine.generation_model()
        );

        Ok(Self {
            config,
            database,
            corpus: Arc::new(corpus),
            engine: Arc::new(engine),
            index_origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use crate::schema::SchemaFragment;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn corpus(texts: &[&str]) -> SchemaCorpus {
        SchemaCorpus::from_fragments(
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| SchemaFragment {
                    id: format!("table_t{}", i),
                    text: text.to_string(),
                    source_table: format!("t{}", i),
                    metadata: BTreeMap::new(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.init_paths(Some(dir.path().to_path_buf()));
        config
    }

    #[tokio::test]
    async fn test_snapshot_reused_only_when_tag_matches() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let embedder = HashingEmbedder::new(32);
        let original = corpus(&["Table: a", "Table: b"]);

        let (_, origin) = load_or_build_index(&config, &original, &embedder, false)
            .await
            .unwrap();
        assert_eq!(origin, IndexOrigin::Built);
        assert!(config.paths.index_file.exists());

        let (_, origin) = load_or_build_index(&config, &original, &embedder, false)
            .await
            .unwrap();
        assert_eq!(origin, IndexOrigin::Snapshot);

        let changed = corpus(&["Table: a", "Table: b2"]);
        let (index, origin) = load_or_build_index(&config, &changed, &embedder, false)
            .await
            .unwrap();
        assert_eq!(origin, IndexOrigin::Built);
        assert_eq!(index.entries()[1].fragment.text, "Table: b2");

        let other_model = HashingEmbedder::new(64);
        let (_, origin) = load_or_build_index(&config, &changed, &other_model, false)
            .await
            .unwrap();
        assert_eq!(origin, IndexOrigin::Built);

        let (_, origin) = load_or_build_index(&config, &changed, &other_model, true)
            .await
            .unwrap();
        assert_eq!(origin, IndexOrigin::Built);
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        std::fs::write(&config.paths.index_file, "not json").unwrap();

        let embedder = HashingEmbedder::new(16);
        let (_, origin) = load_or_build_index(&config, &corpus(&["Table: a"]), &embedder, false)
            .await
            .unwrap();
        assert_eq!(origin, IndexOrigin::Built);
    }
}
