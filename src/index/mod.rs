//! Embedding index over schema fragments
//!
//! An exact, in-memory nearest-neighbour index. The corpus is small (one
//! fragment per table plus curated notes), so a flat scan is both exact and
//! deterministic. Results are ordered by descending score, ties broken by
//! fragment id ascending.
//!
//! Every index carries an [`IndexVersion`]: the embedding model, dimension,
//! metric and a fingerprint of the corpus. Queries must be embedded by the
//! same model; the retriever asserts this before searching.

use crate::embed::{embed_in_batches, normalize_embedding, Embedder};
use crate::error::{Error, Result};
use crate::schema::SchemaFragment;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Similarity metric used for search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Inner product of L2-normalized vectors
    Cosine,
    /// Raw inner product
    InnerProduct,
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimilarityMetric::Cosine => write!(f, "cosine"),
            SimilarityMetric::InnerProduct => write!(f, "inner_product"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(SimilarityMetric::Cosine),
            "inner_product" | "ip" | "dot" => Ok(SimilarityMetric::InnerProduct),
            _ => Err(Error::Config(format!("Unknown similarity metric: {}", s))),
        }
    }
}

impl SimilarityMetric {
    fn prepare(&self, vector: &[f32]) -> Vec<f32> {
        match self {
            SimilarityMetric::Cosine => normalize_embedding(vector),
            SimilarityMetric::InnerProduct => vector.to_vec(),
        }
    }
}

/// Version tag stored alongside the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexVersion {
    pub model: String,
    pub dimension: usize,
    pub metric: SimilarityMetric,
    pub corpus_fingerprint: String,
}

impl IndexVersion {
    pub fn new(embedder: &dyn Embedder, metric: SimilarityMetric, fragments: &[SchemaFragment]) -> Self {
        Self {
            model: embedder.model_name().to_string(),
            dimension: embedder.dimension(),
            metric,
            corpus_fingerprint: corpus_fingerprint(fragments),
        }
    }

    /// Whether queries embedded by `embedder` live in this index's space
    pub fn matches_embedder(&self, embedder: &dyn Embedder) -> bool {
        self.model == embedder.model_name() && self.dimension == embedder.dimension()
    }

    pub fn describe(&self) -> String {
        format!("{} ({}d, {})", self.model, self.dimension, self.metric)
    }
}

/// blake3 digest over fragment ids and texts, in corpus order
pub fn corpus_fingerprint(fragments: &[SchemaFragment]) -> String {
    let mut hasher = blake3::Hasher::new();
    for fragment in fragments {
        hasher.update(fragment.id.as_bytes());
        hasher.update(&[0]);
        hasher.update(fragment.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

/// One fragment with its vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fragment: SchemaFragment,
    pub vector: Vec<f32>,
}

/// A search hit
#[derive(Debug, Clone, Serialize)]
pub struct ScoredFragment {
    pub fragment: SchemaFragment,
    pub score: f32,
}

/// Read-only index over the schema corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    version: IndexVersion,
    entries: Vec<IndexEntry>,
}

impl EmbeddingIndex {
    /// Embed every fragment and build the index
    pub async fn build(
        fragments: &[SchemaFragment],
        embedder: &dyn Embedder,
        metric: SimilarityMetric,
        batch_size: usize,
    ) -> Result<Self> {
        Self::build_with_progress(fragments, embedder, metric, batch_size, None).await
    }

    pub async fn build_with_progress(
        fragments: &[SchemaFragment],
        embedder: &dyn Embedder,
        metric: SimilarityMetric,
        batch_size: usize,
        progress: Option<&ProgressBar>,
    ) -> Result<Self> {
        if fragments.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        info!(
            "Indexing {} schema fragments with {}",
            fragments.len(),
            embedder.model_name()
        );

        let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
        let vectors = embed_in_batches(embedder, texts, batch_size, progress).await?;

        let version = IndexVersion::new(embedder, metric, fragments);
        let entries = fragments
            .iter()
            .cloned()
            .zip(vectors)
            .map(|(fragment, vector)| IndexEntry { fragment, vector })
            .collect();

        Self::from_entries(version, entries)
    }

    /// Assemble an index from already-embedded entries
    pub fn from_entries(version: IndexVersion, entries: Vec<IndexEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::EmptyCorpus);
        }

        let mut seen = HashSet::with_capacity(entries.len());
        let mut prepared = Vec::with_capacity(entries.len());
        for entry in entries {
            if !seen.insert(entry.fragment.id.clone()) {
                return Err(Error::DuplicateFragment(entry.fragment.id));
            }
            if entry.vector.len() != version.dimension {
                return Err(Error::Embedding(format!(
                    "Fragment '{}' has a {}-d vector, index expects {}",
                    entry.fragment.id,
                    entry.vector.len(),
                    version.dimension
                )));
            }
            prepared.push(IndexEntry {
                vector: version.metric.prepare(&entry.vector),
                fragment: entry.fragment,
            });
        }

        Ok(Self {
            version,
            entries: prepared,
        })
    }

    pub fn version(&self) -> &IndexVersion {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Top-k fragments by descending similarity (ties: id ascending)
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredFragment>> {
        if k == 0 {
            return Err(Error::InvalidK(k));
        }
        if query.len() != self.version.dimension {
            return Err(Error::Embedding(format!(
                "Query vector has {} dimensions, index expects {}",
                query.len(),
                self.version.dimension
            )));
        }

        let query = self.version.metric.prepare(query);
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (dot(&query, &entry.vector), entry))
            .collect();

        scored.sort_by(|(sa, a), (sb, b)| {
            sb.total_cmp(sa)
                .then_with(|| a.fragment.id.cmp(&b.fragment.id))
        });
        scored.truncate(k);

        debug!("Index search returned {} hits", scored.len());

        Ok(scored
            .into_iter()
            .map(|(score, entry)| ScoredFragment {
                fragment: entry.fragment.clone(),
                score,
            })
            .collect())
    }

    /// Persist the index (with its version tag) as JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        info!("Saved index snapshot to {:?}", path);
        Ok(())
    }

    /// Load a snapshot; `None` if the file is missing
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        let snapshot: EmbeddingIndex = serde_json::from_str(&content)?;
        // Re-run invariant checks on whatever was on disk
        let index = Self::from_entries(snapshot.version, snapshot.entries)?;
        Ok(Some(index))
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
