//! Schema retrieval for a question

use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::index::{EmbeddingIndex, ScoredFragment};
use crate::schema::SchemaFragment;
use std::sync::Arc;
use tracing::debug;

/// Embeds questions and looks up the most relevant schema fragments.
///
/// Shared read-only across concurrent questions.
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    /// Pair an index with the embedder used for queries.
    ///
    /// Fails if the embedder is not the one the index was built with.
    pub fn new(index: Arc<EmbeddingIndex>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if !index.version().matches_embedder(embedder.as_ref()) {
            return Err(Error::IndexVersionMismatch {
                indexed: index.version().describe(),
                active: format!("{} ({}d)", embedder.model_name(), embedder.dimension()),
            });
        }
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Top-k fragments with their similarity scores
    pub async fn retrieve_scored(&self, question: &str, k: usize) -> Result<Vec<ScoredFragment>> {
        if k == 0 {
            return Err(Error::InvalidK(k));
        }

        let vectors = self
            .embedder
            .embed(vec![question.to_string()])
            .await
            .map_err(|e| Error::RetrievalUnavailable(e.to_string()))?;
        let query = vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::RetrievalUnavailable("No embedding returned".to_string()))?;

        let hits = self
            .index
            .search(&query, k)
            .map_err(|e| Error::RetrievalUnavailable(e.to_string()))?;
        debug!(
            "Retrieved {:?}",
            hits.iter().map(|h| h.fragment.id.as_str()).collect::<Vec<_>>()
        );
        Ok(hits)
    }

    /// Top-k fragments, most relevant first
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<Vec<SchemaFragment>> {
        Ok(self
            .retrieve_scored(question, k)
            .await?
            .into_iter()
            .map(|hit| hit.fragment)
            .collect())
    }
}
