//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends
//! - Local (fastembed), HTTP and feature-hashing backends
//! - Batch processing for efficiency
//!
//! The same embedder must be used to build the index and to embed questions;
//! [`Embedder::model_name`] and [`Embedder::dimension`] form the version tag
//! stored with the index.

#[cfg(feature = "local-embed")]
mod fastembed_impl;
mod hashing;
mod http_backend;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;
pub use hashing::*;
pub use http_backend::*;

use crate::config::{EmbeddingBackendKind, EmbeddingConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use indicatif::ProgressBar;
use std::sync::Arc;

/// Scale a vector to unit length; zero vectors are returned unchanged
pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend_kind()? {
        EmbeddingBackendKind::Http => Ok(Arc::new(HttpEmbedder::new(config)?)),
        EmbeddingBackendKind::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimension))),
        #[cfg(feature = "local-embed")]
        EmbeddingBackendKind::Local => Ok(Arc::new(FastEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embed"))]
        EmbeddingBackendKind::Local => Err(Error::Config(
            "embedding.backend = \"local\" requires the local-embed feature".to_string(),
        )),
    }
}

/// Helper to embed in batches, ticking an optional progress bar per text
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: Vec<String>,
    batch_size: usize,
    progress: Option<&ProgressBar>,
) -> Result<Vec<Vec<f32>>> {
    let mut all_embeddings = Vec::with_capacity(texts.len());

    for chunk in texts.chunks(batch_size.max(1)) {
        let embeddings = embedder.embed(chunk.to_vec()).await?;
        if embeddings.len() != chunk.len() {
            return Err(Error::Embedding(format!(
                "Embedder returned {} vectors for {} inputs",
                embeddings.len(),
                chunk.len()
            )));
        }
        all_embeddings.extend(embeddings);
        if let Some(pb) = progress {
            pb.inc(chunk.len() as u64);
        }
    }

    Ok(all_embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_embedding() {
        let v = normalize_embedding(&[3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(normalize_embedding(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_embed_in_batches_preserves_order() {
        let embedder = HashingEmbedder::new(32);
        let texts: Vec<String> = (0..7).map(|i| format!("table number {}", i)).collect();

        let batched = embed_in_batches(&embedder, texts.clone(), 3, None)
            .await
            .unwrap();
        let single = embedder.embed(texts).await.unwrap();

        assert_eq!(batched.len(), 7);
        assert_eq!(batched, single);
    }

    #[test]
    fn test_create_hashing_embedder() {
        let config = EmbeddingConfig {
            backend: "hashing".to_string(),
            dimension: 64,
            ..Default::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 64);
        assert_eq!(embedder.model_name(), HASHING_MODEL_NAME);
    }
}
