//! Feature-hashing embedder
//!
//! A deterministic, dependency-free bag-of-words embedder. Useful offline and
//! for small schemas where table and column names overlap question vocabulary.

use super::{normalize_embedding, Embedder};
use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;

/// Model name recorded in the index version tag
pub const HASHING_MODEL_NAME: &str = "querywright/feature-hashing-v1";

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[a-z0-9_]+").expect("static regex"))
}

pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Lowercased word tokens; snake_case identifiers also yield their parts
    /// and a naive singular form so "customers" meets "customer_id".
    pub fn tokens(text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut tokens = Vec::new();
        for m in token_pattern().find_iter(&lower) {
            let word = m.as_str();
            tokens.push(word.to_string());
            if word.contains('_') {
                tokens.extend(
                    word.split('_')
                        .filter(|part| !part.is_empty())
                        .map(str::to_string),
                );
            }
        }
        let singulars: Vec<String> = tokens
            .iter()
            .filter(|t| t.len() > 3 && t.ends_with('s') && !t.ends_with("ss"))
            .map(|t| t[..t.len() - 1].to_string())
            .collect();
        tokens.extend(singulars);
        tokens
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in Self::tokens(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let bucket = u64::from_le_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]) % self.dimension as u64;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket as usize] += sign;
        }
        normalize_embedding(&vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        HASHING_MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_split_identifiers() {
        let tokens = HashingEmbedder::tokens("order_details.Unit_Price, Customers");
        assert!(tokens.contains(&"order_details".to_string()));
        assert!(tokens.contains(&"order".to_string()));
        assert!(tokens.contains(&"unit_price".to_string()));
        assert!(tokens.contains(&"customers".to_string()));
        assert!(tokens.contains(&"customer".to_string()));
    }

    #[test]
    fn test_embedding_is_deterministic_and_unit_length() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed_one("How many customers are there?");
        let b = embedder.embed_one("How many customers are there?");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed_one("  !!  ").iter().all(|v| *v == 0.0));
    }
}
