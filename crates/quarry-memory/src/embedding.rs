use crate::http::HttpEmbedding;
use crate::retry::RetryingEmbedder;
use crate::usage::UsageTracker;
use async_trait::async_trait;
use quarry_core::{EmbeddingConfig, EmbeddingProviderKind, QuarryError, QuarryResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Converts text into fixed-dimension vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> QuarryResult<Vec<f32>>;

    /// Embed several texts. The output is in input order.
    async fn embed_batch(&self, texts: &[&str]) -> QuarryResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Length of every vector this provider returns.
    fn dimension(&self) -> usize;
}

/// Offline hashed bag-of-words embedding.
///
/// Each term is hashed (FNV-1a) into three buckets with decreasing weights,
/// scaled by its relative frequency, and the result is L2-normalized. Texts
/// sharing vocabulary land close together, which is enough for tests and
/// air-gapped use.
#[derive(Debug, Clone, Copy)]
pub struct LocalEmbedding {
    dimension: usize,
}

const BUCKET_WEIGHTS: [f32; 3] = [1.0, 0.7, 0.5];

impl LocalEmbedding {
    /// Embedder producing vectors of length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        if self.dimension == 0 {
            return Err(QuarryError::InvalidArgument(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if text.trim().is_empty() {
            return Err(QuarryError::InvalidArgument(
                "cannot embed empty text".to_string(),
            ));
        }

        let terms = crate::bm25::tokenize(text);
        let mut vector = vec![0.0f32; self.dimension];
        if terms.is_empty() {
            return Ok(vector);
        }

        let mut counts: HashMap<&str, f32> = HashMap::new();
        for term in &terms {
            *counts.entry(term.as_str()).or_insert(0.0) += 1.0;
        }

        let total = terms.len() as f32;
        for (term, count) in counts {
            let tf = count / total;
            for (salt, weight) in BUCKET_WEIGHTS.iter().enumerate() {
                let bucket = fnv1a(term.as_bytes(), salt as u8) as usize % self.dimension;
                vector[bucket] += tf * weight;
            }
        }

        Ok(crate::algebra::normalize(&vector))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the provider selected by `[embedding]`.
///
/// Remote providers are wrapped in a [`crate::RetryingEmbedder`] using the
/// configured retry policy and report token usage into `usage`.
pub fn provider_from_config(
    config: &EmbeddingConfig,
    usage: Arc<UsageTracker>,
) -> Arc<dyn EmbeddingProvider> {
    match config.provider {
        EmbeddingProviderKind::Local => Arc::new(LocalEmbedding::new(config.dimension)),
        EmbeddingProviderKind::OpenAi => {
            let http: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbedding::new(config, usage));
            Arc::new(RetryingEmbedder::new(http, config.retry_policy))
        }
    }
}

/// FNV-1a over `data` followed by a salt byte (salt 0 hashes `data` alone).
fn fnv1a(data: &[u8], salt: u8) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    let mut feed = |byte: u8| {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    };
    data.iter().copied().for_each(&mut feed);
    if salt > 0 {
        feed(salt);
    }
    hash
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::algebra::{cosine_similarity, magnitude};

    #[tokio::test]
    async fn test_local_embedding_shape_and_norm() {
        let emb = LocalEmbedding::new(64);
        let v = emb.embed("vectors live in an index").await.unwrap();
        assert_eq!(v.len(), 64);
        assert!((magnitude(&v) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_local_embedding_shared_vocabulary_is_closer() {
        let emb = LocalEmbedding::default();
        let a = emb.embed("approximate nearest neighbor search").await.unwrap();
        let b = emb.embed("nearest neighbor search over vectors").await.unwrap();
        let c = emb.embed("baking sourdough bread at home").await.unwrap();

        let ab = cosine_similarity(&a, &b).unwrap();
        let ac = cosine_similarity(&a, &c).unwrap();
        assert!(ab > ac, "sim(a,b)={ab} should exceed sim(a,c)={ac}");
    }

    #[tokio::test]
    async fn test_local_embedding_is_deterministic() {
        let emb = LocalEmbedding::default();
        assert_eq!(
            emb.embed("same input").await.unwrap(),
            emb.embed("same input").await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let emb = LocalEmbedding::default();
        assert!(matches!(
            emb.embed("   ").await,
            Err(QuarryError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_text_without_terms_is_zero_vector() {
        let emb = LocalEmbedding::new(8);
        assert_eq!(emb.embed("? !").await.unwrap(), vec![0.0; 8]);
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let emb = LocalEmbedding::new(32);
        let batch = emb.embed_batch(&["first text", "second text"]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], emb.embed("first text").await.unwrap());
        assert_eq!(batch[1], emb.embed("second text").await.unwrap());
    }

    #[test]
    fn test_provider_from_config() {
        let usage = Arc::new(UsageTracker::new());
        let local = EmbeddingConfig {
            provider: EmbeddingProviderKind::Local,
            dimension: 48,
            ..EmbeddingConfig::default()
        };
        assert_eq!(provider_from_config(&local, Arc::clone(&usage)).dimension(), 48);

        let remote = EmbeddingConfig {
            provider: EmbeddingProviderKind::OpenAi,
            dimension: 1536,
            ..EmbeddingConfig::default()
        };
        assert_eq!(provider_from_config(&remote, usage).dimension(), 1536);
    }

    #[test]
    fn test_fnv1a_known_value() {
        // FNV-1a 32-bit of "a".
        assert_eq!(fnv1a(b"a", 0), 0xe40c_292c);
        assert_ne!(fnv1a(b"a", 1), fnv1a(b"a", 2));
    }
}
