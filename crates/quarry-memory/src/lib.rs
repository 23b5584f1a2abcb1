//! Document ingestion and retrieval on top of the quarry vector index.
//!
//! Splits documents into boundary-aware chunks, embeds them, and answers
//! semantic, keyword, hybrid and concept-algebra queries.
//!
//! # Main types
//!
//! - [`Library`] — Orchestrates stores, embedder and index.
//! - [`Chunker`] — Overlapping, boundary-aware document splitter.
//! - [`fuse`] — Fixed-weight merge of lexical and semantic hits.
//! - [`vector_algebra`] — Weighted, stepwise combination of named vectors.
//! - [`EmbeddingProvider`] — Text to vector; [`LocalEmbedding`],
//!   [`HttpEmbedding`] and [`RetryingEmbedder`] implement it.
//! - [`DocumentStore`] / [`NamedVectorStore`] — Storage seams, implemented
//!   by [`InMemoryStore`] and [`SqliteStore`].

/// Vector arithmetic and named-vector algebra.
pub mod algebra;
/// BM25 keyword ranking.
pub mod bm25;
/// Document chunking.
pub mod chunker;
/// Embedding provider trait and offline implementation.
pub mod embedding;
/// Lexical and semantic result fusion.
pub mod fusion;
/// OpenAI-compatible embeddings client.
pub mod http;
/// Ingestion and search orchestration.
pub mod library;
/// Retry with exponential backoff for embedding providers.
pub mod retry;
/// Document and named-vector stores.
pub mod store;
/// Token usage accounting.
pub mod usage;

pub use algebra::{closest_named_vectors, vector_algebra, Op, VectorOperation};
pub use bm25::Bm25Index;
pub use chunker::{chunk_document, Chunk, Chunker};
pub use embedding::{provider_from_config, EmbeddingProvider, LocalEmbedding};
pub use fusion::{fuse, FusedHit};
pub use http::HttpEmbedding;
pub use library::{Library, SearchResult};
pub use retry::{is_retryable, RetryingEmbedder};
pub use store::{DocumentStore, InMemoryStore, NamedVectorStore, SqliteStore};
pub use usage::{UsageSnapshot, UsageTracker};
