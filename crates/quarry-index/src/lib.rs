//! Approximate nearest-neighbor vector index for Quarry.
//!
//! Maps integer document identifiers to fixed-dimension embeddings and
//! answers k-nearest-neighbor queries under cosine distance. Recall is
//! approximate by construction: large indexes trade exactness for speed.
//!
//! # Main types
//!
//! - [`VectorIndex`] — Trait for index backends (initialize/add/search/save).
//! - [`HnswIndex`] — In-memory HNSW graph (via `hnsw_rs`) with replace-on-insert.
//! - [`FileVectorIndex`] — `HnswIndex` persisted as a binary snapshot on disk.
//! - [`SearchHit`] — An `(id, distance)` pair returned by a search.
//!
//! # Stale entries
//!
//! There is no removal API. Deleting a document from the document store
//! leaves its vector in the index, so search hits may reference identifiers
//! that no longer resolve. Callers skip such hits.

/// Cosine distance helpers.
pub mod distance;
/// Disk-backed index with snapshot persistence.
pub mod file;
/// In-memory HNSW index over `hnsw_rs`.
pub mod hnsw;

pub use distance::{cosine_distance, magnitude, normalized};
pub use file::FileVectorIndex;
pub use hnsw::{HnswIndex, HnswParams};

use async_trait::async_trait;
use quarry_core::{DocumentId, QuarryResult};
use serde::{Deserialize, Serialize};

/// A single nearest-neighbor result.
///
/// `distance` is cosine distance (`1 - cosine_similarity`, in `[0, 2]`).
/// Converting to a similarity is the caller's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Identifier the vector was added under.
    pub id: DocumentId,
    /// Cosine distance from the query.
    pub distance: f32,
}

/// Trait for vector index backends.
///
/// Mutating operations take `&mut self`: an index has no internal locking,
/// so sharing one between tasks requires an external lock.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Load the persisted index if one exists, otherwise start a fresh one
    /// sized for `capacity` entries. Must be called before any other
    /// operation.
    async fn initialize(&mut self, capacity: usize) -> QuarryResult<()>;

    /// Insert `vector` under `id`, replacing any vector already stored there.
    fn add_vector(&mut self, id: DocumentId, vector: &[f32]) -> QuarryResult<()>;

    /// Return up to `k` hits ordered by ascending distance. An empty index
    /// yields an empty result, not an error.
    fn search(&self, query: &[f32], k: usize) -> QuarryResult<Vec<SearchHit>>;

    /// Persist the full index state, overwriting any previous save.
    async fn save(&self) -> QuarryResult<()>;

    /// Number of live entries (0 before initialization).
    fn count(&self) -> usize;

    /// Configured vector dimension.
    fn dimension(&self) -> usize;

    /// Whether [`VectorIndex::initialize`] has completed.
    fn is_initialized(&self) -> bool;
}
