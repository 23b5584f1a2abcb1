//! Document and named-vector storage.
//!
//! The [`DocumentStore`] and [`NamedVectorStore`] traits are the seams the
//! [`crate::Library`] composes over. Two backends implement both:
//! [`InMemoryStore`] for tests and ephemeral use, and [`SqliteStore`] for
//! a durable single-file database.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use quarry_core::{Document, DocumentId, NamedVector, NewDocument, QuarryResult};

/// Persistent document storage with keyword search.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a document and return its newly assigned id. Ids are never
    /// reused.
    async fn persist(&self, document: NewDocument) -> QuarryResult<DocumentId>;

    /// The document stored under `id`, if any.
    async fn fetch(&self, id: DocumentId) -> QuarryResult<Option<Document>>;

    /// Returns `true` if a document was removed.
    async fn delete(&self, id: DocumentId) -> QuarryResult<bool>;

    /// Documents matching `query`, most relevant first. Callers should rely
    /// on the order only; no score is exposed.
    async fn lexical_search(&self, query: &str, limit: usize) -> QuarryResult<Vec<Document>>;

    /// Number of stored documents.
    async fn count(&self) -> QuarryResult<usize>;
}

/// Storage for concept vectors addressed by handle.
#[async_trait]
pub trait NamedVectorStore: Send + Sync {
    /// Insert or replace the vector under `vector.handle`.
    async fn save_vector(&self, vector: NamedVector) -> QuarryResult<()>;

    /// The vector saved under `handle`, if any.
    async fn get_vector(&self, handle: &str) -> QuarryResult<Option<NamedVector>>;

    /// Returns `true` if a vector was removed.
    async fn delete_vector(&self, handle: &str) -> QuarryResult<bool>;

    /// All stored vectors, ordered by handle.
    async fn list_vectors(&self) -> QuarryResult<Vec<NamedVector>>;
}
