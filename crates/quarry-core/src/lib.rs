//! Core types, configuration, and error definitions for Quarry.
//!
//! This crate provides the foundational types shared across all Quarry crates:
//! error handling, stored document representations, named concept vectors,
//! and the TOML configuration model.
//!
//! # Main types
//!
//! - [`QuarryError`] — Unified error enum for all Quarry subsystems.
//! - [`QuarryResult`] — Convenience alias for `Result<T, QuarryError>`.
//! - [`Document`] — A stored text document (or chunk) with metadata.
//! - [`NewDocument`] — The input accepted by a document store.
//! - [`NamedVector`] — An embedding addressable by a unique handle.
//! - [`QuarryConfig`] — Workspace configuration loaded from TOML.

/// Configuration model and TOML loading.
pub mod config;
/// Error types.
pub mod error;

pub use config::{
    ChunkingConfig, EmbeddingConfig, EmbeddingProviderKind, IndexConfig, QuarryConfig,
    RetryPolicy, SearchConfig,
};
pub use error::{ensure_dimension, QuarryError, QuarryResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Integer identifier assigned to a document by the document store and
/// shared with the vector index.
pub type DocumentId = i64;

// --- Document types ---

/// A document held by a document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier assigned by the store.
    pub id: DocumentId,
    /// The textual content.
    pub content: String,
    /// Arbitrary key-value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Where the content came from (file path, URL, ...), if known.
    #[serde(default)]
    pub source: Option<String>,
    /// UTC timestamp of when the document was persisted.
    pub created_at: DateTime<Utc>,
}

/// A document that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    /// The textual content.
    pub content: String,
    /// Arbitrary key-value metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Where the content came from, if known.
    #[serde(default)]
    pub source: Option<String>,
}

impl NewDocument {
    /// Creates a document with the given content and no metadata or source.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: HashMap::new(),
            source: None,
        }
    }

    /// Sets the source. Chainable builder method.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Adds one metadata entry. Chainable builder method.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Materializes the stored form under the given identifier.
    pub fn into_document(self, id: DocumentId) -> Document {
        Document {
            id,
            content: self.content,
            metadata: self.metadata,
            source: self.source,
            created_at: Utc::now(),
        }
    }
}

// --- Named vectors ---

/// A reusable concept embedding addressable by a unique handle.
///
/// Saving under an existing handle replaces the previous vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedVector {
    /// Unique handle (e.g. `"optimism"`).
    pub handle: String,
    /// The embedding.
    pub embedding: Vec<f32>,
    /// Optional human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// UTC timestamp of the last save.
    pub updated_at: DateTime<Utc>,
}

impl NamedVector {
    /// Creates a named vector stamped with the current time.
    pub fn new(
        handle: impl Into<String>,
        embedding: Vec<f32>,
        description: Option<String>,
    ) -> Self {
        Self {
            handle: handle.into(),
            embedding,
            description,
            updated_at: Utc::now(),
        }
    }
}
