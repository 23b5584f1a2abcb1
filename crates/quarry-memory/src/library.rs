use crate::algebra::{closest_named_vectors, vector_algebra, VectorOperation};
use crate::chunker::Chunker;
use crate::embedding::{provider_from_config, EmbeddingProvider};
use crate::fusion::fuse;
use crate::store::{DocumentStore, NamedVectorStore, SqliteStore};
use crate::usage::UsageTracker;
use quarry_core::{
    Document, DocumentId, NamedVector, NewDocument, QuarryConfig, QuarryError, QuarryResult,
};
use quarry_index::{FileVectorIndex, VectorIndex};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// A document returned by a search, with its relevance score.
///
/// The score is a similarity in `[0, 1]` for semantic and concept searches
/// and the fused score for hybrid search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// The matching document or chunk.
    pub document: Document,
    /// Relevance; higher is better.
    pub score: f32,
}

/// Ingests documents and answers semantic, keyword, hybrid and concept
/// queries by composing a document store, a named-vector store, an
/// embedding provider and a vector index.
///
/// Vector ids in the index are document ids. Steps that touch both the
/// store and the index are not transactional: a failure part-way through
/// [`Library::add_document`] leaves already-persisted chunks without
/// vectors, and [`Library::delete_document`] leaves the vector behind as a
/// stale entry that searches skip.
pub struct Library {
    documents: Arc<dyn DocumentStore>,
    concepts: Arc<dyn NamedVectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index: RwLock<Box<dyn VectorIndex>>,
    chunker: Chunker,
    default_limit: usize,
    usage: Arc<UsageTracker>,
}

impl Library {
    /// Fails with [`QuarryError::DimensionMismatch`] if the embedder and the
    /// index disagree on dimension.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        concepts: Arc<dyn NamedVectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Box<dyn VectorIndex>,
        chunker: Chunker,
    ) -> QuarryResult<Self> {
        quarry_core::ensure_dimension(index.dimension(), embedder.dimension())?;
        Ok(Self {
            documents,
            concepts,
            embedder,
            index: RwLock::new(index),
            chunker,
            default_limit: 10,
            usage: Arc::new(UsageTracker::new()),
        })
    }

    /// Result count used when a search passes `None`.
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Share `usage` with the caller. Only affects reporting; providers
    /// record into whatever tracker they were built with.
    pub fn with_usage(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = usage;
        self
    }

    /// Assemble a library from configuration: a SQLite database under
    /// `data_dir`, the configured embedding provider, and the persisted
    /// index (loaded if present).
    pub async fn open(config: &QuarryConfig) -> QuarryResult<Self> {
        config.validate()?;

        let store = Arc::new(SqliteStore::open(config.data_dir.join("quarry.db"))?);
        let usage = Arc::new(UsageTracker::new());
        let embedder = provider_from_config(&config.embedding, Arc::clone(&usage));

        let mut index = FileVectorIndex::from_config(config)?;
        index.initialize(config.index.capacity).await?;
        info!(
            data_dir = %config.data_dir.display(),
            vectors = index.count(),
            "Opened library"
        );

        let documents: Arc<dyn DocumentStore> = store.clone();
        let concepts: Arc<dyn NamedVectorStore> = store;
        Ok(Self::new(
            documents,
            concepts,
            embedder,
            Box::new(index),
            Chunker::from_config(&config.chunking)?,
        )?
        .with_default_limit(config.search.default_limit)
        .with_usage(usage))
    }

    /// Result count used when a search passes `None`.
    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Embedding usage recorded since the library was opened.
    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    /// The underlying document store.
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Number of vectors in the index, stale ones included.
    pub async fn vector_count(&self) -> usize {
        self.index.read().await.count()
    }

    /// Chunk `content`, persist every chunk, embed them, and index the
    /// vectors. Returns the chunk document ids in order.
    ///
    /// Each chunk carries `chunk_index`, `total_chunks` and (when given)
    /// `source` metadata. Blank content stores nothing.
    pub async fn add_document(
        &self,
        content: &str,
        source: Option<&str>,
    ) -> QuarryResult<Vec<DocumentId>> {
        let chunks = self.chunker.chunk(content);
        if chunks.is_empty() {
            debug!("Skipping blank document");
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let mut doc = NewDocument::new(chunk.content.clone())
                .with_metadata("chunk_index", serde_json::json!(chunk.index))
                .with_metadata("total_chunks", serde_json::json!(chunk.total));
            if let Some(source) = source {
                doc = doc
                    .with_source(source)
                    .with_metadata("source", serde_json::json!(source));
            }
            ids.push(self.documents.persist(doc).await?);
        }

        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != ids.len() {
            return Err(QuarryError::Provider(format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                ids.len()
            )));
        }

        let mut index = self.index.write().await;
        for (id, vector) in ids.iter().zip(&vectors) {
            index.add_vector(*id, vector)?;
        }
        drop(index);

        info!(
            source = source.unwrap_or("-"),
            chunks = ids.len(),
            "Added document"
        );
        Ok(ids)
    }

    /// Nearest documents to `query` by embedding similarity.
    pub async fn semantic_search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> QuarryResult<Vec<SearchResult>> {
        let vector = self.embedder.embed(query).await?;
        self.search_by_vector(&vector, limit).await
    }

    /// Nearest documents to an arbitrary vector. Hits whose document no
    /// longer exists are skipped, so fewer than `limit` results may come
    /// back.
    pub async fn search_by_vector(
        &self,
        vector: &[f32],
        limit: Option<usize>,
    ) -> QuarryResult<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.default_limit);
        let hits = self.index.read().await.search(vector, limit)?;

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.documents.fetch(hit.id).await? {
                Some(document) => results.push(SearchResult {
                    document,
                    score: 1.0 - hit.distance,
                }),
                None => debug!(id = hit.id, "Skipping stale vector hit"),
            }
        }
        Ok(results)
    }

    /// Documents matching `query` lexically, best first.
    pub async fn keyword_search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> QuarryResult<Vec<Document>> {
        self.documents
            .lexical_search(query, limit.unwrap_or(self.default_limit))
            .await
    }

    /// Keyword and semantic results merged with [`fuse`].
    pub async fn hybrid_search(
        &self,
        query: &str,
        limit: Option<usize>,
    ) -> QuarryResult<Vec<SearchResult>> {
        let limit = limit.unwrap_or(self.default_limit);
        let lexical = self.keyword_search(query, Some(limit)).await?;
        let semantic = self.semantic_search(query, Some(limit)).await?;

        let lexical_ids: Vec<DocumentId> = lexical.iter().map(|d| d.id).collect();
        let semantic_hits: Vec<(DocumentId, f32)> = semantic
            .iter()
            .map(|r| (r.document.id, r.score))
            .collect();

        let mut by_id: HashMap<DocumentId, Document> = HashMap::new();
        for document in lexical
            .into_iter()
            .chain(semantic.into_iter().map(|r| r.document))
        {
            by_id.entry(document.id).or_insert(document);
        }

        Ok(fuse(&lexical_ids, &semantic_hits, limit)
            .into_iter()
            .filter_map(|hit| {
                by_id.remove(&hit.id).map(|document| SearchResult {
                    document,
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Embed `text` and store it as the concept `handle`, replacing any
    /// previous vector under that handle.
    pub async fn save_concept(
        &self,
        handle: &str,
        text: &str,
        description: Option<&str>,
    ) -> QuarryResult<NamedVector> {
        if handle.trim().is_empty() {
            return Err(QuarryError::InvalidArgument(
                "concept handle must not be empty".to_string(),
            ));
        }
        let embedding = self.embedder.embed(text).await?;
        let named = NamedVector::new(handle, embedding, description.map(str::to_string));
        self.concepts.save_vector(named.clone()).await?;
        debug!(handle, "Saved concept");
        Ok(named)
    }

    /// Remove the concept `handle`. Returns `false` if it did not exist.
    pub async fn delete_concept(&self, handle: &str) -> QuarryResult<bool> {
        self.concepts.delete_vector(handle).await
    }

    /// Every stored concept, ordered by handle.
    pub async fn list_concepts(&self) -> QuarryResult<Vec<NamedVector>> {
        self.concepts.list_vectors().await
    }

    /// Evaluate `operations` with [`vector_algebra`] and search with the
    /// resulting vector.
    pub async fn concept_search(
        &self,
        operations: &[VectorOperation],
        limit: Option<usize>,
    ) -> QuarryResult<Vec<SearchResult>> {
        let vector = vector_algebra(self.concepts.as_ref(), operations).await?;
        self.search_by_vector(&vector, limit).await
    }

    /// Stored concepts most similar to the embedding of `text`.
    pub async fn closest_concepts(
        &self,
        text: &str,
        limit: usize,
    ) -> QuarryResult<Vec<(NamedVector, f32)>> {
        let vector = self.embedder.embed(text).await?;
        closest_named_vectors(self.concepts.as_ref(), &vector, limit).await
    }

    /// Remove a document from the store. Its vector stays in the index.
    pub async fn delete_document(&self, id: DocumentId) -> QuarryResult<bool> {
        self.documents.delete(id).await
    }

    /// Persist the vector index now.
    pub async fn save_index(&self) -> QuarryResult<()> {
        self.index.read().await.save().await
    }

    /// Save the index and release resources. A failed save is logged, not
    /// returned.
    pub async fn close(self) {
        if let Err(e) = self.save_index().await {
            error!(error = %e, "Failed to save vector index on close");
        }
        let usage = self.usage.snapshot();
        info!(
            embedding_requests = usage.requests,
            total_tokens = usage.total_tokens,
            "Closed library"
        );
    }
}
