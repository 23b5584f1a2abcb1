use super::{DocumentStore, NamedVectorStore};
use crate::bm25::Bm25Index;
use async_trait::async_trait;
use parking_lot::RwLock;
use quarry_core::{Document, DocumentId, NamedVector, NewDocument, QuarryResult};
use std::collections::BTreeMap;

#[derive(Default)]
struct Inner {
    documents: BTreeMap<DocumentId, Document>,
    bm25: Bm25Index,
    last_id: DocumentId,
    vectors: BTreeMap<String, NamedVector>,
}

/// Process-local store. Keyword search is ranked with BM25.
///
/// Nothing is persisted; everything is lost on drop.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn persist(&self, document: NewDocument) -> QuarryResult<DocumentId> {
        let mut inner = self.inner.write();
        inner.last_id += 1;
        let id = inner.last_id;
        inner.bm25.insert(id, &document.content);
        inner.documents.insert(id, document.into_document(id));
        Ok(id)
    }

    async fn fetch(&self, id: DocumentId) -> QuarryResult<Option<Document>> {
        Ok(self.inner.read().documents.get(&id).cloned())
    }

    async fn delete(&self, id: DocumentId) -> QuarryResult<bool> {
        let mut inner = self.inner.write();
        inner.bm25.remove(id);
        Ok(inner.documents.remove(&id).is_some())
    }

    async fn lexical_search(&self, query: &str, limit: usize) -> QuarryResult<Vec<Document>> {
        let inner = self.inner.read();
        Ok(inner
            .bm25
            .search(query, limit)
            .into_iter()
            .filter_map(|(id, _)| inner.documents.get(&id).cloned())
            .collect())
    }

    async fn count(&self) -> QuarryResult<usize> {
        Ok(self.inner.read().documents.len())
    }
}

#[async_trait]
impl NamedVectorStore for InMemoryStore {
    async fn save_vector(&self, vector: NamedVector) -> QuarryResult<()> {
        self.inner
            .write()
            .vectors
            .insert(vector.handle.clone(), vector);
        Ok(())
    }

    async fn get_vector(&self, handle: &str) -> QuarryResult<Option<NamedVector>> {
        Ok(self.inner.read().vectors.get(handle).cloned())
    }

    async fn delete_vector(&self, handle: &str) -> QuarryResult<bool> {
        Ok(self.inner.write().vectors.remove(handle).is_some())
    }

    async fn list_vectors(&self) -> QuarryResult<Vec<NamedVector>> {
        Ok(self.inner.read().vectors.values().cloned().collect())
    }
}
