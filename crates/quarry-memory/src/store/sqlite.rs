use super::{DocumentStore, NamedVectorStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use quarry_core::{Document, DocumentId, NamedVector, NewDocument, QuarryError, QuarryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    source TEXT,
    created_at TEXT NOT NULL
);
CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
    content,
    tokenize='unicode61'
);
CREATE TABLE IF NOT EXISTS named_vectors (
    handle TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    description TEXT,
    updated_at TEXT NOT NULL
);
";

fn store_err(e: rusqlite::Error) -> QuarryError {
    QuarryError::Store(e.to_string())
}

/// SQLite-backed store.
///
/// Documents live in a regular table mirrored into an FTS5 index keyed by
/// rowid; keyword search orders by `bm25()` and falls back to a substring
/// `LIKE` scan when the full-text query matches nothing. Named vectors are
/// stored as little-endian `f32` blobs.
///
/// Calls run on the caller's task while holding the connection lock.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> QuarryResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(store_err)?;
        debug!(path = %path.display(), "Opened document store");
        Self::with_connection(conn)
    }

    /// Private in-memory database, dropped with the store.
    pub fn open_in_memory() -> QuarryResult<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(store_err)?)
    }

    fn with_connection(conn: Connection) -> QuarryResult<Self> {
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn fts_search(conn: &Connection, query: &str, limit: usize) -> QuarryResult<Vec<Document>> {
        let Some(expr) = fts_expression(query) else {
            return Ok(Vec::new());
        };
        let mut stmt = conn
            .prepare(
                "SELECT d.id, d.content, d.metadata, d.source, d.created_at
                 FROM documents_fts f
                 JOIN documents d ON d.id = f.rowid
                 WHERE documents_fts MATCH ?1
                 ORDER BY bm25(documents_fts), d.id
                 LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![expr, limit as i64], RawDocument::from_row)
            .map_err(store_err)?;
        collect_documents(rows)
    }

    fn like_search(conn: &Connection, query: &str, limit: usize) -> QuarryResult<Vec<Document>> {
        let needle = query.trim();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let escaped = needle
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let mut stmt = conn
            .prepare(
                "SELECT id, content, metadata, source, created_at
                 FROM documents
                 WHERE content LIKE ?1 ESCAPE '\\'
                 ORDER BY id DESC
                 LIMIT ?2",
            )
            .map_err(store_err)?;
        let rows = stmt
            .query_map(params![format!("%{escaped}%"), limit as i64], RawDocument::from_row)
            .map_err(store_err)?;
        collect_documents(rows)
    }
}

/// OR of the quoted alphanumeric terms in `query`, or `None` if it has none.
fn fts_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" OR "))
}

struct RawDocument {
    id: DocumentId,
    content: String,
    metadata: String,
    source: Option<String>,
    created_at: String,
}

impl RawDocument {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            content: row.get(1)?,
            metadata: row.get(2)?,
            source: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_document(self) -> QuarryResult<Document> {
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_str(&self.metadata)?;
        Ok(Document {
            id: self.id,
            content: self.content,
            metadata,
            source: self.source,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn collect_documents(
    rows: impl Iterator<Item = rusqlite::Result<RawDocument>>,
) -> QuarryResult<Vec<Document>> {
    rows.map(|r| r.map_err(store_err)?.into_document())
        .collect()
}

fn parse_timestamp(s: &str) -> QuarryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| QuarryError::Store(format!("bad timestamp '{s}': {e}")))
}

fn encode_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> QuarryResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(QuarryError::Store(format!(
            "vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

type NamedRow = (String, Vec<u8>, Option<String>, String);

fn named_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NamedRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_named((handle, blob, description, updated_at): NamedRow) -> QuarryResult<NamedVector> {
    Ok(NamedVector {
        handle,
        embedding: decode_vector(&blob)?,
        description,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn persist(&self, document: NewDocument) -> QuarryResult<DocumentId> {
        let metadata = serde_json::to_string(&document.metadata)?;
        let created_at = Utc::now().to_rfc3339();

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute(
            "INSERT INTO documents (content, metadata, source, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![document.content, metadata, document.source, created_at],
        )
        .map_err(store_err)?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO documents_fts (rowid, content) VALUES (?1, ?2)",
            params![id, document.content],
        )
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(id)
    }

    async fn fetch(&self, id: DocumentId) -> QuarryResult<Option<Document>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, content, metadata, source, created_at FROM documents WHERE id = ?1",
            params![id],
            RawDocument::from_row,
        )
        .optional()
        .map_err(store_err)?
        .map(RawDocument::into_document)
        .transpose()
    }

    async fn delete(&self, id: DocumentId) -> QuarryResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(store_err)?;
        let removed = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![id])
            .map_err(store_err)?;
        tx.execute("DELETE FROM documents_fts WHERE rowid = ?1", params![id])
            .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn lexical_search(&self, query: &str, limit: usize) -> QuarryResult<Vec<Document>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let hits = Self::fts_search(&conn, query, limit)?;
        if !hits.is_empty() {
            return Ok(hits);
        }
        debug!(query, "No full-text matches, falling back to LIKE");
        Self::like_search(&conn, query, limit)
    }

    async fn count(&self) -> QuarryResult<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |r| r.get(0))
            .map_err(store_err)?;
        Ok(n as usize)
    }
}

#[async_trait]
impl NamedVectorStore for SqliteStore {
    async fn save_vector(&self, vector: NamedVector) -> QuarryResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO named_vectors (handle, embedding, description, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                vector.handle,
                encode_vector(&vector.embedding),
                vector.description,
                vector.updated_at.to_rfc3339(),
            ],
        )
        .map_err(store_err)?;
        Ok(())
    }

    async fn get_vector(&self, handle: &str) -> QuarryResult<Option<NamedVector>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT handle, embedding, description, updated_at FROM named_vectors WHERE handle = ?1",
            params![handle],
            named_from_row,
        )
        .optional()
        .map_err(store_err)?
        .map(into_named)
        .transpose()
    }

    async fn delete_vector(&self, handle: &str) -> QuarryResult<bool> {
        let conn = self.conn.lock();
        let removed = conn
            .execute("DELETE FROM named_vectors WHERE handle = ?1", params![handle])
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    async fn list_vectors(&self) -> QuarryResult<Vec<NamedVector>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT handle, embedding, description, updated_at FROM named_vectors ORDER BY handle",
            )
            .map_err(store_err)?;
        let rows = stmt.query_map([], named_from_row).map_err(store_err)?;
        let vectors = rows
            .map(|r| into_named(r.map_err(store_err)?))
            .collect::<QuarryResult<Vec<_>>>()?;
        Ok(vectors)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fts_expression() {
        assert_eq!(
            fts_expression("rust: borrow-checker!").as_deref(),
            Some("\"rust\" OR \"borrow\" OR \"checker\"")
        );
        assert_eq!(fts_expression("  ?? "), None);
    }

    #[test]
    fn test_vector_blob_round_trip_and_corruption() {
        let v = vec![1.5, -0.25, 0.0, f32::MIN_POSITIVE];
        assert_eq!(decode_vector(&encode_vector(&v)).unwrap(), v);
        assert!(matches!(decode_vector(&[0, 1, 2]), Err(QuarryError::Store(_))));
    }

    #[tokio::test]
    async fn test_persist_and_fetch_with_metadata() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .persist(
                NewDocument::new("chunk text")
                    .with_source("notes.md")
                    .with_metadata("chunk_index", json!(2)),
            )
            .await
            .unwrap();

        let doc = store.fetch(id).await.unwrap().unwrap();
        assert_eq!(doc.content, "chunk text");
        assert_eq!(doc.source.as_deref(), Some("notes.md"));
        assert_eq!(doc.metadata["chunk_index"], json!(2));
        assert!(store.fetch(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fts_ranking_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        let strong = store
            .persist(NewDocument::new("vector index vector search vector"))
            .await
            .unwrap();
        let weak = store
            .persist(NewDocument::new("a long note that mentions a vector once among many other words"))
            .await
            .unwrap();
        store
            .persist(NewDocument::new("nothing relevant here"))
            .await
            .unwrap();

        let ids: Vec<DocumentId> = store
            .lexical_search("vector", 10)
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![strong, weak]);

        assert!(store.delete(strong).await.unwrap());
        assert!(!store.delete(strong).await.unwrap());
        let ids: Vec<DocumentId> = store
            .lexical_search("vector", 10)
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![weak]);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_like_fallback_for_partial_words() {
        let store = SqliteStore::open_in_memory().unwrap();
        let id = store
            .persist(NewDocument::new("approximate nearest neighbours"))
            .await
            .unwrap();

        let hits = store.lexical_search("neighb", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert!(store.lexical_search("100%", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_named_vectors_persist_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("db").join("quarry.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .save_vector(NamedVector::new("calm", vec![0.25, -1.0, 3.5], Some("quiet".into())))
                .await
                .unwrap();
            store
                .save_vector(NamedVector::new("calm", vec![1.0, 0.0, 0.0], None))
                .await
                .unwrap();
            store
                .save_vector(NamedVector::new("alert", vec![0.0, 1.0, 0.0], None))
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let calm = store.get_vector("calm").await.unwrap().unwrap();
        assert_eq!(calm.embedding, vec![1.0, 0.0, 0.0]);
        assert!(calm.description.is_none());

        let handles: Vec<String> = store
            .list_vectors()
            .await
            .unwrap()
            .into_iter()
            .map(|v| v.handle)
            .collect();
        assert_eq!(handles, vec!["alert", "calm"]);

        assert!(store.delete_vector("alert").await.unwrap());
        assert!(store.get_vector("alert").await.unwrap().is_none());
    }
}
