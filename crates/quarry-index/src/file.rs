use crate::hnsw::{HnswIndex, HnswParams, HnswSnapshot};
use crate::{SearchHit, VectorIndex};
use async_trait::async_trait;
use bincode::Options;
use quarry_core::{DocumentId, QuarryConfig, QuarryError, QuarryResult};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Leading bytes of every persisted index file.
const MAGIC: &[u8; 8] = b"QRYHNSW\0";
/// Bumped whenever the snapshot layout changes.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = MAGIC.len() + 4;

/// HNSW index persisted as a single binary snapshot.
///
/// The snapshot holds identifiers and vectors, not graph links: the graph
/// is rebuilt on [`VectorIndex::initialize`], and the file is rewritten on
/// every [`VectorIndex::save`]. Saves go to a sibling
/// temporary file that is renamed over the target, so a crash mid-save
/// leaves the previous snapshot intact.
///
/// Only one process may write a given path at a time.
pub struct FileVectorIndex {
    path: PathBuf,
    dimension: usize,
    params: HnswParams,
    inner: Option<HnswIndex>,
}

impl FileVectorIndex {
    /// Create an uninitialized index bound to `path`.
    ///
    /// Fails with [`QuarryError::InvalidArgument`] for a zero dimension or
    /// parameters rejected by [`HnswParams::validate`].
    pub fn new(
        path: impl Into<PathBuf>,
        dimension: usize,
        params: HnswParams,
    ) -> QuarryResult<Self> {
        if dimension == 0 {
            return Err(QuarryError::InvalidArgument(
                "index dimension must be greater than zero".to_string(),
            ));
        }
        params.validate()?;
        Ok(Self {
            path: path.into(),
            dimension,
            params,
            inner: None,
        })
    }

    /// Create an uninitialized index from the `[index]` section of a config.
    pub fn from_config(config: &QuarryConfig) -> QuarryResult<Self> {
        Self::new(
            config.index_path(),
            config.index.dimension,
            HnswParams::from(&config.index),
        )
    }

    /// File the index loads from and saves to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn require(&self) -> QuarryResult<&HnswIndex> {
        self.inner.as_ref().ok_or(QuarryError::NotInitialized)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

/// Serialize a graph with the file header prepended.
fn encode(index: &HnswIndex) -> QuarryResult<Vec<u8>> {
    let body = bincode::DefaultOptions::new()
        .serialize(&index.to_snapshot())
        .map_err(|e| QuarryError::IndexPersistence(format!("Failed to encode index: {e}")))?;

    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Validate the header and rebuild a graph from file contents.
fn decode(bytes: &[u8]) -> QuarryResult<HnswIndex> {
    if bytes.len() < HEADER_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(QuarryError::IndexPersistence(
            "not a quarry index file (bad magic)".to_string(),
        ));
    }
    let mut version = [0u8; 4];
    version.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
    let version = u32::from_le_bytes(version);
    if version != FORMAT_VERSION {
        return Err(QuarryError::IndexPersistence(format!(
            "unsupported index format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    let body = &bytes[HEADER_LEN..];
    let snapshot: HnswSnapshot = bincode::DefaultOptions::new()
        .with_limit(body.len() as u64)
        .deserialize(body)
        .map_err(|e| QuarryError::IndexPersistence(format!("Failed to decode index: {e}")))?;
    HnswIndex::from_snapshot(snapshot)
}

#[async_trait]
impl VectorIndex for FileVectorIndex {
    async fn initialize(&mut self, capacity: usize) -> QuarryResult<()> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let index = decode(&bytes)?;
                if index.dimension() != self.dimension {
                    return Err(QuarryError::IndexPersistence(format!(
                        "index at {} has dimension {}, configured dimension is {}",
                        self.path.display(),
                        index.dimension(),
                        self.dimension
                    )));
                }
                info!(
                    path = %self.path.display(),
                    count = index.len(),
                    "Loaded vector index"
                );
                self.inner = Some(index);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(
                    path = %self.path.display(),
                    capacity,
                    "No persisted vector index, starting fresh"
                );
                self.inner = Some(HnswIndex::new(self.dimension, capacity, self.params)?);
            }
            Err(e) => {
                return Err(QuarryError::IndexPersistence(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        }
        Ok(())
    }

    fn add_vector(&mut self, id: DocumentId, vector: &[f32]) -> QuarryResult<()> {
        self.inner
            .as_mut()
            .ok_or(QuarryError::NotInitialized)?
            .insert(id, vector)
    }

    fn search(&self, query: &[f32], k: usize) -> QuarryResult<Vec<SearchHit>> {
        self.require()?.search(query, k)
    }

    async fn save(&self) -> QuarryResult<()> {
        let index = self.require()?;
        let bytes = encode(index)?;
        let persistence = |what: &str, e: std::io::Error| {
            QuarryError::IndexPersistence(format!("Failed to {what}: {e}"))
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| persistence("create index directory", e))?;
            }
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| persistence("write index", e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| persistence("replace index file", e))?;

        debug!(
            path = %self.path.display(),
            count = index.len(),
            bytes = bytes.len(),
            "Saved vector index"
        );
        Ok(())
    }

    fn count(&self) -> usize {
        self.inner.as_ref().map(HnswIndex::len).unwrap_or(0)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn index_at(path: PathBuf) -> FileVectorIndex {
        FileVectorIndex::new(path, 3, HnswParams::default()).unwrap()
    }

    #[tokio::test]
    async fn test_operations_before_initialize_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = index_at(tmp.path().join("v.idx"));

        assert!(!index.is_initialized());
        assert_eq!(index.count(), 0);
        assert_eq!(index.dimension(), 3);
        assert!(matches!(
            index.add_vector(1, &[1.0, 0.0, 0.0]),
            Err(QuarryError::NotInitialized)
        ));
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(QuarryError::NotInitialized)
        ));
        assert!(matches!(index.save().await, Err(QuarryError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_without_file_starts_fresh() {
        let tmp = tempfile::tempdir().unwrap();
        let mut index = index_at(tmp.path().join("missing.idx"));
        index.initialize(100).await.unwrap();
        assert!(index.is_initialized());
        assert_eq!(index.count(), 0);
        assert!(index.search(&[1.0, 0.0, 0.0], 3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_persistence_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("v.idx");
        tokio::fs::write(&path, b"definitely not an index").await.unwrap();

        let mut index = index_at(path);
        assert!(matches!(
            index.initialize(10).await,
            Err(QuarryError::IndexPersistence(_))
        ));
        assert!(!index.is_initialized());
    }

    #[tokio::test]
    async fn test_truncated_file_is_persistence_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("v.idx");

        let mut index = index_at(path.clone());
        index.initialize(10).await.unwrap();
        for i in 0..20 {
            index.add_vector(i, &[1.0, i as f32, 0.5]).unwrap();
        }
        index.save().await.unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        tokio::fs::write(&path, &bytes[..bytes.len() / 2]).await.unwrap();

        let mut reloaded = index_at(path);
        assert!(matches!(
            reloaded.initialize(10).await,
            Err(QuarryError::IndexPersistence(_))
        ));
    }

    #[tokio::test]
    async fn test_dimension_disagreement_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("v.idx");

        let mut index = index_at(path.clone());
        index.initialize(10).await.unwrap();
        index.add_vector(1, &[1.0, 0.0, 0.0]).unwrap();
        index.save().await.unwrap();

        let mut wider = FileVectorIndex::new(path, 4, HnswParams::default()).unwrap();
        assert!(matches!(
            wider.initialize(10).await,
            Err(QuarryError::IndexPersistence(_))
        ));
    }

    #[test]
    fn test_invalid_params_rejected_up_front() {
        let params = HnswParams {
            ef_construction: 0,
            ..HnswParams::default()
        };
        assert!(matches!(
            FileVectorIndex::new("v.idx", 3, params),
            Err(QuarryError::InvalidArgument(_))
        ));
        assert!(FileVectorIndex::new("v.idx", 0, HnswParams::default()).is_err());
    }

    #[tokio::test]
    async fn test_replaced_vector_persists_latest_only() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("v.idx");

        let mut index = index_at(path.clone());
        index.initialize(4).await.unwrap();
        index.add_vector(1, &[1.0, 0.0, 0.0]).unwrap();
        index.add_vector(1, &[0.0, 0.0, 1.0]).unwrap();
        index.save().await.unwrap();

        let mut reloaded = index_at(path);
        reloaded.initialize(4).await.unwrap();
        assert_eq!(reloaded.count(), 1);
        let hit = reloaded.search(&[0.0, 0.0, 1.0], 1).unwrap();
        assert_eq!(hit[0].id, 1);
        assert!(hit[0].distance < 1e-6);
    }

    #[tokio::test]
    async fn test_save_creates_parent_and_leaves_no_temp_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("dir").join("v.idx");

        let mut index = index_at(path.clone());
        index.initialize(10).await.unwrap();
        index.add_vector(1, &[0.0, 1.0, 0.0]).unwrap();
        index.save().await.unwrap();

        assert!(path.exists());
        assert!(!index.temp_path().exists());
    }
}
