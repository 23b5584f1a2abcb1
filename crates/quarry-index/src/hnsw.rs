use crate::distance::{cosine_distance, normalized};
use crate::SearchHit;
use hnsw_rs::prelude::*;
use quarry_core::{ensure_dimension, DocumentId, IndexConfig, QuarryError, QuarryResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Layer cap handed to hnsw_rs, which never builds more than 16 layers.
const MAX_LAYER: usize = 16;

/// HNSW construction and query parameters.
///
/// - **m**: links kept per node on upper layers; layer 0 keeps `2 * m`.
/// - **ef_construction**: candidate list size while linking a new node.
/// - **ef_search**: candidate list size at query time (raised to `k` when
///   a query asks for more results).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Links per node on upper layers.
    pub m: usize,
    /// Candidate list size during insertion.
    pub ef_construction: usize,
    /// Candidate list size during search.
    pub ef_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
        }
    }
}

impl From<&IndexConfig> for HnswParams {
    fn from(config: &IndexConfig) -> Self {
        Self {
            m: config.m,
            ef_construction: config.ef_construction,
            ef_search: config.ef_search,
        }
    }
}

impl HnswParams {
    /// Rejects parameters that would leave new nodes unlinked or make
    /// searches come back empty.
    pub fn validate(&self) -> QuarryResult<()> {
        if self.m < 2 {
            return Err(QuarryError::InvalidArgument(format!(
                "m must be at least 2, got {}",
                self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(QuarryError::InvalidArgument(
                "ef_construction must be greater than zero".to_string(),
            ));
        }
        if self.ef_search == 0 {
            return Err(QuarryError::InvalidArgument(
                "ef_search must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Cosine distance for vectors normalized before insertion. A zero vector
/// sits at distance 1.0 from everything.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnitCosine;

impl Distance<f32> for UnitCosine {
    fn eval(&self, va: &[f32], vb: &[f32]) -> f32 {
        cosine_distance(va, vb)
    }
}

/// A vector handed to the graph. Its position in the log is its hnsw_rs
/// data id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub(crate) id: DocumentId,
    /// Unit-length copy of the inserted vector.
    pub(crate) vector: Vec<f32>,
}

/// Serializable form of an [`HnswIndex`]. The graph itself is not stored;
/// it is rebuilt from `entries` on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HnswSnapshot {
    pub(crate) dimension: usize,
    pub(crate) capacity: usize,
    pub(crate) params: HnswParams,
    /// Live entries in insertion order.
    pub(crate) entries: Vec<Entry>,
}

/// Hierarchical Navigable Small World index over cosine distance, backed by
/// `hnsw_rs`.
///
/// Vectors are normalized on insertion, so distance reduces to
/// `1 - dot(a, b)`. hnsw_rs has no update or delete, so re-adding an
/// identifier inserts a fresh point and retires the old one; retired points
/// are filtered from results and dropped the next time the graph is rebuilt.
///
/// Capacity is a soft bound on graph points. Reaching it rebuilds the
/// graph: retired points are compacted away, and if the live entries alone
/// fill it the capacity doubles first.
pub struct HnswIndex {
    dimension: usize,
    capacity: usize,
    params: HnswParams,
    graph: Hnsw<'static, f32, UnitCosine>,
    /// Every point in the graph, indexed by data id.
    entries: Vec<Entry>,
    /// Data id currently live for each identifier.
    live: HashMap<DocumentId, usize>,
}

impl HnswIndex {
    /// Create an empty index for vectors of length `dimension`.
    ///
    /// Fails with [`QuarryError::InvalidArgument`] for a zero dimension or
    /// parameters rejected by [`HnswParams::validate`].
    pub fn new(dimension: usize, capacity: usize, params: HnswParams) -> QuarryResult<Self> {
        if dimension == 0 {
            return Err(QuarryError::InvalidArgument(
                "index dimension must be greater than zero".to_string(),
            ));
        }
        params.validate()?;
        let capacity = capacity.max(1);
        Ok(Self {
            dimension,
            capacity,
            params,
            graph: build_graph(&params, capacity),
            entries: Vec::new(),
            live: HashMap::new(),
        })
    }

    /// Vector length every insert and query must have.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Current soft bound on graph points.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Parameters the graph was built with.
    pub fn params(&self) -> HnswParams {
        self.params
    }

    /// Number of distinct identifiers stored.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Whether no identifier is stored.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Whether `id` has a vector in the index.
    pub fn contains(&self, id: DocumentId) -> bool {
        self.live.contains_key(&id)
    }

    fn retired(&self) -> usize {
        self.entries.len() - self.live.len()
    }

    fn is_live(&self, data_id: usize) -> bool {
        self.entries
            .get(data_id)
            .is_some_and(|entry| self.live.get(&entry.id) == Some(&data_id))
    }

    /// Insert `vector` under `id`. An existing identifier has its vector
    /// replaced; the element count does not change.
    pub fn insert(&mut self, id: DocumentId, vector: &[f32]) -> QuarryResult<()> {
        ensure_dimension(self.dimension, vector.len())?;
        let vector = normalized(vector);

        if self.entries.len() >= self.capacity {
            if self.live.len() >= self.capacity {
                let grown = self.capacity.saturating_mul(2);
                info!(
                    from = self.capacity,
                    to = grown,
                    "Vector index capacity reached, growing"
                );
                self.capacity = grown;
            }
            self.rebuild();
        }

        let data_id = self.entries.len();
        self.graph.insert_slice((vector.as_slice(), data_id));
        self.entries.push(Entry { id, vector });
        if self.live.insert(id, data_id).is_some() {
            debug!(id, "Replaced vector in index");
        }
        Ok(())
    }

    /// Return up to `k` nearest neighbors of `query`, closest first. Equal
    /// distances keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> QuarryResult<Vec<SearchHit>> {
        ensure_dimension(self.dimension, query.len())?;
        if k == 0 || self.live.is_empty() {
            return Ok(Vec::new());
        }

        let query = normalized(query);
        // Ask for enough points that retired ones cannot crowd out k live ones.
        let wanted = (k + self.retired()).min(self.entries.len());
        let ef = self.params.ef_search.max(wanted);

        let mut found: Vec<(usize, f32)> = self
            .graph
            .search(&query, wanted, ef)
            .into_iter()
            .filter(|n| self.is_live(n.d_id))
            .map(|n| (n.d_id, n.distance))
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found.truncate(k);

        Ok(found
            .into_iter()
            .filter_map(|(data_id, distance)| {
                self.entries
                    .get(data_id)
                    .map(|entry| SearchHit { id: entry.id, distance })
            })
            .collect())
    }

    /// Replace the graph with a fresh one holding only live entries.
    fn rebuild(&mut self) {
        let before = self.entries.len();
        let log = std::mem::take(&mut self.entries);
        let kept: Vec<Entry> = log
            .into_iter()
            .enumerate()
            .filter(|(data_id, entry)| self.live.get(&entry.id) == Some(data_id))
            .map(|(_, entry)| entry)
            .collect();

        self.graph = build_graph(&self.params, self.capacity);
        self.live.clear();
        for entry in kept {
            let data_id = self.entries.len();
            self.graph.insert_slice((entry.vector.as_slice(), data_id));
            self.live.insert(entry.id, data_id);
            self.entries.push(entry);
        }
        debug!(
            before,
            after = self.entries.len(),
            capacity = self.capacity,
            "Rebuilt vector index graph"
        );
    }

    pub(crate) fn to_snapshot(&self) -> HnswSnapshot {
        HnswSnapshot {
            dimension: self.dimension,
            capacity: self.capacity,
            params: self.params,
            entries: self
                .entries
                .iter()
                .enumerate()
                .filter(|(data_id, _)| self.is_live(*data_id))
                .map(|(_, entry)| entry.clone())
                .collect(),
        }
    }

    /// Rebuild an index from a snapshot, rejecting inconsistent contents
    /// instead of trusting them.
    pub(crate) fn from_snapshot(snapshot: HnswSnapshot) -> QuarryResult<Self> {
        let HnswSnapshot {
            dimension,
            capacity,
            params,
            entries,
        } = snapshot;

        let corrupt = |what: String| QuarryError::IndexPersistence(format!("corrupt index: {what}"));

        let mut index = Self::new(dimension, capacity.max(entries.len()), params)
            .map_err(|e| corrupt(e.to_string()))?;
        for entry in entries {
            if entry.vector.len() != dimension {
                return Err(corrupt("vector dimension disagrees with header".to_string()));
            }
            if index.contains(entry.id) {
                return Err(corrupt(format!("duplicate identifier {}", entry.id)));
            }
            index.insert(entry.id, &entry.vector)?;
        }
        Ok(index)
    }
}

fn build_graph(params: &HnswParams, capacity: usize) -> Hnsw<'static, f32, UnitCosine> {
    Hnsw::new(
        params.m,
        capacity,
        MAX_LAYER,
        params.ef_construction,
        UnitCosine,
    )
}
