use quarry_core::DocumentId;
use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// Lowercased alphanumeric terms, single characters dropped.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// In-memory BM25 inverted index keyed by document id.
///
/// Backs keyword search for [`crate::InMemoryStore`]. Re-adding an id
/// replaces its previous postings.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    /// term -> (document -> term frequency)
    postings: HashMap<String, HashMap<DocumentId, f32>>,
    lengths: HashMap<DocumentId, f32>,
    total_length: f32,
}

impl Bm25Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index `text` under `id`, replacing whatever `id` held before.
    pub fn insert(&mut self, id: DocumentId, text: &str) {
        self.remove(id);

        let tokens = tokenize(text);
        let mut frequencies: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *frequencies.entry(token.clone()).or_insert(0.0) += 1.0;
        }
        for (term, tf) in frequencies {
            self.postings.entry(term).or_default().insert(id, tf);
        }

        let length = tokens.len() as f32;
        self.lengths.insert(id, length);
        self.total_length += length;
    }

    /// Returns false if `id` was never indexed.
    pub fn remove(&mut self, id: DocumentId) -> bool {
        let Some(length) = self.lengths.remove(&id) else {
            return false;
        };
        self.total_length -= length;
        self.postings.retain(|_, docs| {
            docs.remove(&id);
            !docs.is_empty()
        });
        true
    }

    /// Up to `limit` documents by descending BM25 score.
    ///
    /// ```text
    /// score(d) = Σ_t idf(t) · tf·(k1+1) / (tf + k1·(1 − b + b·|d|/avgdl))
    /// idf(t)   = ln((N − df + 0.5) / (df + 0.5) + 1)
    /// ```
    ///
    /// Equal scores are ordered by ascending id.
    pub fn search(&self, query: &str, limit: usize) -> Vec<(DocumentId, f32)> {
        if self.lengths.is_empty() || limit == 0 {
            return Vec::new();
        }

        let n = self.lengths.len() as f32;
        let avgdl = match self.total_length / n {
            avg if avg > 0.0 => avg,
            _ => 1.0,
        };

        let mut query_terms = tokenize(query);
        query_terms.sort();
        query_terms.dedup();

        let mut scores: HashMap<DocumentId, f32> = HashMap::new();
        for term in &query_terms {
            let Some(docs) = self.postings.get(term) else {
                continue;
            };
            let df = docs.len() as f32;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for (&id, &tf) in docs {
                let dl = self.lengths.get(&id).copied().unwrap_or(0.0);
                let norm = tf + K1 * (1.0 - B + B * dl / avgdl);
                *scores.entry(id).or_insert(0.0) += idf * tf * (K1 + 1.0) / norm;
            }
        }

        let mut ranked: Vec<(DocumentId, f32)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(limit);
        ranked
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_punctuation_and_single_chars() {
        assert_eq!(
            tokenize("Hello, World! A b-tree IS fast."),
            vec!["hello", "world", "tree", "is", "fast"]
        );
    }

    #[test]
    fn test_ranking_prefers_more_matching_terms() {
        let mut index = Bm25Index::new();
        index.insert(1, "rust is a systems programming language, rust is fast");
        index.insert(2, "python is a scripting programming language");
        index.insert(3, "recipes for a weeknight dinner");

        let results = index.search("rust programming", 10);
        let ids: Vec<DocumentId> = results.iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_reinsert_replaces_postings() {
        let mut index = Bm25Index::new();
        index.insert(7, "old words about gardening");
        index.insert(7, "new words about sailing");

        assert_eq!(index.len(), 1);
        assert!(index.search("gardening", 5).is_empty());
        assert_eq!(index.search("sailing", 5)[0].0, 7);
    }

    #[test]
    fn test_remove() {
        let mut index = Bm25Index::new();
        index.insert(1, "alpha beta");
        index.insert(2, "beta gamma");

        assert!(index.remove(1));
        assert!(!index.remove(1));
        let ids: Vec<DocumentId> = index.search("alpha beta", 10).iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_equal_scores_order_by_id() {
        let mut index = Bm25Index::new();
        index.insert(30, "shared term");
        index.insert(10, "shared term");
        index.insert(20, "shared term");

        let ids: Vec<DocumentId> = index.search("shared", 2).iter().map(|r| r.0).collect();
        assert_eq!(ids, vec![10, 20]);
    }

    #[test]
    fn test_empty_inputs() {
        let mut index = Bm25Index::new();
        assert!(index.search("anything", 10).is_empty());
        index.insert(1, "something");
        assert!(index.search("", 10).is_empty());
        assert!(index.search("something", 0).is_empty());
        assert!(index.search("?? !!", 10).is_empty());
    }
}
