use quarry_core::DocumentId;
use serde::Serialize;
use std::collections::HashMap;

/// Flat score every lexical hit receives, whatever its rank.
pub const LEXICAL_BASELINE: f32 = 0.5;
/// Multiplier applied to a semantic hit's similarity.
pub const SEMANTIC_WEIGHT: f32 = 0.5;

/// A document id with its combined lexical and semantic score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FusedHit {
    /// Document the score belongs to.
    pub id: DocumentId,
    /// Combined score in `[0, 1]`.
    pub score: f32,
}

/// Merge an unscored lexical ranking with scored semantic hits.
///
/// A document's score is `0.5` if it appears lexically plus `0.5 · similarity`
/// if it appears semantically, so a document found both ways with
/// similarity 1.0 scores 1.0. Output is sorted by descending score; ties keep
/// first-seen order, with lexical hits seen before semantic ones. Repeated
/// ids within one list count once.
pub fn fuse(
    lexical: &[DocumentId],
    semantic: &[(DocumentId, f32)],
    limit: usize,
) -> Vec<FusedHit> {
    let mut order: Vec<DocumentId> = Vec::with_capacity(lexical.len() + semantic.len());
    let mut scores: HashMap<DocumentId, f32> = HashMap::with_capacity(order.capacity());
    let mut bump = |id: DocumentId, amount: f32| {
        scores
            .entry(id)
            .and_modify(|s| *s += amount)
            .or_insert_with(|| {
                order.push(id);
                amount
            });
    };

    let mut seen_lexical = Vec::with_capacity(lexical.len());
    for &id in lexical {
        if !seen_lexical.contains(&id) {
            seen_lexical.push(id);
            bump(id, LEXICAL_BASELINE);
        }
    }

    let mut seen_semantic = Vec::with_capacity(semantic.len());
    for &(id, similarity) in semantic {
        if !seen_semantic.contains(&id) {
            seen_semantic.push(id);
            bump(id, similarity * SEMANTIC_WEIGHT);
        }
    }

    let mut fused: Vec<FusedHit> = order
        .into_iter()
        .map(|id| FusedHit {
            id,
            score: scores.get(&id).copied().unwrap_or(0.0),
        })
        .collect();
    // sort_by is stable: equal scores keep insertion order.
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(limit);
    fused
}
