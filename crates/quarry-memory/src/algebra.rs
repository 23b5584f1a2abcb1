//! Vector arithmetic and weighted combination of named concept vectors.

use crate::store::NamedVectorStore;
use quarry_core::{ensure_dimension, NamedVector, QuarryError, QuarryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// `normalize(a + weight·b)`
pub fn add(a: &[f32], b: &[f32], weight: f32) -> QuarryResult<Vec<f32>> {
    ensure_dimension(a.len(), b.len())?;
    let sum: Vec<f32> = a.iter().zip(b).map(|(x, y)| x + weight * y).collect();
    Ok(normalize(&sum))
}

/// `normalize(a − weight·b)`
pub fn subtract(a: &[f32], b: &[f32], weight: f32) -> QuarryResult<Vec<f32>> {
    add(a, b, -weight)
}

/// `scalar·v`, not normalized.
pub fn multiply(v: &[f32], scalar: f32) -> Vec<f32> {
    v.iter().map(|x| x * scalar).collect()
}

pub use quarry_index::magnitude;
/// Unit-length copy of a vector. A zero vector comes back unchanged.
pub use quarry_index::normalized as normalize;

/// Sum of pairwise products.
pub fn dot_product(a: &[f32], b: &[f32]) -> QuarryResult<f32> {
    ensure_dimension(a.len(), b.len())?;
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Cosine of the angle between `a` and `b`; 0 when either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> QuarryResult<f32> {
    let dot = dot_product(a, b)?;
    let (ma, mb) = (magnitude(a), magnitude(b));
    if ma == 0.0 || mb == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (ma * mb))
}

/// Straight-line distance between `a` and `b`.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> QuarryResult<f32> {
    ensure_dimension(a.len(), b.len())?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt())
}

/// How a step folds its vector into the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    /// `normalize(acc + weight·v)`
    Add,
    /// `normalize(acc − weight·v)`
    Subtract,
}

/// One step of a [`vector_algebra`] expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorOperation {
    /// Named vector to look up.
    pub handle: String,
    /// Direction of the step.
    pub op: Op,
    /// Scale applied to the looked-up vector (default 1.0).
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl VectorOperation {
    /// Add `handle` with weight 1.0.
    pub fn add(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            op: Op::Add,
            weight: default_weight(),
        }
    }

    /// Subtract `handle` with weight 1.0.
    pub fn subtract(handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            op: Op::Subtract,
            weight: default_weight(),
        }
    }

    /// Replace the weight. Chainable builder method.
    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }
}

/// Parses `handle`, `+handle`, `-handle` and any of those with a `*weight`
/// suffix, e.g. `-sadness*0.5`.
impl FromStr for VectorOperation {
    type Err = QuarryError;

    fn from_str(s: &str) -> QuarryResult<Self> {
        let s = s.trim();
        let (op, rest) = match s.chars().next() {
            Some('+') => (Op::Add, &s[1..]),
            Some('-') => (Op::Subtract, &s[1..]),
            _ => (Op::Add, s),
        };
        let (handle, weight) = match rest.split_once('*') {
            Some((handle, weight)) => {
                let weight: f32 = weight.trim().parse().map_err(|_| {
                    QuarryError::InvalidArgument(format!("invalid weight in '{s}'"))
                })?;
                if !weight.is_finite() {
                    return Err(QuarryError::InvalidArgument(format!(
                        "weight must be finite in '{s}'"
                    )));
                }
                (handle, weight)
            }
            None => (rest, default_weight()),
        };
        let handle = handle.trim();
        if handle.is_empty() {
            return Err(QuarryError::InvalidArgument(format!(
                "missing handle in '{s}'"
            )));
        }
        Ok(Self {
            handle: handle.to_string(),
            op,
            weight,
        })
    }
}

impl fmt::Display for VectorOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.op {
            Op::Add => '+',
            Op::Subtract => '-',
        };
        if self.weight == 1.0 {
            write!(f, "{sign}{}", self.handle)
        } else {
            write!(f, "{sign}{}*{}", self.handle, self.weight)
        }
    }
}

/// Fold already-resolved vectors in order.
///
/// The first vector seeds the accumulator as-is; its op and weight are not
/// applied. Every later step goes through [`add`] or [`subtract`], so the
/// accumulator is renormalized after each one and the order of steps
/// matters.
pub fn combine<'a, I>(steps: I) -> QuarryResult<Vec<f32>>
where
    I: IntoIterator<Item = (&'a [f32], Op, f32)>,
{
    let mut steps = steps.into_iter();
    let Some((seed, _, _)) = steps.next() else {
        return Err(QuarryError::InvalidArgument(
            "vector algebra needs at least one operation".to_string(),
        ));
    };

    steps.try_fold(seed.to_vec(), |acc, (vector, op, weight)| match op {
        Op::Add => add(&acc, vector, weight),
        Op::Subtract => subtract(&acc, vector, weight),
    })
}

/// Resolve every handle in `operations` and [`combine`] them.
///
/// Fails with [`QuarryError::HandleNotFound`] for the first unknown handle,
/// before any arithmetic is done.
pub async fn vector_algebra(
    store: &dyn NamedVectorStore,
    operations: &[VectorOperation],
) -> QuarryResult<Vec<f32>> {
    if operations.is_empty() {
        return Err(QuarryError::InvalidArgument(
            "vector algebra needs at least one operation".to_string(),
        ));
    }

    let mut resolved = Vec::with_capacity(operations.len());
    for operation in operations {
        let named = store
            .get_vector(&operation.handle)
            .await?
            .ok_or_else(|| QuarryError::HandleNotFound(operation.handle.clone()))?;
        resolved.push(named.embedding);
    }

    debug!(steps = operations.len(), "Evaluating vector algebra");
    combine(
        resolved
            .iter()
            .zip(operations)
            .map(|(v, o)| (v.as_slice(), o.op, o.weight)),
    )
}

/// Stored named vectors ranked by cosine similarity to `query`, best first.
///
/// Vectors whose dimension differs from the query are skipped.
pub async fn closest_named_vectors(
    store: &dyn NamedVectorStore,
    query: &[f32],
    limit: usize,
) -> QuarryResult<Vec<(NamedVector, f32)>> {
    let mut scored = Vec::new();
    for named in store.list_vectors().await? {
        match cosine_similarity(query, &named.embedding) {
            Ok(similarity) => scored.push((named, similarity)),
            Err(_) => debug!(
                handle = %named.handle,
                dimension = named.embedding.len(),
                "Skipping named vector with foreign dimension"
            ),
        }
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.handle.cmp(&b.0.handle)));
    scored.truncate(limit);
    Ok(scored)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn approx(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-4)
    }

    #[test]
    fn test_normalize_zero_vector_is_fixed_point() {
        for dim in [1, 3, 1536] {
            let zero = vec![0.0; dim];
            let n = normalize(&zero);
            assert_eq!(n, zero);
            assert!(n.iter().all(|x| !x.is_nan()));
        }
    }

    #[test]
    fn test_normalize_unit_length() {
        let n = normalize(&[3.0, 4.0]);
        assert!(approx(&n, &[0.6, 0.8]));
        assert!((magnitude(&n) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_add_and_subtract_normalize() {
        assert!(approx(
            &add(&[1.0, 0.0], &[0.0, 1.0], 1.0).unwrap(),
            &[std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2]
        ));
        assert!(approx(
            &subtract(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0], 0.5).unwrap(),
            &[0.894_427, -0.447_214, 0.0]
        ));
    }

    #[test]
    fn test_multiply_does_not_normalize() {
        assert_eq!(multiply(&[1.0, -2.0], 3.0), vec![3.0, -6.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let short = [1.0, 0.0];
        let long = [1.0, 0.0, 0.0];
        fn mismatch<T>(r: QuarryResult<T>) -> bool {
            matches!(
                r,
                Err(QuarryError::DimensionMismatch {
                    expected: 2,
                    actual: 3
                })
            )
        }
        assert!(mismatch(add(&short, &long, 1.0)));
        assert!(mismatch(subtract(&short, &long, 1.0)));
        assert!(mismatch(dot_product(&short, &long)));
        assert!(mismatch(cosine_similarity(&short, &long)));
        assert!(mismatch(euclidean_distance(&short, &long)));
    }

    #[test]
    fn test_similarity_and_distance() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
        assert!((euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]).unwrap() - 5.0).abs() < 1e-6);
        assert_eq!(dot_product(&[1.0, 2.0], &[3.0, 4.0]).unwrap(), 11.0);
    }

    #[test]
    fn test_combine_seed_is_not_normalized() {
        let seed = [3.0, 4.0];
        assert_eq!(combine([(&seed[..], Op::Subtract, 9.0)]).unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_combine_is_stepwise_not_summed() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        let c = [0.0, 1.0];

        let stepwise = combine([
            (&a[..], Op::Add, 1.0),
            (&b[..], Op::Add, 1.0),
            (&c[..], Op::Add, 1.0),
        ])
        .unwrap();
        // ((1,0)+(0,1)) normalized = (0.707, 0.707); + (0,1) = (0.707, 1.707)
        let expected = normalize(&[
            std::f32::consts::FRAC_1_SQRT_2,
            std::f32::consts::FRAC_1_SQRT_2 + 1.0,
        ]);
        assert!(approx(&stepwise, &expected));
        assert!(!approx(&stepwise, &normalize(&[1.0, 2.0])));
    }

    #[test]
    fn test_combine_empty_is_invalid() {
        let steps: Vec<(&[f32], Op, f32)> = Vec::new();
        assert!(matches!(combine(steps), Err(QuarryError::InvalidArgument(_))));
    }

    #[test]
    fn test_parse_operations() {
        let op: VectorOperation = "+joy".parse().unwrap();
        assert_eq!(op, VectorOperation::add("joy"));

        let op: VectorOperation = "-sadness*0.5".parse().unwrap();
        assert_eq!(op, VectorOperation::subtract("sadness").with_weight(0.5));

        let op: VectorOperation = " plain ".parse().unwrap();
        assert_eq!(op, VectorOperation::add("plain"));

        assert!("-".parse::<VectorOperation>().is_err());
        assert!("+x*abc".parse::<VectorOperation>().is_err());
        assert!("+x*inf".parse::<VectorOperation>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for text in ["+joy", "-sadness*0.5"] {
            let op: VectorOperation = text.parse().unwrap();
            assert_eq!(op.to_string(), text);
        }
    }
}
