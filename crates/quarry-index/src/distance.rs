/// Euclidean length of `v`.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Unit-length copy of `v`. A zero vector is returned unchanged.
pub fn normalized(v: &[f32]) -> Vec<f32> {
    let m = magnitude(v);
    if m == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / m).collect()
}

/// Cosine distance between two vectors already passed through
/// [`normalized`]. A zero vector is at distance 1.0 from everything.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    (1.0 - dot).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_zero_distance() {
        let v = normalized(&[3.0, 4.0]);
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn opposite_vectors_have_distance_two() {
        let a = normalized(&[1.0, 0.0]);
        let b = normalized(&[-2.0, 0.0]);
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_is_left_alone() {
        let z = normalized(&[0.0, 0.0, 0.0]);
        assert_eq!(z, vec![0.0, 0.0, 0.0]);
        let a = normalized(&[1.0, 1.0, 0.0]);
        assert!((cosine_distance(&z, &a) - 1.0).abs() < 1e-6);
    }
}
