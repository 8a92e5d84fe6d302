//! Embedding vector math
//!
//! Cosine similarity and the incremental centroid updates used by the
//! cluster assignment engine.

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs so a degenerate
/// embedding never joins a cluster by accident.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

/// Incremental running-mean update:
/// centroid' = (centroid * count + sample) / (count + 1)
pub fn running_mean(centroid: &[f32], count: i32, sample: &[f32]) -> Vec<f32> {
    debug_assert_eq!(centroid.len(), sample.len());
    let count = count.max(0) as f64;

    centroid
        .iter()
        .zip(sample.iter())
        .map(|(c, s)| (((*c as f64) * count + (*s as f64)) / (count + 1.0)) as f32)
        .collect()
}

/// Arithmetic mean of a set of vectors (exact centroid recomputation).
/// Returns None for an empty set.
pub fn mean(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    let mut acc = vec![0.0f64; dim];

    for v in vectors {
        debug_assert_eq!(v.len(), dim);
        for (slot, x) in acc.iter_mut().zip(v.iter()) {
            *slot += *x as f64;
        }
    }

    let n = vectors.len() as f64;
    Some(acc.into_iter().map(|x| (x / n) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![0.5, -0.3, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_running_mean_matches_exact_mean() {
        let samples = [
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ];

        let mut centroid = samples[0].clone();
        for (i, sample) in samples.iter().enumerate().skip(1) {
            centroid = running_mean(&centroid, i as i32, sample);
        }

        let exact = mean(&samples.to_vec()).unwrap();
        for (a, b) in centroid.iter().zip(exact.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_mean_empty() {
        assert_eq!(mean(&[]), None);
    }
}
