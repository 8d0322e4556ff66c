//! Vector helpers for subject embeddings.

use thiserror::Error;

/// Decimal places kept on averaged components, bounding stored document size.
pub const EMBEDDING_DECIMALS: i32 = 6;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VectorError {
    #[error("cannot average an empty set of vectors")]
    Empty,
    #[error("vector {index} has dimension {found}, expected {expected}")]
    InconsistentDimension {
        expected: usize,
        found: usize,
        index: usize,
    },
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Element-wise mean of `vectors`, each component rounded to six decimals.
pub fn average_vectors<V: AsRef<[f64]>>(vectors: &[V]) -> Result<Vec<f64>, VectorError> {
    let first = vectors.first().ok_or(VectorError::Empty)?.as_ref();
    let dimension = first.len();

    let mut sums = vec![0.0_f64; dimension];
    for (index, vector) in vectors.iter().enumerate() {
        let vector = vector.as_ref();
        if vector.len() != dimension {
            return Err(VectorError::InconsistentDimension {
                expected: dimension,
                found: vector.len(),
                index,
            });
        }
        for (sum, value) in sums.iter_mut().zip(vector) {
            *sum += value;
        }
    }

    let count = vectors.len() as f64;
    Ok(sums
        .into_iter()
        .map(|sum| round_to(sum / count, EMBEDDING_DECIMALS))
        .collect())
}

/// Cosine similarity in `[-1, 1]`; `None` when lengths differ or either norm is zero.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}
