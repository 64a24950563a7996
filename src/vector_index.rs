//! Exhaustive L2 index over a small corpus of embeddings.
//!
//! Distances are squared Euclidean, the same scale a flat L2 index in the
//! usual vector search libraries reports.

use rayon::prelude::*;

use crate::error::IndexError;
use crate::traits::VectorIndex;

#[derive(Debug, Clone, Default)]
pub struct FlatL2Index {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatL2Index {
    /// Builds the index. Vectors whose dimension differs from the first one
    /// are rejected.
    pub fn build(vectors: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        let dimension = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some((row, vector)) = vectors
            .iter()
            .enumerate()
            .find(|(_, vector)| vector.len() != dimension)
        {
            return Err(IndexError::DimensionMismatch {
                row,
                found: vector.len(),
                expected: dimension,
            });
        }
        Ok(Self { dimension, vectors })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl VectorIndex for FlatL2Index {
    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn nearest(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || query.len() != self.dimension {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .par_iter()
            .enumerate()
            .map(|(row, vector)| (row, squared_l2(query, vector)))
            .collect();
        // Stable on ties: equal distances keep corpus order.
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored
    }
}
