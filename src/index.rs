//! Brute-force cosine similarity index over chunk embeddings.
//!
//! An index is built once per document and never mutated afterwards; documents are small
//! enough that a linear scan over every entry stays well within request latency.

use serde::Serialize;
use thiserror::Error;

/// Errors raised while building or querying a [`VectorIndex`].
#[derive(Debug, Error)]
pub enum IndexError {
    /// Index dimension must be positive.
    #[error("index dimension must be greater than zero")]
    InvalidDimension,
    /// A stored or query vector did not match the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was built with.
        expected: usize,
        /// Dimension of the offending vector.
        actual: usize,
    },
    /// A vector contained NaN or infinite components.
    #[error("vector for chunk {0} contains non-finite values")]
    NonFiniteValue(usize),
    /// The query vector contained NaN or infinite components.
    #[error("query vector contains non-finite values")]
    NonFiniteQuery,
}

/// Similarity hit returned by [`VectorIndex::search`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoredChunk {
    /// Identifier of the matching chunk.
    pub chunk_id: usize,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

#[derive(Debug)]
struct IndexEntry {
    chunk_id: usize,
    vector: Vec<f32>,
    norm: f32,
}

/// Immutable nearest-neighbour index.
#[derive(Debug)]
pub struct VectorIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from `(chunk_id, vector)` pairs, preserving their order.
    pub fn build<I>(dimension: usize, vectors: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = (usize, Vec<f32>)>,
    {
        if dimension == 0 {
            return Err(IndexError::InvalidDimension);
        }

        let mut entries = Vec::new();
        for (chunk_id, vector) in vectors {
            if vector.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            if vector.iter().any(|value| !value.is_finite()) {
                return Err(IndexError::NonFiniteValue(chunk_id));
            }
            let norm = l2_norm(&vector);
            entries.push(IndexEntry {
                chunk_id,
                vector,
                norm,
            });
        }

        Ok(Self { dimension, entries })
    }

    /// Return the `k` entries most similar to `query`, best first.
    ///
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if query.iter().any(|value| !value.is_finite()) {
            return Err(IndexError::NonFiniteQuery);
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk_id: entry.chunk_id,
                score: cosine(query, query_norm, &entry.vector, entry.norm),
            })
            .collect();
        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// Dimension every stored vector shares.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, candidate: &[f32], candidate_norm: f32) -> f32 {
    if query_norm == 0.0 || candidate_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query
        .iter()
        .zip(candidate)
        .map(|(left, right)| left * right)
        .sum();
    dot / (query_norm * candidate_norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VectorIndex {
        VectorIndex::build(
            3,
            vec![
                (0, vec![1.0, 0.0, 0.0]),
                (1, vec![0.0, 1.0, 0.0]),
                (2, vec![0.7, 0.7, 0.0]),
                (3, vec![0.0, 0.0, 0.0]),
            ],
        )
        .expect("index")
    }

    #[test]
    fn search_orders_by_cosine_similarity() {
        let hits = index().search(&[1.0, 0.1, 0.0], 3).expect("hits");
        let ids: Vec<_> = hits.iter().map(|hit| hit.chunk_id).collect();
        assert_eq!(ids, vec![0, 2, 1]);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::build(
            2,
            vec![(5, vec![1.0, 0.0]), (6, vec![2.0, 0.0]), (7, vec![3.0, 0.0])],
        )
        .expect("index");
        let hits = index.search(&[1.0, 0.0], 3).expect("hits");
        let ids: Vec<_> = hits.iter().map(|hit| hit.chunk_id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn zero_k_returns_nothing() {
        assert!(index().search(&[1.0, 0.0, 0.0], 0).expect("hits").is_empty());
    }

    #[test]
    fn zero_norm_vectors_score_zero() {
        let hits = index().search(&[0.0, 0.0, 0.0], 4).expect("hits");
        assert!(hits.iter().all(|hit| hit.score == 0.0));
        let hits = index().search(&[0.0, 0.0, 1.0], 4).expect("hits");
        let zero = hits.iter().find(|hit| hit.chunk_id == 3).expect("zero entry");
        assert_eq!(zero.score, 0.0);
    }

    #[test]
    fn k_larger_than_index_returns_everything() {
        let hits = index().search(&[1.0, 0.0, 0.0], 50).expect("hits");
        assert_eq!(hits.len(), 4);
    }

    #[test]
    fn rejects_mismatched_dimensions() {
        let error = VectorIndex::build(3, vec![(0, vec![1.0, 0.0])]).unwrap_err();
        assert!(matches!(
            error,
            IndexError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let error = index().search(&[1.0], 1).unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn rejects_non_finite_values() {
        let error = VectorIndex::build(2, vec![(4, vec![f32::NAN, 0.0])]).unwrap_err();
        assert!(matches!(error, IndexError::NonFiniteValue(4)));
        let error = index().search(&[f32::INFINITY, 0.0, 0.0], 1).unwrap_err();
        assert!(matches!(error, IndexError::NonFiniteQuery));
    }

    #[test]
    fn rejects_zero_dimension() {
        let error = VectorIndex::build(0, Vec::new()).unwrap_err();
        assert!(matches!(error, IndexError::InvalidDimension));
    }
}
