//! Vector similarity search over the embedding pool
//!
//! Brute-force cosine scan: scores every active embedding against the
//! query and keeps the top K. Scores are "higher = more similar"; ties
//! break toward the lower node id so results are deterministic.

use nendb_core::{Error, NodeId, Result};
use nendb_storage::GraphStore;
use std::cmp::Ordering;

/// One search result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityHit {
    /// Node whose embedding matched
    pub node_id: NodeId,
    /// Cosine similarity against the query
    pub score: f32,
}

/// Cosine similarity: `dot(a,b) / (||a|| * ||b||)`.
///
/// Returns 0.0 when either vector has zero norm (avoids division by
/// zero). Vectors are used as-is; nothing is normalized implicitly.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "dimension mismatch in similarity");
    let dot = dot_product(a, b);
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Top-K most similar active embeddings.
///
/// Returns `min(k, active_embedding_count)` hits sorted by descending
/// similarity, ties by ascending node id.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] when the query dimension differs
/// from the store's.
pub fn find_similar(store: &GraphStore, query: &[f32], k: usize) -> Result<Vec<SimilarityHit>> {
    if query.len() != store.embedding_dim() as usize {
        return Err(Error::DimensionMismatch {
            expected: store.embedding_dim(),
            actual: query.len() as u32,
        });
    }
    let mut hits: Vec<SimilarityHit> = store
        .iter_embeddings()
        .map(|(node_id, vector)| SimilarityHit {
            node_id,
            score: cosine_similarity(query, vector),
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.node_id.cmp(&b.node_id))
    });
    hits.truncate(k);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nendb_core::{EmbeddingRecord, NodeProps, NodeRecord, PoolCapacities};

    fn store_with(vectors: &[(u64, [f32; 4])]) -> GraphStore {
        let mut store = GraphStore::new(PoolCapacities::for_testing(), 4).unwrap();
        for (id, v) in vectors {
            store
                .add_node(NodeRecord::new(*id, 0, NodeProps::empty()).unwrap())
                .unwrap();
            store
                .set_embedding(EmbeddingRecord::new(*id, v.to_vec()).unwrap())
                .unwrap();
        }
        store
    }

    #[test]
    fn test_cosine_basics() {
        let v = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_top_k_ordering_and_ties() {
        // The literal scenario: five 4-D embeddings, query [1,0,0,0].
        let store = store_with(&[
            (1, [1.0, 0.0, 0.0, 0.0]),
            (2, [0.0, 1.0, 0.0, 0.0]),
            (3, [1.0, 1.0, 0.0, 0.0]),
            (4, [0.0, 0.0, 1.0, 0.0]),
            (5, [1.0, 1.0, 1.0, 0.0]),
        ]);
        let hits = find_similar(&store, &[1.0, 0.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.node_id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        assert!((hits[1].score - 0.70710677).abs() < 1e-5);
        assert!((hits[2].score - 0.57735026).abs() < 1e-5);
    }

    #[test]
    fn test_ties_break_by_lower_node_id() {
        let store = store_with(&[
            (9, [1.0, 0.0, 0.0, 0.0]),
            (2, [1.0, 0.0, 0.0, 0.0]),
            (5, [2.0, 0.0, 0.0, 0.0]),
        ]);
        let hits = find_similar(&store, &[1.0, 0.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.node_id).collect();
        // All three have cosine 1.0; order is ascending node id.
        assert_eq!(ids, vec![2, 5, 9]);
    }

    #[test]
    fn test_k_larger_than_population() {
        let store = store_with(&[(1, [1.0, 0.0, 0.0, 0.0])]);
        let hits = find_similar(&store, &[1.0, 0.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let store = store_with(&[(1, [1.0, 0.0, 0.0, 0.0])]);
        assert!(matches!(
            find_similar(&store, &[1.0, 0.0], 1),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
