//! Hybrid fusion of semantic similarity and lexical keyword overlap.
//!
//! ```text
//! final_score = vector_weight × similarity + keyword_weight × overlap
//! ```
//!
//! `overlap` is the fraction of query keywords present in the chunk text.
//! Candidates are re-sorted by `final_score` descending with a stable
//! sort, so ties keep the index's similarity order.

use crate::models::ChunkHit;
use crate::store::ChunkCandidate;
use crate::text::{extract_keywords, overlap_score};

/// Maximum number of query keywords used for overlap scoring.
pub const RERANK_KEYWORDS: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct HybridReranker {
    pub vector_weight: f64,
    pub keyword_weight: f64,
    /// Candidate pool multiplier applied to `top_k` before fusion.
    pub widen_factor: usize,
}

impl Default for HybridReranker {
    fn default() -> Self {
        Self {
            vector_weight: 0.65,
            keyword_weight: 0.35,
            widen_factor: 3,
        }
    }
}

impl HybridReranker {
    /// How many candidates to request from the chunk index.
    pub fn pool_size(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.widen_factor.max(1))
    }

    pub fn fuse(&self, similarity: f64, overlap: f64) -> f64 {
        self.vector_weight * similarity + self.keyword_weight * overlap
    }

    /// Score, sort, and truncate `candidates` to `top_k` hits.
    pub fn rerank(&self, query: &str, candidates: Vec<ChunkCandidate>, top_k: usize) -> Vec<ChunkHit> {
        let keywords = extract_keywords(query, RERANK_KEYWORDS);
        let mut hits: Vec<ChunkHit> = candidates
            .into_iter()
            .map(|c| {
                let overlap = overlap_score(&keywords, &c.text);
                ChunkHit {
                    score: self.fuse(c.similarity, overlap),
                    similarity: c.similarity,
                    keyword_overlap: Some(overlap),
                    distance: Some(c.distance),
                    chunk_id: c.chunk_id,
                    document_id: c.document_id,
                    text: c.text,
                }
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }
}
