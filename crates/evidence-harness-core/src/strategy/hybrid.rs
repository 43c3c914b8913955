//! Widened similarity search fused with keyword overlap.

use anyhow::Result;
use std::collections::HashMap;

use crate::models::{Citation, RetrievalResult};
use crate::state::ConversationState;

use super::vector::chunk_citation;
use super::{StrategyContext, StrategyOptions};

pub async fn run(
    ctx: StrategyContext<'_>,
    state: &ConversationState,
    options: &StrategyOptions,
) -> Result<RetrievalResult> {
    let top_k = ctx.retrieval.top_k;
    let reranker = &ctx.retrieval.reranker;

    let query_vec = ctx.backends.embedder.embed(&state.query_normalized).await?;
    let candidates = ctx
        .backends
        .chunks
        .vector_search(
            &query_vec,
            reranker.pool_size(top_k),
            options.document_id.as_deref(),
        )
        .await?;

    let mut cited: HashMap<String, Citation> = candidates
        .iter()
        .map(|c| (c.chunk_id.clone(), chunk_citation(c)))
        .collect();
    let hits = reranker.rerank(&state.query_normalized, candidates, top_k);
    let citations = hits
        .iter()
        .filter_map(|h| cited.remove(&h.chunk_id))
        .collect();

    Ok(RetrievalResult::chunks(hits, citations))
}
