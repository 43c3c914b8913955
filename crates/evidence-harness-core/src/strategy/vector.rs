//! Top-K semantic similarity search.

use anyhow::Result;

use crate::models::{ChunkHit, Citation, RetrievalResult};
use crate::state::ConversationState;
use crate::store::ChunkCandidate;

use super::{StrategyContext, StrategyOptions};

pub async fn run(
    ctx: StrategyContext<'_>,
    state: &ConversationState,
    options: &StrategyOptions,
) -> Result<RetrievalResult> {
    let query_vec = ctx.backends.embedder.embed(&state.query_normalized).await?;
    let candidates = ctx
        .backends
        .chunks
        .vector_search(
            &query_vec,
            ctx.retrieval.top_k,
            options.document_id.as_deref(),
        )
        .await?;

    let citations = candidates.iter().map(chunk_citation).collect();
    let hits = candidates
        .into_iter()
        .map(|c| ChunkHit {
            score: c.similarity,
            similarity: c.similarity,
            keyword_overlap: None,
            distance: Some(c.distance),
            chunk_id: c.chunk_id,
            document_id: c.document_id,
            text: c.text,
        })
        .collect();
    Ok(RetrievalResult::chunks(hits, citations))
}

pub(crate) fn chunk_citation(c: &ChunkCandidate) -> Citation {
    Citation::Chunk {
        document_id: c.document_id.clone(),
        chunk_id: c.chunk_id.clone(),
        meta: c.meta.clone(),
    }
}
