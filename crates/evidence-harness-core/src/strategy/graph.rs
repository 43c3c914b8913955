//! Knowledge-graph neighborhood retrieval.

use anyhow::Result;

use crate::models::RetrievalResult;
use crate::state::ConversationState;

use super::{StrategyContext, StrategyOptions};

pub async fn run(
    ctx: StrategyContext<'_>,
    state: &ConversationState,
    options: &StrategyOptions,
) -> Result<RetrievalResult> {
    let hops = options.hops.unwrap_or(ctx.graph.params().hops);
    let subgraph = ctx
        .graph
        .retrieve(ctx.backends.graph.as_ref(), &state.query_normalized, hops)
        .await?;
    Ok(RetrievalResult::graph(subgraph))
}
