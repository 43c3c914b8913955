//! Retrieval strategies and their registry.
//!
//! [`StrategyKind`] is a closed set. Caller-supplied keys are resolved
//! through a static lookup table; an unknown key is an explicit
//! [`Issue::UnknownStrategy`], never a silent default.
//!
//! Every strategy reads the conversation state but never mutates it, and
//! holds no state of its own between calls. "No evidence" is a normal,
//! empty result. Only collaborator or integration failures come back as
//! `Err`; [`execute`] converts those into an empty result of the
//! strategy's result kind.

pub mod graph;
pub mod hybrid;
pub mod template;
pub mod vector;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::Issue;
use crate::graph::SubgraphRetriever;
use crate::models::{Params, RetrievalKind, RetrievalResult};
use crate::rerank::HybridReranker;
use crate::state::ConversationState;
use crate::store::Backends;

/// One of the four retrieval mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Vector,
    StructuredTemplate,
    Graph,
    Hybrid,
}

/// Accepted keys, matched case-insensitively.
const REGISTRY: &[(&str, StrategyKind)] = &[
    ("vector", StrategyKind::Vector),
    ("structured_template", StrategyKind::StructuredTemplate),
    ("sql_template", StrategyKind::StructuredTemplate),
    ("template", StrategyKind::StructuredTemplate),
    ("graph", StrategyKind::Graph),
    ("hybrid", StrategyKind::Hybrid),
];

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::Vector,
        StrategyKind::StructuredTemplate,
        StrategyKind::Graph,
        StrategyKind::Hybrid,
    ];

    /// Resolve a caller-supplied key.
    pub fn lookup(key: &str) -> Result<Self, Issue> {
        let needle = key.trim().to_ascii_lowercase();
        REGISTRY
            .iter()
            .find(|(k, _)| *k == needle)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| Issue::UnknownStrategy(key.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Vector => "vector",
            StrategyKind::StructuredTemplate => "structured_template",
            StrategyKind::Graph => "graph",
            StrategyKind::Hybrid => "hybrid",
        }
    }

    pub fn result_kind(&self) -> RetrievalKind {
        match self {
            StrategyKind::Vector | StrategyKind::Hybrid => RetrievalKind::Chunks,
            StrategyKind::StructuredTemplate => RetrievalKind::Rows,
            StrategyKind::Graph => RetrievalKind::Graph,
        }
    }

    /// The strategy to retry with when this one yields weak evidence.
    pub fn fallback(&self) -> Option<StrategyKind> {
        match self {
            StrategyKind::Vector => Some(StrategyKind::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = Issue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::lookup(s)
    }
}

/// Per-call strategy inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyOptions {
    /// Restrict similarity search to one document.
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    /// Caller-supplied template bindings. Always win over autofill.
    #[serde(default)]
    pub params: Params,
    /// Graph hop bound; the retriever's default when `None`.
    #[serde(default)]
    pub hops: Option<usize>,
}

/// Ranking knobs shared by the chunk strategies.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalParams {
    pub top_k: usize,
    pub reranker: HybridReranker,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 6,
            reranker: HybridReranker::default(),
        }
    }
}

/// Everything a strategy may touch, borrowed for one call.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub backends: &'a Backends,
    pub retrieval: &'a RetrievalParams,
    pub graph: &'a SubgraphRetriever,
}

/// Run one strategy, propagating collaborator errors.
pub async fn run(
    kind: StrategyKind,
    ctx: StrategyContext<'_>,
    state: &ConversationState,
    options: &StrategyOptions,
) -> Result<RetrievalResult> {
    match kind {
        StrategyKind::Vector => vector::run(ctx, state, options).await,
        StrategyKind::StructuredTemplate => template::run(ctx, state, options).await,
        StrategyKind::Graph => graph::run(ctx, state, options).await,
        StrategyKind::Hybrid => hybrid::run(ctx, state, options).await,
    }
}

/// Run one strategy; on failure, log and return an empty result of the
/// strategy's result kind.
pub async fn execute(
    kind: StrategyKind,
    ctx: StrategyContext<'_>,
    state: &ConversationState,
    options: &StrategyOptions,
) -> RetrievalResult {
    match run(kind, ctx, state, options).await {
        Ok(result) => result,
        Err(e) => {
            warn!(strategy = %kind, error = %e, "strategy failed, treating as empty result");
            RetrievalResult::empty(kind.result_kind())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{Embedder, HashEmbedder};
    use crate::graph::GraphParams;
    use crate::models::{QueryTemplate, Row};
    use crate::store::{ChunkCandidate, ChunkIndex, GraphEdge, GraphNode, GraphStore, TemplateStore};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Arc;

    /// Every lookup fails as if the backend were offline.
    struct Offline;

    #[async_trait]
    impl ChunkIndex for Offline {
        async fn vector_search(
            &self,
            _query_vec: &[f32],
            _top_k: usize,
            _document_id: Option<&str>,
        ) -> Result<Vec<ChunkCandidate>> {
            Err(anyhow!("chunk index offline"))
        }
    }

    #[async_trait]
    impl GraphStore for Offline {
        async fn find_nodes_by_label_substring(
            &self,
            _term: &str,
            _limit: usize,
        ) -> Result<Vec<GraphNode>> {
            Err(anyhow!("graph offline"))
        }

        async fn neighbors(&self, _node_ids: &[String], _limit: usize) -> Result<Vec<GraphEdge>> {
            Err(anyhow!("graph offline"))
        }

        async fn get_node(&self, _id: &str) -> Result<Option<GraphNode>> {
            Err(anyhow!("graph offline"))
        }
    }

    #[async_trait]
    impl TemplateStore for Offline {
        async fn list_templates(&self) -> Result<Vec<QueryTemplate>> {
            Err(anyhow!("templates offline"))
        }

        async fn get_template(&self, _id: &str) -> Result<Option<QueryTemplate>> {
            Err(anyhow!("templates offline"))
        }

        async fn run(&self, _sql_text: &str, _params: &Params) -> Result<Vec<Row>> {
            Err(anyhow!("templates offline"))
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl Embedder for BrokenEmbedder {
        fn model_name(&self) -> &str {
            "broken"
        }

        fn dims(&self) -> usize {
            8
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(anyhow!("embedding endpoint unreachable"))
        }
    }

    #[tokio::test]
    async fn test_collaborator_failures_become_empty_results_of_their_kind() {
        let backends = Backends::from_store(Arc::new(Offline), Arc::new(HashEmbedder::new(8)));
        let retrieval = RetrievalParams::default();
        let graph = SubgraphRetriever::new(GraphParams::default());
        let ctx = StrategyContext {
            backends: &backends,
            retrieval: &retrieval,
            graph: &graph,
        };
        let state = ConversationState::new("c1", "LOT_A 불량 원인", 3);
        let options = StrategyOptions {
            template_id: Some("yield_daily".into()),
            ..StrategyOptions::default()
        };

        for kind in StrategyKind::ALL {
            assert!(run(kind, ctx, &state, &options).await.is_err(), "{kind}");
            let result = execute(kind, ctx, &state, &options).await;
            assert_eq!(result.kind(), kind.result_kind(), "{kind}");
            assert!(result.is_empty(), "{kind}");
            assert!(result.citations().is_empty(), "{kind}");
        }
    }

    #[tokio::test]
    async fn test_embedder_failure_is_an_empty_chunk_result() {
        let store = Arc::new(crate::store::memory::InMemoryStore::new());
        let backends = Backends::from_store(store, Arc::new(BrokenEmbedder));
        let retrieval = RetrievalParams::default();
        let graph = SubgraphRetriever::new(GraphParams::default());
        let ctx = StrategyContext {
            backends: &backends,
            retrieval: &retrieval,
            graph: &graph,
        };
        let state = ConversationState::new("c1", "etch chamber", 3);

        for kind in [StrategyKind::Vector, StrategyKind::Hybrid] {
            let result = execute(kind, ctx, &state, &StrategyOptions::default()).await;
            assert_eq!(result.kind(), RetrievalKind::Chunks);
            assert!(result.is_empty());
        }
    }

    #[test]
    fn test_lookup_accepts_aliases_case_insensitively() {
        assert_eq!(StrategyKind::lookup("VECTOR").unwrap(), StrategyKind::Vector);
        assert_eq!(
            StrategyKind::lookup(" sql_template ").unwrap(),
            StrategyKind::StructuredTemplate
        );
        assert_eq!(
            "template".parse::<StrategyKind>().unwrap(),
            StrategyKind::StructuredTemplate
        );
    }

    #[test]
    fn test_lookup_unknown_key_is_explicit() {
        assert_eq!(
            StrategyKind::lookup("bm25"),
            Err(Issue::UnknownStrategy("bm25".into()))
        );
    }

    #[test]
    fn test_only_vector_falls_back() {
        assert_eq!(StrategyKind::Vector.fallback(), Some(StrategyKind::Hybrid));
        for kind in [
            StrategyKind::StructuredTemplate,
            StrategyKind::Graph,
            StrategyKind::Hybrid,
        ] {
            assert_eq!(kind.fallback(), None);
        }
    }

    #[test]
    fn test_every_kind_round_trips_through_registry() {
        for kind in StrategyKind::ALL {
            assert_eq!(StrategyKind::lookup(kind.as_str()).unwrap(), kind);
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
