//! Collaborator contracts consumed by the strategies.
//!
//! Three independent store traits cover the three evidence channels.
//! A backend may implement any subset; [`Backends`] bundles one of each
//! (the template store is optional) together with the [`Embedder`].
//!
//! | Trait | Channel | Used by |
//! |-------|---------|---------|
//! | [`ChunkIndex`] | semantic similarity | Vector, Hybrid |
//! | [`TemplateStore`] | structured templated queries | StructuredTemplate, planning |
//! | [`GraphStore`] | knowledge graph | Graph (via `SubgraphRetriever`) |
//!
//! Implementations must be `Send + Sync` and hold no per-call state.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::models::{Params, QueryTemplate, Row};

/// Safety cap on rows returned by [`TemplateStore::run`].
pub const ROW_CAP: usize = 200;

/// A chunk returned from a similarity search.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub similarity: f64,
    /// `1.0 - similarity`.
    pub distance: f64,
    /// Source metadata carried into citations (page, title, ...).
    pub meta: Map<String, Value>,
}

/// A knowledge-graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A directed, labelled knowledge-graph edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub src_id: String,
    pub dst_id: String,
    pub relation: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// Semantic similarity search over embedded chunks.
#[async_trait]
pub trait ChunkIndex: Send + Sync {
    /// Return up to `top_k` chunks ranked by descending similarity,
    /// optionally restricted to one document.
    async fn vector_search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>>;
}

/// Stored structured-query templates and their execution.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn list_templates(&self) -> Result<Vec<QueryTemplate>>;

    async fn get_template(&self, id: &str) -> Result<Option<QueryTemplate>>;

    /// Execute `sql_text` with named bindings. Returns at most
    /// [`ROW_CAP`] rows regardless of the true result size.
    async fn run(&self, sql_text: &str, params: &Params) -> Result<Vec<Row>>;
}

/// Knowledge-graph lookups.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Nodes whose label contains `term`, case-insensitively.
    async fn find_nodes_by_label_substring(&self, term: &str, limit: usize)
        -> Result<Vec<GraphNode>>;

    /// Edges with either endpoint in `node_ids`.
    async fn neighbors(&self, node_ids: &[String], limit: usize) -> Result<Vec<GraphEdge>>;

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>>;
}

/// Handles to every collaborator a strategy may need.
///
/// Cheap to clone; shared across conversations.
#[derive(Clone)]
pub struct Backends {
    pub embedder: Arc<dyn Embedder>,
    pub chunks: Arc<dyn ChunkIndex>,
    pub graph: Arc<dyn GraphStore>,
    pub templates: Option<Arc<dyn TemplateStore>>,
}

impl Backends {
    /// Wire all channels to a single backend implementing every store trait.
    pub fn from_store<S>(store: Arc<S>, embedder: Arc<dyn Embedder>) -> Self
    where
        S: ChunkIndex + GraphStore + TemplateStore + 'static,
    {
        Self {
            embedder,
            chunks: store.clone(),
            graph: store.clone(),
            templates: Some(store),
        }
    }

    pub fn without_templates(mut self) -> Self {
        self.templates = None;
        self
    }
}
