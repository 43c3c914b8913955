//! Core data models shared by strategies, the validator, and the orchestrator.
//!
//! A [`RetrievalResult`] is the only thing a strategy produces. Its
//! [`Payload`] determines its [`RetrievalKind`], so a result can never
//! claim one kind while carrying another's payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::graph::Subgraph;
use crate::strategy::StrategyKind;

/// A single row returned from a templated structured query.
pub type Row = Map<String, Value>;

/// Named parameter bindings for a structured query template.
pub type Params = BTreeMap<String, String>;

/// The shape of a retrieval payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalKind {
    Chunks,
    Rows,
    Graph,
}

impl RetrievalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalKind::Chunks => "chunks",
            RetrievalKind::Rows => "rows",
            RetrievalKind::Graph => "graph",
        }
    }
}

/// One ranked text evidence snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    /// Relevance score the validator grades (`similarity` for vector
    /// results, the fused score for hybrid results).
    pub score: f64,
    /// Raw similarity in `[-1.0, 1.0]` reported by the chunk index.
    pub similarity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword_overlap: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Retrieved evidence, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Payload {
    Chunks(Vec<ChunkHit>),
    Rows(Vec<Row>),
    Graph(Subgraph),
}

/// An opaque pointer back to the source of a piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Citation {
    Chunk {
        document_id: String,
        chunk_id: String,
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        meta: Map<String, Value>,
    },
    Template {
        template_id: String,
        template_name: String,
    },
}

/// The outcome of running one strategy. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    #[serde(flatten)]
    payload: Payload,
    citations: Vec<Citation>,
}

impl RetrievalResult {
    pub fn new(payload: Payload, citations: Vec<Citation>) -> Self {
        Self { payload, citations }
    }

    pub fn chunks(hits: Vec<ChunkHit>, citations: Vec<Citation>) -> Self {
        Self::new(Payload::Chunks(hits), citations)
    }

    pub fn rows(rows: Vec<Row>, citations: Vec<Citation>) -> Self {
        Self::new(Payload::Rows(rows), citations)
    }

    pub fn graph(subgraph: Subgraph) -> Self {
        Self::new(Payload::Graph(subgraph), Vec::new())
    }

    /// A well-formed result with no evidence, preserving `kind`.
    pub fn empty(kind: RetrievalKind) -> Self {
        let payload = match kind {
            RetrievalKind::Chunks => Payload::Chunks(Vec::new()),
            RetrievalKind::Rows => Payload::Rows(Vec::new()),
            RetrievalKind::Graph => Payload::Graph(Subgraph::default()),
        };
        Self::new(payload, Vec::new())
    }

    pub fn kind(&self) -> RetrievalKind {
        match self.payload {
            Payload::Chunks(_) => RetrievalKind::Chunks,
            Payload::Rows(_) => RetrievalKind::Rows,
            Payload::Graph(_) => RetrievalKind::Graph,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn is_empty(&self) -> bool {
        match &self.payload {
            Payload::Chunks(hits) => hits.is_empty(),
            Payload::Rows(rows) => rows.is_empty(),
            Payload::Graph(sg) => sg.is_empty(),
        }
    }
}

/// A candidate strategy offered to the caller. Deduplicated by `key`;
/// list order reflects heuristic confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedStrategy {
    pub key: StrategyKind,
    pub title: String,
    pub rationale: String,
}

impl ProposedStrategy {
    pub fn new(key: StrategyKind, title: &str, rationale: &str) -> Self {
        Self {
            key,
            title: title.to_string(),
            rationale: rationale.to_string(),
        }
    }
}

/// A stored, parameterized structured query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub sql_text: String,
    #[serde(default)]
    pub required_params: Vec<String>,
}

impl QueryTemplate {
    /// Parameter names the template needs bound before it can run.
    ///
    /// Falls back to the `:name` placeholders in `sql_text` when the
    /// template declares no required parameters.
    pub fn declared_params(&self) -> Vec<String> {
        if !self.required_params.is_empty() {
            return self.required_params.clone();
        }
        let mut names = crate::text::placeholder_names(&self.sql_text);
        names.sort();
        names.dedup();
        names
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            required_params: self.declared_params(),
        }
    }
}

/// Lightweight template description used for proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
}
