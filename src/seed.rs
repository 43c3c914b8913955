//! Seed loading: documents, graph, templates and template data from one
//! JSON file.
//!
//! ```json
//! {
//!   "setup_sql": "CREATE TABLE IF NOT EXISTS daily_yield (...); INSERT INTO ...",
//!   "documents": [
//!     { "id": "sop-7", "title": "Line 2 SOP", "chunks": [{ "text": "...", "meta": { "page": 3 } }] }
//!   ],
//!   "nodes": [{ "id": "lot_a", "label": "LOT_A" }],
//!   "edges": [{ "id": "e1", "src_id": "lot_a", "dst_id": "defect_x", "relation": "causes" }],
//!   "templates": [{ "id": "yield_daily", "name": "Daily yield", "sql_text": "SELECT ..." }]
//! }
//! ```
//!
//! Every chunk is embedded with the configured embedder at load time.
//! Loading the same document id again replaces its chunks.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use evidence_harness_core::embedding::Embedder;
use evidence_harness_core::models::QueryTemplate;
use evidence_harness_core::store::{GraphEdge, GraphNode};

use crate::sqlite_store::{NewChunk, SqliteStore};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub setup_sql: Option<String>,
    #[serde(default)]
    pub documents: Vec<SeedDocument>,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
    #[serde(default)]
    pub templates: Vec<QueryTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDocument {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub chunks: Vec<SeedChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedChunk {
    pub text: String,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub documents: usize,
    pub chunks: usize,
    pub nodes: usize,
    pub edges: usize,
    pub templates: usize,
}

pub fn read_seed(path: &Path) -> Result<SeedFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse seed file: {}", path.display()))
}

fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn load_seed(
    store: &SqliteStore,
    embedder: &dyn Embedder,
    seed: &SeedFile,
) -> Result<LoadReport> {
    let mut report = LoadReport::default();

    if let Some(sql) = seed.setup_sql.as_deref().filter(|s| !s.trim().is_empty()) {
        store
            .execute_script(sql)
            .await
            .with_context(|| "setup_sql failed")?;
    }

    for doc in &seed.documents {
        let doc_id = doc
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        store
            .upsert_document(&doc_id, doc.title.as_deref(), "seed", &doc.metadata)
            .await?;

        let mut chunks = Vec::with_capacity(doc.chunks.len());
        for chunk in &doc.chunks {
            let vector = embedder
                .embed(&chunk.text)
                .await
                .with_context(|| format!("embedding failed for document {doc_id}"))?;
            chunks.push(NewChunk {
                id: Uuid::new_v4().to_string(),
                text: chunk.text.clone(),
                hash: text_hash(&chunk.text),
                meta: chunk.meta.clone(),
                vector,
            });
        }
        store
            .replace_chunks(&doc_id, &chunks, embedder.model_name())
            .await?;
        report.documents += 1;
        report.chunks += chunks.len();
    }

    for node in &seed.nodes {
        store.upsert_node(node).await?;
    }
    report.nodes = seed.nodes.len();

    for edge in &seed.edges {
        store.upsert_edge(edge).await?;
    }
    report.edges = seed.edges.len();

    for template in &seed.templates {
        store.upsert_template(template).await?;
    }
    report.templates = seed.templates.len();

    info!(
        documents = report.documents,
        chunks = report.chunks,
        nodes = report.nodes,
        edges = report.edges,
        templates = report.templates,
        "seed loaded"
    );
    Ok(report)
}
