//! In-memory backend implementing every store trait, for tests and demos.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity. Templates do not
//! interpret SQL: each template is registered with a fixed row set, and
//! `run` returns the rows registered for that SQL text, keeping only rows
//! whose columns agree with any bound parameter of the same name.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::embedding::cosine_similarity;
use crate::models::{Params, QueryTemplate, Row};

use super::{ChunkCandidate, ChunkIndex, GraphEdge, GraphNode, GraphStore, TemplateStore, ROW_CAP};

struct StoredChunk {
    chunk_id: String,
    document_id: String,
    text: String,
    vector: Vec<f32>,
    meta: Map<String, Value>,
}

struct StoredTemplate {
    template: QueryTemplate,
    rows: Vec<Row>,
}

/// In-memory store for tests and local demos.
pub struct InMemoryStore {
    chunks: RwLock<Vec<StoredChunk>>,
    nodes: RwLock<Vec<GraphNode>>,
    edges: RwLock<Vec<GraphEdge>>,
    templates: RwLock<Vec<StoredTemplate>>,
    executions: RwLock<Vec<(String, Params)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            nodes: RwLock::new(Vec::new()),
            edges: RwLock::new(Vec::new()),
            templates: RwLock::new(Vec::new()),
            executions: RwLock::new(Vec::new()),
        }
    }

    pub fn add_chunk(
        &self,
        document_id: &str,
        chunk_id: &str,
        text: &str,
        vector: Vec<f32>,
        meta: Map<String, Value>,
    ) {
        let mut chunks = self.chunks.write().unwrap();
        chunks.retain(|c| c.chunk_id != chunk_id);
        chunks.push(StoredChunk {
            chunk_id: chunk_id.to_string(),
            document_id: document_id.to_string(),
            text: text.to_string(),
            vector,
            meta,
        });
    }

    pub fn add_node(&self, id: &str, label: &str) {
        let mut nodes = self.nodes.write().unwrap();
        nodes.retain(|n| n.id != id);
        nodes.push(GraphNode {
            id: id.to_string(),
            label: label.to_string(),
            properties: Map::new(),
        });
    }

    pub fn add_edge(&self, id: &str, src_id: &str, dst_id: &str, relation: &str) {
        let mut edges = self.edges.write().unwrap();
        if edges.iter().any(|e| e.id == id) {
            return;
        }
        edges.push(GraphEdge {
            id: id.to_string(),
            src_id: src_id.to_string(),
            dst_id: dst_id.to_string(),
            relation: relation.to_string(),
            properties: Map::new(),
        });
    }

    pub fn add_template(&self, template: QueryTemplate, rows: Vec<Row>) {
        let mut templates = self.templates.write().unwrap();
        templates.retain(|t| t.template.id != template.id);
        templates.push(StoredTemplate { template, rows });
    }

    /// Every `(sql_text, params)` pair passed to [`TemplateStore::run`], in order.
    pub fn executions(&self) -> Vec<(String, Params)> {
        self.executions.read().unwrap().clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn row_matches(row: &Row, params: &Params) -> bool {
    params.iter().all(|(k, v)| match row.get(k) {
        None => true,
        Some(Value::String(s)) => s == v,
        Some(other) => other.to_string() == *v,
    })
}

#[async_trait]
impl ChunkIndex for InMemoryStore {
    async fn vector_search(
        &self,
        query_vec: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<ChunkCandidate>> {
        let chunks = self.chunks.read().unwrap();
        let mut candidates: Vec<ChunkCandidate> = chunks
            .iter()
            .filter(|c| document_id.map_or(true, |d| c.document_id == d))
            .map(|c| {
                let similarity = cosine_similarity(query_vec, &c.vector) as f64;
                ChunkCandidate {
                    chunk_id: c.chunk_id.clone(),
                    document_id: c.document_id.clone(),
                    text: c.text.clone(),
                    similarity,
                    distance: 1.0 - similarity,
                    meta: c.meta.clone(),
                }
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        Ok(candidates)
    }
}

#[async_trait]
impl TemplateStore for InMemoryStore {
    async fn list_templates(&self) -> Result<Vec<QueryTemplate>> {
        let templates = self.templates.read().unwrap();
        Ok(templates.iter().map(|t| t.template.clone()).collect())
    }

    async fn get_template(&self, id: &str) -> Result<Option<QueryTemplate>> {
        let templates = self.templates.read().unwrap();
        Ok(templates
            .iter()
            .find(|t| t.template.id == id)
            .map(|t| t.template.clone()))
    }

    async fn run(&self, sql_text: &str, params: &Params) -> Result<Vec<Row>> {
        self.executions
            .write()
            .unwrap()
            .push((sql_text.to_string(), params.clone()));

        let templates = self.templates.read().unwrap();
        let rows = templates
            .iter()
            .find(|t| t.template.sql_text == sql_text)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|r| row_matches(r, params))
                    .take(ROW_CAP)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

#[async_trait]
impl GraphStore for InMemoryStore {
    async fn find_nodes_by_label_substring(
        &self,
        term: &str,
        limit: usize,
    ) -> Result<Vec<GraphNode>> {
        if term.is_empty() {
            return Ok(Vec::new());
        }
        let needle = term.to_lowercase();
        let nodes = self.nodes.read().unwrap();
        Ok(nodes
            .iter()
            .filter(|n| n.label.to_lowercase().contains(&needle))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn neighbors(&self, node_ids: &[String], limit: usize) -> Result<Vec<GraphEdge>> {
        if node_ids.is_empty() {
            return Ok(Vec::new());
        }
        let edges = self.edges.read().unwrap();
        Ok(edges
            .iter()
            .filter(|e| node_ids.contains(&e.src_id) || node_ids.contains(&e.dst_id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_node(&self, id: &str) -> Result<Option<GraphNode>> {
        let nodes = self.nodes.read().unwrap();
        Ok(nodes.iter().find(|n| n.id == id).cloned())
    }
}
