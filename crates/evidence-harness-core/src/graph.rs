//! Keyword-seeded, hop-bounded subgraph retrieval.
//!
//! # Algorithm
//!
//! 1. Extract up to `seed_keywords` keywords from the query.
//! 2. For each keyword, look up nodes whose label contains it, until
//!    `max_seeds` candidates are collected. With no keyword seeds, fall
//!    back to one lookup on the first `fallback_chars` of the raw query.
//! 3. Deduplicate seeds by id; they form the first BFS frontier.
//! 4. Per hop: fetch edges incident to the frontier, add both endpoints
//!    to the node set, and build the next frontier from endpoints never
//!    visited before. Stop early once `max_edges` edges are collected.
//! 5. Score every node by label keyword density,
//!    `0.1 + 0.9 × matched / total` (flat `0.1` without keywords), and
//!    keep the top `max_hits` as ranked hits.
//!
//! Zero seeds yields an empty subgraph, not an error.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::store::{GraphEdge, GraphNode, GraphStore};
use crate::text::extract_keywords;

/// Score given to every node when the query has no keywords.
pub const BASE_NODE_SCORE: f64 = 0.1;

/// Traversal bounds.
#[derive(Debug, Clone, Copy)]
pub struct GraphParams {
    pub hops: usize,
    pub max_seeds: usize,
    pub max_edges: usize,
    /// Edge limit for a single `neighbors` lookup.
    pub neighbor_limit: usize,
    pub max_hits: usize,
    pub seed_keywords: usize,
    pub score_keywords: usize,
    pub fallback_chars: usize,
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            hops: 2,
            max_seeds: 10,
            max_edges: 300,
            neighbor_limit: 500,
            max_hits: 20,
            seed_keywords: 8,
            score_keywords: 12,
            fallback_chars: 30,
        }
    }
}

/// A node ranked by label relevance to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphHit {
    pub node_id: String,
    pub label: String,
    /// Relevance in `[0.0, 1.0]`.
    pub score: f64,
    pub reason: String,
}

/// Label and properties of a node inside a [`Subgraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A retrieved neighborhood of the knowledge graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: BTreeMap<String, NodeData>,
    pub edges: Vec<GraphEdge>,
    pub hits: Vec<GraphHit>,
}

impl Subgraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    fn insert_node(&mut self, node: GraphNode) {
        self.nodes.insert(
            node.id,
            NodeData {
                label: node.label,
                properties: node.properties,
            },
        );
    }
}

/// Retrieves a scored subgraph around keyword-matched seed nodes.
#[derive(Debug, Clone, Default)]
pub struct SubgraphRetriever {
    params: GraphParams,
}

impl SubgraphRetriever {
    pub fn new(params: GraphParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &GraphParams {
        &self.params
    }

    /// Run seed lookup, BFS expansion up to `hops`, and hit scoring.
    pub async fn retrieve(
        &self,
        store: &dyn GraphStore,
        query: &str,
        hops: usize,
    ) -> Result<Subgraph> {
        let p = &self.params;
        let seeds = self.find_seeds(store, query).await?;
        debug!(seeds = seeds.len(), hops, "graph seeds resolved");

        let mut sg = Subgraph::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier: Vec<String> = Vec::new();
        for seed in seeds {
            visited.insert(seed.id.clone());
            frontier.push(seed.id.clone());
            sg.insert_node(seed);
        }

        let mut edge_ids: HashSet<String> = HashSet::new();
        let mut capped = false;

        for hop in 0..hops {
            if frontier.is_empty() || capped {
                break;
            }
            let edges = store.neighbors(&frontier, p.neighbor_limit).await?;
            let mut next = Vec::new();

            for edge in edges {
                if sg.edges.len() >= p.max_edges {
                    capped = true;
                    break;
                }
                if !edge_ids.insert(edge.id.clone()) {
                    continue;
                }
                for endpoint in [&edge.src_id, &edge.dst_id] {
                    if !sg.nodes.contains_key(endpoint) {
                        if let Some(node) = store.get_node(endpoint).await? {
                            sg.insert_node(node);
                        }
                    }
                    if visited.insert(endpoint.clone()) {
                        next.push(endpoint.clone());
                    }
                }
                sg.edges.push(edge);
            }

            debug!(
                hop = hop + 1,
                edges = sg.edges.len(),
                nodes = sg.nodes.len(),
                next = next.len(),
                "graph hop expanded"
            );
            frontier = next;
        }

        sg.hits = score_nodes(&sg, query, p.score_keywords, p.max_hits);
        Ok(sg)
    }

    async fn find_seeds(&self, store: &dyn GraphStore, query: &str) -> Result<Vec<GraphNode>> {
        let p = &self.params;
        let mut seeds: Vec<GraphNode> = Vec::new();

        for keyword in extract_keywords(query, p.seed_keywords) {
            seeds.extend(
                store
                    .find_nodes_by_label_substring(&keyword, p.max_seeds)
                    .await?,
            );
            if seeds.len() >= p.max_seeds {
                break;
            }
        }

        let trimmed = query.trim();
        if seeds.is_empty() && !trimmed.is_empty() {
            let fallback: String = trimmed.chars().take(p.fallback_chars).collect();
            seeds = store
                .find_nodes_by_label_substring(&fallback, p.max_seeds)
                .await?;
        }

        let mut seen = HashSet::new();
        seeds.retain(|n| seen.insert(n.id.clone()));
        seeds.truncate(p.max_seeds);
        Ok(seeds)
    }
}

/// Score a label by the share of query keywords it contains.
pub fn score_label(label: &str, keywords: &[String]) -> (f64, String) {
    if keywords.is_empty() {
        return (BASE_NODE_SCORE, "no keywords".to_string());
    }
    let lowered = label.to_lowercase();
    let matched: Vec<&str> = keywords
        .iter()
        .filter(|k| lowered.contains(k.as_str()))
        .map(|k| k.as_str())
        .collect();
    let score = BASE_NODE_SCORE + 0.9 * (matched.len() as f64 / keywords.len() as f64);
    (score, format!("label keyword hits: [{}]", matched.join(", ")))
}

fn score_nodes(sg: &Subgraph, query: &str, max_keywords: usize, max_hits: usize) -> Vec<GraphHit> {
    let keywords = extract_keywords(query, max_keywords);
    let mut hits: Vec<GraphHit> = sg
        .nodes
        .iter()
        .map(|(id, data)| {
            let (score, reason) = score_label(&data.label, &keywords);
            GraphHit {
                node_id: id.clone(),
                label: data.label.clone(),
                score,
                reason,
            }
        })
        .collect();
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(max_hits);
    hits
}
