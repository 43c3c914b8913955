//! TOML configuration.
//!
//! Every section except `[db]` may be omitted; missing keys take the
//! defaults listed on each field. [`load_config`] rejects values the
//! orchestrator cannot run with.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use evidence_harness_core::graph::GraphParams;
use evidence_harness_core::rerank::HybridReranker;
use evidence_harness_core::strategy::RetrievalParams;
use evidence_harness_core::OrchestratorParams;

/// Upper bound on graph expansion depth.
pub const MAX_HOPS: usize = 6;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub conversations: ConversationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f64,
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,
    #[serde(default = "default_vector_weight")]
    pub hybrid_vector_weight: f64,
    #[serde(default = "default_keyword_weight")]
    pub hybrid_keyword_weight: f64,
    #[serde(default = "default_widen_factor")]
    pub hybrid_widen_factor: usize,
    #[serde(default = "default_match_threshold")]
    pub template_match_threshold: f64,
    #[serde(default = "default_match_limit")]
    pub template_match_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_relevance: default_min_relevance(),
            max_loops: default_max_loops(),
            hybrid_vector_weight: default_vector_weight(),
            hybrid_keyword_weight: default_keyword_weight(),
            hybrid_widen_factor: default_widen_factor(),
            template_match_threshold: default_match_threshold(),
            template_match_limit: default_match_limit(),
        }
    }
}

fn default_top_k() -> usize {
    6
}
fn default_min_relevance() -> f64 {
    0.20
}
fn default_max_loops() -> u32 {
    3
}
fn default_vector_weight() -> f64 {
    0.65
}
fn default_keyword_weight() -> f64 {
    0.35
}
fn default_widen_factor() -> usize {
    3
}
fn default_match_threshold() -> f64 {
    0.25
}
fn default_match_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    #[serde(default = "default_hops")]
    pub hops: usize,
    #[serde(default = "default_max_seeds")]
    pub max_seeds: usize,
    #[serde(default = "default_max_edges")]
    pub max_edges: usize,
    #[serde(default = "default_neighbor_limit")]
    pub neighbor_limit: usize,
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            hops: default_hops(),
            max_seeds: default_max_seeds(),
            max_edges: default_max_edges(),
            neighbor_limit: default_neighbor_limit(),
            max_hits: default_max_hits(),
        }
    }
}

fn default_hops() -> usize {
    2
}
fn default_max_seeds() -> usize {
    10
}
fn default_max_edges() -> usize {
    300
}
fn default_neighbor_limit() -> usize {
    500
}
fn default_max_hits() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// OpenAI-compatible API root. `OPENAI_BASE_URL` overrides it.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            base_url: None,
            max_retries: default_embedding_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    #[serde(default = "default_synthesis_provider")]
    pub provider: String,
    #[serde(default = "default_synthesis_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_synthesis_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sweep_rounds")]
    pub sweep_rounds: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            provider: default_synthesis_provider(),
            model: default_synthesis_model(),
            base_url: None,
            max_retries: default_synthesis_retries(),
            timeout_secs: default_timeout_secs(),
            sweep_rounds: default_sweep_rounds(),
        }
    }
}

fn default_synthesis_provider() -> String {
    "extractive".to_string()
}
fn default_synthesis_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_synthesis_retries() -> u32 {
    2
}
fn default_sweep_rounds() -> u32 {
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConversationsConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for ConversationsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    3600
}

impl Config {
    /// Orchestrator tunables derived from the `[retrieval]`, `[graph]` and
    /// `[synthesis]` sections.
    pub fn orchestrator_params(&self) -> OrchestratorParams {
        let r = &self.retrieval;
        let g = &self.graph;
        let defaults = GraphParams::default();
        OrchestratorParams {
            retrieval: RetrievalParams {
                top_k: r.top_k,
                reranker: HybridReranker {
                    vector_weight: r.hybrid_vector_weight,
                    keyword_weight: r.hybrid_keyword_weight,
                    widen_factor: r.hybrid_widen_factor,
                },
            },
            graph: GraphParams {
                hops: g.hops,
                max_seeds: g.max_seeds,
                max_edges: g.max_edges,
                neighbor_limit: g.neighbor_limit,
                max_hits: g.max_hits,
                ..defaults
            },
            min_relevance: r.min_relevance,
            max_loops: r.max_loops,
            template_match_threshold: r.template_match_threshold,
            template_match_limit: r.template_match_limit,
            sweep_rounds: self.synthesis.sweep_rounds,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    let r = &config.retrieval;
    if r.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }
    if !(-1.0..=1.0).contains(&r.min_relevance) {
        anyhow::bail!("retrieval.min_relevance must be in [-1.0, 1.0]");
    }
    if r.max_loops < 1 {
        anyhow::bail!("retrieval.max_loops must be >= 1");
    }
    if r.hybrid_vector_weight < 0.0 || r.hybrid_keyword_weight < 0.0 {
        anyhow::bail!("retrieval.hybrid_*_weight must be non-negative");
    }
    if ((r.hybrid_vector_weight + r.hybrid_keyword_weight) - 1.0).abs() > 1e-6 {
        anyhow::bail!(
            "retrieval.hybrid_vector_weight + hybrid_keyword_weight must sum to 1.0 (got {})",
            r.hybrid_vector_weight + r.hybrid_keyword_weight
        );
    }
    if r.hybrid_widen_factor < 1 {
        anyhow::bail!("retrieval.hybrid_widen_factor must be >= 1");
    }

    let g = &config.graph;
    if g.hops > MAX_HOPS {
        anyhow::bail!("graph.hops must be <= {}", MAX_HOPS);
    }
    if g.max_seeds < 1 {
        anyhow::bail!("graph.max_seeds must be >= 1");
    }
    if g.max_edges < 1 {
        anyhow::bail!("graph.max_edges must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash or openai.",
            other
        ),
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.synthesis.provider.as_str() {
        "extractive" | "openai" => {}
        other => anyhow::bail!(
            "Unknown synthesis provider: '{}'. Must be extractive or openai.",
            other
        ),
    }

    Ok(())
}
