//! Embedding providers.
//!
//! | Config Value | Provider |
//! |-------------|----------|
//! | `"hash"` | [`HashEmbedder`] (deterministic, offline) |
//! | `"openai"` | [`OpenAiEmbedder`] |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use evidence_harness_core::embedding::{Embedder, HashEmbedder};

use crate::config::EmbeddingConfig;
use crate::openai::OpenAiClient;

/// Embeddings from `POST /embeddings`. Requires `OPENAI_API_KEY`.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: OpenAiClient::from_env(
                config.base_url.as_deref(),
                config.timeout_secs,
                config.max_retries,
            )?,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = json!({
            "model": self.model,
            "input": [text],
            "dimensions": self.dims,
        });
        let response = self.client.post_json("embeddings", &body).await?;
        let mut vectors = parse_embedding_response(&response)?;
        let Some(vector) = vectors.pop() else {
            bail!("Empty embedding response");
        };
        if vector.len() != self.dims {
            bail!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                self.dims
            );
        }
        Ok(vector)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims))),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orders_by_index() {
        let response = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_embedding_response(&response).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_rejects_missing_data() {
        assert!(parse_embedding_response(&json!({ "error": "nope" })).is_err());
    }

    #[test]
    fn test_hash_provider_uses_configured_dims() {
        let config = EmbeddingConfig {
            dims: 16,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.model_name(), "hash");
        assert_eq!(embedder.dims(), 16);
    }
}
