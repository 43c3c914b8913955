//! Synthesizer providers.
//!
//! | Config Value | Provider |
//! |-------------|----------|
//! | `"extractive"` | [`ExtractiveSynthesizer`] (deterministic, offline) |
//! | `"openai"` | [`OpenAiSynthesizer`] |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use evidence_harness_core::synthesis::{
    ExtractiveSynthesizer, SynthesisRequest, Synthesizer, SYSTEM_PROMPT,
};

use crate::config::SynthesisConfig;
use crate::openai::OpenAiClient;

/// Chat-completions judge asked for a JSON object reply.
pub struct OpenAiSynthesizer {
    client: OpenAiClient,
    model: String,
}

impl OpenAiSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        Ok(Self {
            client: OpenAiClient::from_env(
                config.base_url.as_deref(),
                config.timeout_secs,
                config.max_retries,
            )?,
            model: config.model.clone(),
        })
    }

    fn body(&self, request: &SynthesisRequest<'_>) -> Value {
        json!({
            "model": self.model,
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": request.render_prompt() },
            ],
        })
    }
}

fn message_content(response: &Value) -> Result<String> {
    match response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        Some(content) => Ok(content.to_string()),
        None => bail!("Invalid chat response: missing choices[0].message.content"),
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &SynthesisRequest<'_>) -> Result<String> {
        let response = self
            .client
            .post_json("chat/completions", &self.body(request))
            .await?;
        message_content(&response)
    }
}

pub fn create_synthesizer(config: &SynthesisConfig) -> Result<Arc<dyn Synthesizer>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveSynthesizer)),
        "openai" => Ok(Arc::new(OpenAiSynthesizer::new(config)?)),
        other => bail!("Unknown synthesis provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_content_extraction() {
        let ok = json!({ "choices": [{ "message": { "content": "{\"final_answer\":\"x\"}" } }] });
        assert_eq!(message_content(&ok).unwrap(), "{\"final_answer\":\"x\"}");
        assert!(message_content(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_default_provider_is_extractive() {
        let synth = create_synthesizer(&SynthesisConfig::default()).unwrap();
        assert_eq!(synth.name(), "extractive");
    }
}
