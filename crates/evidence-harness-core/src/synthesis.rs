//! Answer composition on top of a black-box synthesizer.
//!
//! The synthesizer is a text-in/text-out capability expected to return
//! JSON `{final_answer, need_more, improve_request}`. Its output is parsed
//! strictly. Every failure mode (call error, unparseable output, blank
//! answer) degrades to a fixed message with `need_more = false`, so a
//! judge loop built on top always terminates.
//!
//! When the evidence bundle is empty across every channel the
//! synthesizer is never called.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::artifacts::{artifacts_for_rows, Artifact};
use crate::error::Issue;
use crate::graph::Subgraph;
use crate::models::{ChunkHit, Citation, Payload, RetrievalResult, Row};

pub const NOTHING_INDEXED_ANSWER: &str = "No evidence (documents or data) is indexed yet for \
     answering this question.\n- For document-based answers, ingest procedures or guides first.\n\
     - For data analysis, seed the operational tables and query templates.\n\
     Ask again once evidence is available and the answer will come with citations.";

pub const NOTHING_INDEXED_REQUEST: &str = "Ingest documents or seed query templates and data.";

pub const FALLBACK_ANSWER: &str = "The answer could not be generated, or the model response \
     could not be read as structured output. The evidence collected so far is not enough to \
     continue refining automatically. Add documents or data and try again.";

pub const SYSTEM_PROMPT: &str = "You are a strict judge and synthesizer for an operational \
     question-answering system. Produce the final answer grounded only in the provided evidence.\n\
     If the evidence is insufficient but could be improved, set need_more=true and describe the \
     improvement in improve_request.\n\
     Return JSON only with keys final_answer, need_more, improve_request, for example \
     {\"final_answer\":\"...\",\"need_more\":false,\"improve_request\":null}.\n\
     Cite chunks as [chunk:<id> score:<score>]. When rows are used, name the template. When \
     the graph is used, mention the key nodes and relations.";

/// The judge's structured verdict on a set of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    pub final_answer: String,
    #[serde(default)]
    pub need_more: bool,
    #[serde(default)]
    pub improve_request: Option<String>,
}

/// Evidence gathered from one or more channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvidenceBundle {
    pub chunks: Vec<ChunkHit>,
    pub rows: Vec<Row>,
    pub subgraph: Subgraph,
    pub citations: Vec<Citation>,
}

impl EvidenceBundle {
    pub fn from_result(result: &RetrievalResult) -> Self {
        let mut bundle = Self::default();
        bundle.absorb(result);
        bundle
    }

    /// Merge one retrieval result into the bundle.
    pub fn absorb(&mut self, result: &RetrievalResult) {
        match result.payload() {
            Payload::Chunks(hits) => {
                for hit in hits {
                    if !self.chunks.iter().any(|c| c.chunk_id == hit.chunk_id) {
                        self.chunks.push(hit.clone());
                    }
                }
            }
            Payload::Rows(rows) => self.rows.extend(rows.iter().cloned()),
            Payload::Graph(sg) => {
                for (id, node) in &sg.nodes {
                    self.subgraph
                        .nodes
                        .entry(id.clone())
                        .or_insert_with(|| node.clone());
                }
                for edge in &sg.edges {
                    if !self.subgraph.edges.iter().any(|e| e.id == edge.id) {
                        self.subgraph.edges.push(edge.clone());
                    }
                }
                for hit in &sg.hits {
                    if !self.subgraph.hits.iter().any(|h| h.node_id == hit.node_id) {
                        self.subgraph.hits.push(hit.clone());
                    }
                }
            }
        }
        for citation in result.citations() {
            if !self.citations.contains(citation) {
                self.citations.push(citation.clone());
            }
        }
    }

    /// True when no channel produced anything.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.rows.is_empty() && self.subgraph.is_empty()
    }
}

/// One synthesis call's input.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub query: &'a str,
    pub strategy: &'a str,
    pub evidence: &'a EvidenceBundle,
}

impl SynthesisRequest<'_> {
    /// The user-turn message: query, strategy, and each channel as JSON.
    pub fn render_prompt(&self) -> String {
        format!(
            "User query: {}\nStrategy: {}\n\nVector hits: {}\n\nGraph result: {}\n\nRows: {}\n",
            self.query,
            self.strategy,
            to_json(&self.evidence.chunks),
            to_json(&self.evidence.subgraph),
            to_json(&self.evidence.rows),
        )
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// A text-in/text-out judgment capability.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Return the raw model output for `request`.
    async fn complete(&self, request: &SynthesisRequest<'_>) -> Result<String>;
}

/// Where an [`Answer`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    NothingIndexed,
    Synthesized,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    #[serde(flatten)]
    pub judgment: Judgment,
    pub source: AnswerSource,
    pub citations: Vec<Citation>,
    pub artifacts: Vec<Artifact>,
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse raw synthesizer output into a [`Judgment`].
pub fn parse_judgment(raw: &str) -> Result<Judgment, Issue> {
    let judgment: Judgment = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| Issue::SynthesisUnavailable(format!("unparseable output: {e}")))?;
    if judgment.final_answer.trim().is_empty() {
        return Err(Issue::SynthesisUnavailable("blank final_answer".to_string()));
    }
    Ok(judgment)
}

fn fallback_judgment() -> Judgment {
    Judgment {
        final_answer: FALLBACK_ANSWER.to_string(),
        need_more: false,
        improve_request: Some(NOTHING_INDEXED_REQUEST.to_string()),
    }
}

/// Compose the final answer for `request`.
pub async fn compose_answer(synthesizer: &dyn Synthesizer, request: &SynthesisRequest<'_>) -> Answer {
    let evidence = request.evidence;
    if evidence.is_empty() {
        debug!("no evidence in any channel, skipping synthesis");
        return Answer {
            judgment: Judgment {
                final_answer: NOTHING_INDEXED_ANSWER.to_string(),
                need_more: false,
                improve_request: Some(NOTHING_INDEXED_REQUEST.to_string()),
            },
            source: AnswerSource::NothingIndexed,
            citations: Vec::new(),
            artifacts: Vec::new(),
        };
    }

    let parsed = match synthesizer.complete(request).await {
        Ok(raw) => parse_judgment(&raw),
        Err(e) => Err(Issue::SynthesisUnavailable(e.to_string())),
    };
    let (judgment, source) = match parsed {
        Ok(j) => (j, AnswerSource::Synthesized),
        Err(issue) => {
            warn!(synthesizer = synthesizer.name(), %issue, "falling back to fixed answer");
            (fallback_judgment(), AnswerSource::Fallback)
        }
    };

    Answer {
        judgment,
        source,
        citations: evidence.citations.clone(),
        artifacts: artifacts_for_rows(&evidence.rows),
    }
}

/// Deterministic local synthesizer that quotes the strongest evidence.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveSynthesizer;

const SNIPPET_CHARS: usize = 200;

impl ExtractiveSynthesizer {
    fn draft(request: &SynthesisRequest<'_>) -> String {
        let ev = request.evidence;
        let mut out = format!("Question: {}\n", request.query);

        if !ev.chunks.is_empty() {
            out.push_str("\nTop evidence:\n");
            for hit in ev.chunks.iter().take(3) {
                let snippet: String = hit.text.chars().take(SNIPPET_CHARS).collect();
                out.push_str(&format!(
                    "- {} [chunk:{} score:{:.2}]\n",
                    snippet.trim(),
                    hit.chunk_id,
                    hit.score
                ));
            }
        }
        if !ev.rows.is_empty() {
            let template = ev.citations.iter().find_map(|c| match c {
                Citation::Template { template_name, .. } => Some(template_name.as_str()),
                Citation::Chunk { .. } => None,
            });
            out.push_str(&format!(
                "\n{} row(s){}.\n",
                ev.rows.len(),
                template.map(|t| format!(" from {t}")).unwrap_or_default()
            ));
        }
        if !ev.subgraph.is_empty() {
            let labels: Vec<&str> = ev
                .subgraph
                .hits
                .iter()
                .take(5)
                .map(|h| h.label.as_str())
                .collect();
            out.push_str(&format!(
                "\nGraph: {} node(s), {} edge(s). Key entities: {}.\n",
                ev.subgraph.nodes.len(),
                ev.subgraph.edges.len(),
                labels.join(", ")
            ));
        }
        out
    }
}

#[async_trait]
impl Synthesizer for ExtractiveSynthesizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn complete(&self, request: &SynthesisRequest<'_>) -> Result<String> {
        let judgment = Judgment {
            final_answer: Self::draft(request),
            need_more: false,
            improve_request: None,
        };
        Ok(serde_json::to_string(&judgment)?)
    }
}
