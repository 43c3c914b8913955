//! Issue taxonomy for orchestration turns.
//!
//! None of these abort the process. Each one is either recorded as a
//! validation issue, turned into a clarifying question, or drives an
//! automatic retry.

use thiserror::Error;

/// A problem detected while planning, executing, or validating a turn.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Issue {
    #[error("template id missing")]
    MissingTemplateId,

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("no structured query store is configured")]
    TemplateStoreUnavailable,

    #[error("missing params: {}", .0.join(", "))]
    MissingParameter(Vec<String>),

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("retrieval returned no evidence")]
    EmptyEvidence,

    #[error("only low-relevance evidence found (best={best:.3} < min={floor:.3})")]
    LowRelevance { best: f64, floor: f64 },

    #[error("structured query returned no rows")]
    EmptyRows,

    #[error("graph retrieval returned an empty subgraph")]
    GraphEmpty,

    #[error("retry budget exhausted ({max_loops} loops)")]
    LoopBudgetExhausted { max_loops: u32 },

    #[error("waiting for the user to answer a pending question")]
    AwaitingUser,

    #[error("synthesis unavailable: {0}")]
    SynthesisUnavailable(String),
}

impl Issue {
    /// The question to put to the user when this issue is surfaced as a
    /// clarification rather than an error.
    pub fn clarifying_question(&self) -> Option<String> {
        match self {
            Issue::MissingTemplateId => Some(
                "Which query template should I run? Please pick a template id.".to_string(),
            ),
            Issue::TemplateNotFound(_) => Some(
                "I couldn't find the selected query template. Could you choose another one?"
                    .to_string(),
            ),
            Issue::TemplateStoreUnavailable => Some(
                "Structured queries aren't available here. Should I search the documents \
                 or the knowledge graph instead?"
                    .to_string(),
            ),
            Issue::MissingParameter(names) => Some(format!(
                "This query template needs values for: {}. Could you provide them?",
                names.join(", ")
            )),
            _ => None,
        }
    }
}
