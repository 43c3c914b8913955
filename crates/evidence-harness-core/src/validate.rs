//! Retrieval quality gate.
//!
//! | kind | condition | verdict |
//! |------|-----------|---------|
//! | chunks | empty | retry with Hybrid |
//! | chunks | best score < floor | retry with Hybrid |
//! | chunks | best score ≥ floor | accept |
//! | rows | empty | ask for period/lot/line |
//! | rows | non-empty | accept |
//! | graph | no nodes and no edges | ask for clarifying context |
//! | graph | non-empty | accept |
//!
//! The chunk rules take precedence over anything else that might apply.
//! The validator only grades the result; whether a suggested retry is
//! actually taken is up to the orchestrator.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::Issue;
use crate::models::{Payload, RetrievalResult};
use crate::strategy::StrategyKind;

pub const ROWS_CLARIFICATION: &str = "The query conditions may be incomplete or may not match \
     the data. Which period (e.g. 2026-02-01~2026-02-25) and which target (lot, line, or \
     product) should I use?";

pub const GENERIC_CLARIFICATION: &str = "There isn't enough evidence yet. Should I narrow the \
     search by document, period, or entity (lot, line, product)?";

/// What the orchestrator should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accept,
    Retry(StrategyKind),
    AskUser(String),
    Reject,
}

/// The outcome of grading one [`RetrievalResult`].
///
/// Exactly one of accept, retry, ask-user, reject holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationDecision {
    pub issues: Vec<Issue>,
    pub verdict: Verdict,
}

impl ValidationDecision {
    pub fn accept() -> Self {
        Self {
            issues: Vec::new(),
            verdict: Verdict::Accept,
        }
    }

    /// A terminal failure with no retry and no question.
    pub fn reject(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            verdict: Verdict::Reject,
        }
    }

    pub fn ok(&self) -> bool {
        self.verdict == Verdict::Accept
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.verdict, Verdict::Retry(_))
    }

    pub fn retry_with_strategy(&self) -> Option<StrategyKind> {
        match self.verdict {
            Verdict::Retry(kind) => Some(kind),
            _ => None,
        }
    }

    pub fn ask_user(&self) -> Option<&str> {
        match &self.verdict {
            Verdict::AskUser(q) => Some(q),
            _ => None,
        }
    }

    /// `Display` renderings of the issues.
    pub fn issue_messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

impl Serialize for ValidationDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ValidationDecision", 5)?;
        s.serialize_field("ok", &self.ok())?;
        s.serialize_field("issues", &self.issue_messages())?;
        s.serialize_field("should_retry", &self.should_retry())?;
        s.serialize_field("retry_with_strategy", &self.retry_with_strategy())?;
        s.serialize_field("ask_user", &self.ask_user())?;
        s.end()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalValidator {
    /// Minimum best score a chunk result needs, inclusive.
    pub min_relevance: f64,
}

impl Default for RetrievalValidator {
    fn default() -> Self {
        Self { min_relevance: 0.20 }
    }
}

impl RetrievalValidator {
    pub fn new(min_relevance: f64) -> Self {
        Self { min_relevance }
    }

    pub fn validate(&self, result: &RetrievalResult) -> ValidationDecision {
        match result.payload() {
            Payload::Chunks(hits) => {
                let best = hits.iter().map(|h| h.score).fold(None, |acc: Option<f64>, s| {
                    Some(acc.map_or(s, |a| a.max(s)))
                });
                let issue = match best {
                    None => Issue::EmptyEvidence,
                    Some(best) if best < self.min_relevance => Issue::LowRelevance {
                        best,
                        floor: self.min_relevance,
                    },
                    Some(_) => return ValidationDecision::accept(),
                };
                ValidationDecision {
                    issues: vec![issue],
                    verdict: Verdict::Retry(StrategyKind::Hybrid),
                }
            }
            Payload::Rows(rows) if rows.is_empty() => ValidationDecision {
                issues: vec![Issue::EmptyRows],
                verdict: Verdict::AskUser(ROWS_CLARIFICATION.to_string()),
            },
            Payload::Graph(sg) if sg.is_empty() => ValidationDecision {
                issues: vec![Issue::GraphEmpty],
                verdict: Verdict::AskUser(GENERIC_CLARIFICATION.to_string()),
            },
            Payload::Rows(_) | Payload::Graph(_) => ValidationDecision::accept(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeData, Subgraph};
    use crate::models::{ChunkHit, Row};
    use serde_json::Map;

    fn hit(score: f64) -> ChunkHit {
        ChunkHit {
            chunk_id: "c".into(),
            document_id: "d".into(),
            text: "t".into(),
            score,
            similarity: score,
            keyword_overlap: None,
            distance: Some(1.0 - score),
        }
    }

    #[test]
    fn test_empty_chunks_retry_with_hybrid() {
        let d = RetrievalValidator::default()
            .validate(&RetrievalResult::chunks(vec![], vec![]));
        assert!(!d.ok());
        assert!(d.should_retry());
        assert_eq!(d.retry_with_strategy(), Some(StrategyKind::Hybrid));
        assert_eq!(d.issues, vec![Issue::EmptyEvidence]);
    }

    #[test]
    fn test_floor_is_inclusive() {
        let v = RetrievalValidator::new(0.20);
        assert!(v.validate(&RetrievalResult::chunks(vec![hit(0.20)], vec![])).ok());

        let low = v.validate(&RetrievalResult::chunks(vec![hit(0.05), hit(0.19)], vec![]));
        assert!(low.should_retry());
        assert!(matches!(low.issues[0], Issue::LowRelevance { best, .. } if (best - 0.19).abs() < 1e-12));
    }

    #[test]
    fn test_empty_rows_ask_for_filters() {
        let d = RetrievalValidator::default().validate(&RetrievalResult::rows(vec![], vec![]));
        assert_eq!(d.ask_user(), Some(ROWS_CLARIFICATION));
        assert!(!d.should_retry());
        assert!(RetrievalValidator::default()
            .validate(&RetrievalResult::rows(vec![Row::new()], vec![]))
            .ok());
    }

    #[test]
    fn test_graph_verdicts() {
        let v = RetrievalValidator::default();
        let empty = v.validate(&RetrievalResult::graph(Subgraph::default()));
        assert_eq!(empty.ask_user(), Some(GENERIC_CLARIFICATION));
        assert_eq!(empty.issues, vec![Issue::GraphEmpty]);

        let mut sg = Subgraph::default();
        sg.nodes.insert(
            "n1".into(),
            NodeData {
                label: "LOT_A".into(),
                properties: Map::new(),
            },
        );
        assert!(v.validate(&RetrievalResult::graph(sg)).ok());
    }

    #[test]
    fn test_serialized_shape() {
        let d = RetrievalValidator::default().validate(&RetrievalResult::chunks(vec![], vec![]));
        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["ok"], false);
        assert_eq!(v["should_retry"], true);
        assert_eq!(v["retry_with_strategy"], "hybrid");
        assert!(v["ask_user"].is_null());
        assert_eq!(v["issues"][0], "retrieval returned no evidence");
    }
}
