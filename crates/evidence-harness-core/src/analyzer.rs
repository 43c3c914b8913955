//! Heuristic strategy and template proposals.
//!
//! Proposals are for presentation and fallback only; they never decide
//! which strategy actually runs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::{ProposedStrategy, QueryTemplate, TemplateSummary};
use crate::strategy::StrategyKind;
use crate::text::MIN_KEYWORD_LEN;

static YEAR_MONTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}[-/.]\d{1,2}").expect("year-month regex is valid"));

const REPORT_SIGNALS: &[&str] = &[
    "수율", "불량", "추이", "통계", "현황", "top", "trend", "yield", "defect", "statistics",
    "report",
];
const RELATION_SIGNALS: &[&str] = &[
    "원인", "영향", "관계", "연관", "왜", "때문", "cause", "impact", "effect", "relation",
    "why", "because",
];
const DEFINITION_SIGNALS: &[&str] = &[
    "뭐야", "정의", "설명", "기준", "절차", "가이드", "규정", "what is", "define",
    "definition", "explain", "procedure", "guide", "policy",
];
/// Metric words that count toward every template's score.
const METRIC_TERMS: &[&str] = &[
    "수율", "yield", "불량", "defect", "top", "추이", "trend", "현황", "통계",
];
/// Core terms that strongly tie a query to a template that mentions them.
const ANCHOR_TERMS: &[&str] = &["수율", "불량"];

/// A template scored against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMatch {
    #[serde(flatten)]
    pub template: TemplateSummary,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct QueryAnalyzer {
    /// Templates must score strictly above this.
    pub match_threshold: f64,
    pub match_limit: usize,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        Self {
            match_threshold: 0.25,
            match_limit: 5,
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

impl QueryAnalyzer {
    pub fn new(match_threshold: f64, match_limit: usize) -> Self {
        Self {
            match_threshold,
            match_limit,
        }
    }

    /// Candidate strategies in confidence order, deduplicated by key.
    pub fn propose_strategies(&self, query: &str) -> Vec<ProposedStrategy> {
        let q = query.to_lowercase();
        let report = contains_any(&q, REPORT_SIGNALS) || YEAR_MONTH_RE.is_match(&q);
        let relation = contains_any(&q, RELATION_SIGNALS);
        let definition = contains_any(&q, DEFINITION_SIGNALS);

        let mut out = Vec::new();
        if report {
            out.push(ProposedStrategy::new(
                StrategyKind::StructuredTemplate,
                "Structured query template",
                "Looks like a metrics or report question; a predefined query template fits.",
            ));
        }
        if relation {
            out.push(ProposedStrategy::new(
                StrategyKind::Hybrid,
                "Hybrid search",
                "Combining keyword and semantic matching gathers broader evidence.",
            ));
            out.push(ProposedStrategy::new(
                StrategyKind::Graph,
                "Graph search",
                "Entity and relationship traversal may explain causes and effects.",
            ));
        }
        if definition {
            out.push(ProposedStrategy::new(
                StrategyKind::Vector,
                "Vector search",
                "Looks like a definition or procedure question answered by documents.",
            ));
        }
        if out.is_empty() {
            out.push(ProposedStrategy::new(
                StrategyKind::Vector,
                "Vector search",
                "General question; start with semantic document search.",
            ));
            out.push(ProposedStrategy::new(
                StrategyKind::Hybrid,
                "Hybrid search",
                "Reinforces a weak vector search with keyword overlap.",
            ));
        }

        let mut seen = HashSet::new();
        out.retain(|p| seen.insert(p.key));
        out
    }

    /// Templates whose name or description overlaps the query, best first.
    pub fn match_templates(&self, query: &str, templates: &[QueryTemplate]) -> Vec<TemplateMatch> {
        let q = query.to_lowercase();
        let metric_hits = METRIC_TERMS.iter().filter(|t| q.contains(*t)).count() as f64;

        let mut scored: Vec<TemplateMatch> = templates
            .iter()
            .filter_map(|t| {
                let name = t.name.to_lowercase();
                let desc = t.description.to_lowercase();
                let mentions = |text: &str| {
                    text.split_whitespace()
                        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
                        .any(|w| q.contains(w))
                };

                let mut score = metric_hits * 0.1;
                if mentions(&name) {
                    score += 0.3;
                }
                if mentions(&desc) {
                    score += 0.2;
                }
                for anchor in ANCHOR_TERMS {
                    if q.contains(anchor) && (name.contains(anchor) || desc.contains(anchor)) {
                        score += 0.5;
                    }
                }

                (score > self.match_threshold).then(|| TemplateMatch {
                    template: t.summary(),
                    score,
                    reason: "Query keywords match the template name or description.".to_string(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.match_limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(list: &[ProposedStrategy]) -> Vec<StrategyKind> {
        list.iter().map(|p| p.key).collect()
    }

    fn template(id: &str, name: &str, description: &str) -> QueryTemplate {
        QueryTemplate {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            sql_text: "SELECT 1".into(),
            required_params: vec![],
        }
    }

    #[test]
    fn test_report_question_prefers_template() {
        let a = QueryAnalyzer::default();
        let p = a.propose_strategies("최근 2026-02-01 ~ 2026-02-25 수율 추이");
        assert_eq!(keys(&p)[0], StrategyKind::StructuredTemplate);
    }

    #[test]
    fn test_relation_question_proposes_hybrid_then_graph() {
        let a = QueryAnalyzer::default();
        let p = a.propose_strategies("LOT_A 불량 원인");
        assert_eq!(
            keys(&p),
            vec![
                StrategyKind::StructuredTemplate,
                StrategyKind::Hybrid,
                StrategyKind::Graph
            ]
        );
    }

    #[test]
    fn test_generic_question_defaults_and_dedups() {
        let a = QueryAnalyzer::default();
        assert_eq!(
            keys(&a.propose_strategies("hello there")),
            vec![StrategyKind::Vector, StrategyKind::Hybrid]
        );
        let p = a.propose_strategies("explain the guide");
        assert_eq!(keys(&p), vec![StrategyKind::Vector]);
    }

    #[test]
    fn test_template_matching_scores_and_thresholds() {
        let a = QueryAnalyzer::default();
        let templates = vec![
            template("yield", "Daily yield", "일자별 수율 추이"),
            template("stock", "Inventory", "warehouse stock levels"),
        ];
        let matches = a.match_templates("최근 수율 추이 알려줘", &templates);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].template.id, "yield");
        // two metric terms, description overlap, and the 수율 anchor
        assert!((matches[0].score - (0.2 + 0.2 + 0.5)).abs() < 1e-9);
    }

    #[test]
    fn test_template_matching_caps_results() {
        let a = QueryAnalyzer::new(0.25, 2);
        let templates: Vec<QueryTemplate> = (0..4)
            .map(|i| template(&format!("t{i}"), "yield report", ""))
            .collect();
        assert_eq!(a.match_templates("yield report", &templates).len(), 2);
    }
}
