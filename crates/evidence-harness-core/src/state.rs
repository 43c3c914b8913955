//! Per-conversation orchestration state.

use serde::Serialize;

use crate::analyzer::TemplateMatch;
use crate::models::{ProposedStrategy, RetrievalResult};
use crate::strategy::StrategyKind;
use crate::text::normalize_query;
use crate::validate::ValidationDecision;

/// Everything the orchestrator knows about one conversation.
///
/// `loop_count` only ever grows and never exceeds `max_loops`; both are
/// private so that only [`ConversationState::begin_iteration`] can move
/// it.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub query_original: String,
    pub query_normalized: String,
    pub proposed_strategies: Vec<ProposedStrategy>,
    pub proposed_templates: Vec<TemplateMatch>,
    pub selected_strategy: Option<StrategyKind>,
    pub retrieval: Option<RetrievalResult>,
    pub validation_ok: bool,
    pub validation_issues: Vec<String>,
    loop_count: u32,
    max_loops: u32,
    pub pending_user_question: Option<String>,
    version: u64,
}

impl ConversationState {
    pub fn new(conversation_id: impl Into<String>, query: &str, max_loops: u32) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            query_original: query.to_string(),
            query_normalized: normalize_query(query),
            proposed_strategies: Vec::new(),
            proposed_templates: Vec::new(),
            selected_strategy: None,
            retrieval: None,
            validation_ok: false,
            validation_issues: Vec::new(),
            loop_count: 0,
            max_loops,
            pending_user_question: None,
            version: 0,
        }
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn max_loops(&self) -> u32 {
        self.max_loops
    }

    pub fn budget_left(&self) -> bool {
        self.loop_count < self.max_loops
    }

    /// Count one strategy execution. Returns `false`, leaving the count
    /// untouched, once the budget is spent.
    pub fn begin_iteration(&mut self) -> bool {
        if !self.budget_left() {
            return false;
        }
        self.loop_count += 1;
        true
    }

    /// Write version, bumped by the conversation store on every write.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Fold a user follow-up into the query text.
    pub fn append_followup(&mut self, followup: &str) {
        let followup = followup.trim();
        if followup.is_empty() {
            return;
        }
        self.query_original
            .push_str(&format!("\n[follow-up] {followup}"));
        self.query_normalized = normalize_query(&self.query_original);
    }

    pub fn record_validation(&mut self, decision: &ValidationDecision) {
        self.validation_ok = decision.ok();
        self.validation_issues = decision.issue_messages();
    }
}
