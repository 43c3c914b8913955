//! The Plan → Execute → Validate → (Retry | Ask-user | Accept) state machine.
//!
//! # Turn lifecycle
//!
//! 1. A pending question blocks the turn unless the request carries
//!    external input (a follow-up, a template id, or bindings).
//! 2. The strategy key is resolved; unknown keys reject the turn.
//! 3. A spent loop budget rejects the turn before anything runs.
//! 4. Structured-template turns pass a precondition gate first. A failed
//!    gate asks the user and does not count as an iteration.
//! 5. Each iteration increments `loop_count`, clears the pending
//!    question, runs the strategy, and validates the result.
//! 6. A retry verdict re-enters step 5 with the fallback strategy only
//!    while the strategy declares that fallback and budget remains.
//!
//! The retry loop is iterative and bounded by `max_loops`, which is
//! fixed per conversation.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analyzer::QueryAnalyzer;
use crate::error::Issue;
use crate::graph::{GraphParams, SubgraphRetriever};
use crate::state::ConversationState;
use crate::store::Backends;
use crate::strategy::{self, template, RetrievalParams, StrategyContext, StrategyKind, StrategyOptions};
use crate::synthesis::{compose_answer, Answer, EvidenceBundle, SynthesisRequest, Synthesizer};
use crate::validate::{RetrievalValidator, ValidationDecision, Verdict, GENERIC_CLARIFICATION};

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorParams {
    pub retrieval: RetrievalParams,
    pub graph: GraphParams,
    pub min_relevance: f64,
    pub max_loops: u32,
    pub template_match_threshold: f64,
    pub template_match_limit: usize,
    /// Upper bound on judge rounds in a multi-channel sweep.
    pub sweep_rounds: u32,
}

impl Default for OrchestratorParams {
    fn default() -> Self {
        Self {
            retrieval: RetrievalParams::default(),
            graph: GraphParams::default(),
            min_relevance: 0.20,
            max_loops: 3,
            template_match_threshold: 0.25,
            template_match_limit: 5,
            sweep_rounds: 2,
        }
    }
}

/// One caller request against an existing conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub strategy: String,
    #[serde(flatten)]
    pub options: StrategyOptions,
    #[serde(default)]
    pub user_followup: Option<String>,
}

impl ExecuteRequest {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            ..Self::default()
        }
    }

    /// Whether the request answers a pending question.
    fn carries_input(&self) -> bool {
        let non_blank = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        non_blank(&self.user_followup)
            || non_blank(&self.options.template_id)
            || !self.options.params.is_empty()
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Accepted,
    AskingUser { question: String },
    Rejected { issues: Vec<String> },
    /// Nothing ran: a question is still waiting for an answer.
    AwaitingUser { question: String },
}

pub struct Orchestrator {
    backends: Backends,
    analyzer: QueryAnalyzer,
    validator: RetrievalValidator,
    retrieval: RetrievalParams,
    graph: SubgraphRetriever,
    params: OrchestratorParams,
}

impl Orchestrator {
    pub fn new(backends: Backends, params: OrchestratorParams) -> Self {
        Self {
            backends,
            analyzer: QueryAnalyzer::new(
                params.template_match_threshold,
                params.template_match_limit,
            ),
            validator: RetrievalValidator::new(params.min_relevance),
            retrieval: params.retrieval,
            graph: SubgraphRetriever::new(params.graph),
            params,
        }
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn params(&self) -> &OrchestratorParams {
        &self.params
    }

    pub(crate) fn strategy_context(&self) -> StrategyContext<'_> {
        StrategyContext {
            backends: &self.backends,
            retrieval: &self.retrieval,
            graph: &self.graph,
        }
    }

    /// Create a conversation and populate its proposals.
    pub async fn plan(&self, conversation_id: &str, query: &str) -> ConversationState {
        let mut state = ConversationState::new(conversation_id, query, self.params.max_loops);
        state.proposed_strategies = self.analyzer.propose_strategies(&state.query_normalized);

        if let Some(store) = &self.backends.templates {
            match store.list_templates().await {
                Ok(templates) => {
                    state.proposed_templates = self
                        .analyzer
                        .match_templates(&state.query_normalized, &templates);
                }
                Err(e) => warn!(error = %e, "template listing failed, skipping template proposals"),
            }
        }

        info!(
            conversation = %state.conversation_id,
            strategies = state.proposed_strategies.len(),
            templates = state.proposed_templates.len(),
            "planned"
        );
        state
    }

    /// Run one turn against `state`.
    pub async fn execute(
        &self,
        state: &mut ConversationState,
        request: &ExecuteRequest,
    ) -> TurnOutcome {
        if let Some(question) = &state.pending_user_question {
            if !request.carries_input() {
                debug!(conversation = %state.conversation_id, "turn blocked on pending question");
                return TurnOutcome::AwaitingUser {
                    question: question.clone(),
                };
            }
        }
        if let Some(followup) = &request.user_followup {
            state.append_followup(followup);
        }

        let kind = match StrategyKind::lookup(&request.strategy) {
            Ok(kind) => kind,
            Err(issue) => {
                warn!(conversation = %state.conversation_id, %issue, "rejecting turn");
                return self.reject(state, vec![issue]);
            }
        };
        if !state.budget_left() {
            return self.reject(state, vec![self.budget_issue(state)]);
        }
        state.selected_strategy = Some(kind);

        let mut options = request.options.clone();
        if kind == StrategyKind::StructuredTemplate {
            match template::prepare(&self.backends, &state.query_normalized, &options).await {
                Ok(prepared) => options.params = prepared.params,
                Err(e) => match e.downcast::<Issue>() {
                    Ok(issue) => {
                        let question = issue
                            .clarifying_question()
                            .unwrap_or_else(|| GENERIC_CLARIFICATION.to_string());
                        info!(conversation = %state.conversation_id, %issue, "template precondition unmet");
                        state.validation_ok = false;
                        state.validation_issues = vec![issue.to_string()];
                        return self.ask(state, question);
                    }
                    // Collaborator failure: let the strategy run and come back empty.
                    Err(e) => warn!(error = %e, "template lookup failed"),
                },
            }
        }

        let mut current = kind;
        loop {
            if !state.begin_iteration() {
                return self.reject(state, vec![self.budget_issue(state)]);
            }
            state.pending_user_question = None;
            state.selected_strategy = Some(current);

            let result = strategy::execute(current, self.strategy_context(), state, &options).await;
            let decision = self.validator.validate(&result);
            state.retrieval = Some(result);
            state.record_validation(&decision);
            info!(
                conversation = %state.conversation_id,
                strategy = %current,
                loop_count = state.loop_count(),
                ok = decision.ok(),
                "validated"
            );

            match decision.verdict {
                Verdict::Accept => return TurnOutcome::Accepted,
                Verdict::AskUser(question) => return self.ask(state, question),
                Verdict::Retry(next) if current.fallback() == Some(next) => {
                    if !state.budget_left() {
                        let mut issues = decision.issues;
                        issues.push(self.budget_issue(state));
                        return self.reject(state, issues);
                    }
                    info!(from = %current, to = %next, "retrying with fallback strategy");
                    current = next;
                }
                Verdict::Retry(next) => {
                    debug!(strategy = %current, suggested = %next, "no declared fallback");
                    return self.ask(state, GENERIC_CLARIFICATION.to_string());
                }
                Verdict::Reject => return self.reject(state, decision.issues),
            }
        }
    }

    /// Compose an answer from the conversation's current retrieval.
    pub async fn answer(&self, state: &ConversationState, synthesizer: &dyn Synthesizer) -> Answer {
        let bundle = state
            .retrieval
            .as_ref()
            .map(EvidenceBundle::from_result)
            .unwrap_or_default();
        let strategy = state.selected_strategy.map_or("none", |k| k.as_str());
        compose_answer(
            synthesizer,
            &SynthesisRequest {
                query: &state.query_original,
                strategy,
                evidence: &bundle,
            },
        )
        .await
    }

    fn budget_issue(&self, state: &ConversationState) -> Issue {
        Issue::LoopBudgetExhausted {
            max_loops: state.max_loops(),
        }
    }

    fn ask(&self, state: &mut ConversationState, question: String) -> TurnOutcome {
        info!(conversation = %state.conversation_id, "asking user");
        state.pending_user_question = Some(question.clone());
        TurnOutcome::AskingUser { question }
    }

    fn reject(&self, state: &mut ConversationState, issues: Vec<Issue>) -> TurnOutcome {
        let decision = ValidationDecision::reject(issues);
        state.record_validation(&decision);
        if state.pending_user_question.is_none() {
            state.proposed_strategies = self.analyzer.propose_strategies(&state.query_normalized);
        }
        info!(conversation = %state.conversation_id, issues = ?state.validation_issues, "rejected");
        TurnOutcome::Rejected {
            issues: state.validation_issues.clone(),
        }
    }
}
