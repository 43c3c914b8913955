//! Multi-channel sweep with a judge loop.
//!
//! Each round queries the vector, graph and (when a proposed template's
//! parameters resolve) structured channels, merges everything into one
//! [`EvidenceBundle`], and asks the synthesizer for a judgment. While the
//! judgment asks for more and names an improvement, the improvement is
//! appended to the working query and another round runs. Rounds are
//! bounded by `sweep_rounds` and each one consumes a loop iteration.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Issue;
use crate::orchestrator::Orchestrator;
use crate::state::ConversationState;
use crate::strategy::{self, template, StrategyKind, StrategyOptions};
use crate::synthesis::{compose_answer, Answer, EvidenceBundle, SynthesisRequest, Synthesizer};
use crate::text::normalize_query;

/// What one sweep round collected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRound {
    pub round: u32,
    pub query: String,
    pub chunk_hits: usize,
    pub graph_nodes: usize,
    pub rows: usize,
    pub template_id: Option<String>,
    pub need_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub rounds: Vec<SweepRound>,
    pub answer: Answer,
}

impl Orchestrator {
    /// Sweep every channel for `state`'s query and compose an answer.
    ///
    /// Fails with [`Issue::AwaitingUser`] while a question is pending and
    /// no follow-up is given, and with [`Issue::LoopBudgetExhausted`] when
    /// not even one round fits the budget.
    pub async fn sweep(
        &self,
        state: &mut ConversationState,
        synthesizer: &dyn Synthesizer,
        followup: Option<&str>,
    ) -> Result<SweepReport, Issue> {
        let followup = followup.map(str::trim).filter(|f| !f.is_empty());
        if state.pending_user_question.is_some() && followup.is_none() {
            return Err(Issue::AwaitingUser);
        }
        if let Some(f) = followup {
            state.append_followup(f);
        }
        if !state.budget_left() {
            return Err(Issue::LoopBudgetExhausted {
                max_loops: state.max_loops(),
            });
        }
        state.pending_user_question = None;

        let max_rounds = self.params().sweep_rounds.max(1);
        let mut working = state.query_normalized.clone();
        let mut rounds = Vec::new();

        loop {
            let counted = state.begin_iteration();
            debug_assert!(counted, "budget is checked before every round");
            let round = rounds.len() as u32 + 1;

            let mut probe = state.clone();
            probe.query_normalized = normalize_query(&working);
            let (bundle, template_id) = self.collect(&probe).await;

            let answer = compose_answer(
                synthesizer,
                &SynthesisRequest {
                    query: &probe.query_normalized,
                    strategy: "sweep",
                    evidence: &bundle,
                },
            )
            .await;

            rounds.push(SweepRound {
                round,
                query: probe.query_normalized.clone(),
                chunk_hits: bundle.chunks.len(),
                graph_nodes: bundle.subgraph.nodes.len(),
                rows: bundle.rows.len(),
                template_id,
                need_more: answer.judgment.need_more,
            });
            state.validation_ok = !bundle.is_empty();
            state.validation_issues = if bundle.is_empty() {
                vec![Issue::EmptyEvidence.to_string()]
            } else {
                Vec::new()
            };
            info!(
                conversation = %state.conversation_id,
                round,
                loop_count = state.loop_count(),
                need_more = answer.judgment.need_more,
                "sweep round judged"
            );

            let next = answer
                .judgment
                .improve_request
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .filter(|_| answer.judgment.need_more && round < max_rounds && state.budget_left())
                .map(str::to_string);
            match next {
                Some(request) => {
                    debug!(improve = %request, "refining sweep query");
                    working = format!("{working} {request}");
                }
                None => return Ok(SweepReport { rounds, answer }),
            }
        }
    }

    /// Run every channel once and merge the results.
    async fn collect(&self, probe: &ConversationState) -> (EvidenceBundle, Option<String>) {
        let ctx = self.strategy_context();
        let scoped = StrategyOptions::default();
        let mut bundle = EvidenceBundle::default();

        for kind in [StrategyKind::Vector, StrategyKind::Graph] {
            let result = strategy::execute(kind, ctx, probe, &scoped).await;
            bundle.absorb(&result);
        }

        let mut used_template = None;
        for candidate in &probe.proposed_templates {
            let options = StrategyOptions {
                template_id: Some(candidate.template.id.clone()),
                ..StrategyOptions::default()
            };
            let Ok(prepared) =
                template::prepare(self.backends(), &probe.query_normalized, &options).await
            else {
                continue;
            };
            let options = StrategyOptions {
                params: prepared.params,
                ..options
            };
            let result =
                strategy::execute(StrategyKind::StructuredTemplate, ctx, probe, &options).await;
            bundle.absorb(&result);
            used_template = Some(candidate.template.id.clone());
            break;
        }

        (bundle, used_template)
    }
}
