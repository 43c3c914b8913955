//! Stored structured-query templates with autofilled parameters.
//!
//! [`prepare`] is the precondition gate: it resolves the template and
//! every declared parameter, failing with an [`Issue`] (wrapped in
//! `anyhow`) when the turn must ask the user instead. The orchestrator
//! calls it before counting an iteration; [`run`] calls it again so the
//! strategy stays self-contained.

use anyhow::Result;

use crate::autofill::{autofill_params, missing_params};
use crate::error::Issue;
use crate::models::{Citation, Params, QueryTemplate, RetrievalResult};
use crate::state::ConversationState;
use crate::store::{Backends, ROW_CAP};

use super::{StrategyContext, StrategyOptions};

/// A template ready to execute.
#[derive(Debug, Clone)]
pub struct PreparedTemplate {
    pub template: QueryTemplate,
    /// Caller bindings merged with autofilled values.
    pub params: Params,
}

/// Resolve the template named in `options` and bind its parameters from
/// `text`.
pub async fn prepare(
    backends: &Backends,
    text: &str,
    options: &StrategyOptions,
) -> Result<PreparedTemplate> {
    let id = options
        .template_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(Issue::MissingTemplateId)?;
    let store = backends
        .templates
        .as_ref()
        .ok_or(Issue::TemplateStoreUnavailable)?;
    let template = store
        .get_template(id)
        .await?
        .ok_or_else(|| Issue::TemplateNotFound(id.to_string()))?;

    let required = template.declared_params();
    let params = autofill_params(&required, text, &options.params);
    let missing = missing_params(&required, &params);
    if !missing.is_empty() {
        return Err(Issue::MissingParameter(missing).into());
    }
    Ok(PreparedTemplate { template, params })
}

pub async fn run(
    ctx: StrategyContext<'_>,
    state: &ConversationState,
    options: &StrategyOptions,
) -> Result<RetrievalResult> {
    let PreparedTemplate { template, params } =
        prepare(ctx.backends, &state.query_normalized, options).await?;
    let store = ctx
        .backends
        .templates
        .as_ref()
        .ok_or(Issue::TemplateStoreUnavailable)?;

    let mut rows = store.run(&template.sql_text, &params).await?;
    rows.truncate(ROW_CAP);

    Ok(RetrievalResult::rows(
        rows,
        vec![Citation::Template {
            template_id: template.id,
            template_name: template.name,
        }],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::store::memory::InMemoryStore;
    use serde_json::Value;
    use std::sync::Arc;

    fn yield_template() -> QueryTemplate {
        QueryTemplate {
            id: "yield_daily".into(),
            name: "Daily yield".into(),
            description: "수율 추이".into(),
            sql_text: "SELECT day, yield FROM yields WHERE day BETWEEN :from_date AND :to_date"
                .into(),
            required_params: vec![],
        }
    }

    fn backends(store: Arc<InMemoryStore>) -> Backends {
        Backends::from_store(store, Arc::new(HashEmbedder::new(16)))
    }

    fn options(template_id: Option<&str>) -> StrategyOptions {
        StrategyOptions {
            template_id: template_id.map(str::to_string),
            ..StrategyOptions::default()
        }
    }

    fn issue_of(err: anyhow::Error) -> Issue {
        err.downcast::<Issue>().expect("precondition issue")
    }

    #[tokio::test]
    async fn test_prepare_autofills_from_query() {
        let store = Arc::new(InMemoryStore::new());
        store.add_template(yield_template(), vec![]);
        let prepared = prepare(
            &backends(store),
            "최근 2026-02-01 ~ 2026-02-25 수율 추이",
            &options(Some("yield_daily")),
        )
        .await
        .unwrap();
        assert_eq!(prepared.params["from_date"], "2026-02-01");
        assert_eq!(prepared.params["to_date"], "2026-02-25");
    }

    #[tokio::test]
    async fn test_prepare_reports_each_precondition() {
        let store = Arc::new(InMemoryStore::new());
        store.add_template(yield_template(), vec![]);
        let b = backends(store);

        let err = prepare(&b, "수율", &options(None)).await.unwrap_err();
        assert_eq!(issue_of(err), Issue::MissingTemplateId);

        let err = prepare(&b, "수율", &options(Some("nope"))).await.unwrap_err();
        assert_eq!(issue_of(err), Issue::TemplateNotFound("nope".into()));

        let err = prepare(&b, "수율 2026-02-01", &options(Some("yield_daily")))
            .await
            .unwrap_err();
        assert_eq!(
            issue_of(err),
            Issue::MissingParameter(vec!["from_date".into(), "to_date".into()])
        );

        let err = prepare(&b.without_templates(), "수율", &options(Some("yield_daily")))
            .await
            .unwrap_err();
        assert_eq!(issue_of(err), Issue::TemplateStoreUnavailable);
    }

    #[tokio::test]
    async fn test_run_returns_rows_with_template_citation() {
        let store = Arc::new(InMemoryStore::new());
        let mut row = serde_json::Map::new();
        row.insert("day".into(), Value::from("2026-02-01"));
        row.insert("yield".into(), Value::from(97.5));
        store.add_template(yield_template(), vec![row]);

        let b = backends(store.clone());
        let state = ConversationState::new("c1", "2026-02-01 ~ 2026-02-25 수율", 3);
        let retrieval = super::super::RetrievalParams::default();
        let graph = crate::graph::SubgraphRetriever::default();
        let ctx = StrategyContext {
            backends: &b,
            retrieval: &retrieval,
            graph: &graph,
        };

        let result = run(ctx, &state, &options(Some("yield_daily"))).await.unwrap();
        assert_eq!(result.kind(), crate::models::RetrievalKind::Rows);
        assert!(!result.is_empty());
        assert_eq!(
            result.citations()[0],
            Citation::Template {
                template_id: "yield_daily".into(),
                template_name: "Daily yield".into(),
            }
        );
        let (_, bound) = &store.executions()[0];
        assert_eq!(bound["to_date"], "2026-02-25");
    }
}
