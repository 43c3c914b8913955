//! The conversation service: one orchestrator, one synthesizer, and the
//! conversation store, wired from configuration.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use evidence_harness_core::models::TemplateSummary;
use evidence_harness_core::store::Backends;
use evidence_harness_core::sweep::SweepReport;
use evidence_harness_core::synthesis::{Answer, Synthesizer};
use evidence_harness_core::{ConversationState, ExecuteRequest, Orchestrator, TurnOutcome};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::migrate;
use crate::sessions::ConversationStore;
use crate::sqlite_store::SqliteStore;
use crate::synthesis::create_synthesizer;

/// A turn's outcome together with the state it left behind.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    #[serde(flatten)]
    pub outcome: TurnOutcome,
    pub state: ConversationState,
}

pub struct Assistant {
    orchestrator: Orchestrator,
    synthesizer: Arc<dyn Synthesizer>,
    conversations: ConversationStore,
}

impl Assistant {
    pub fn new(
        orchestrator: Orchestrator,
        synthesizer: Arc<dyn Synthesizer>,
        conversations: ConversationStore,
    ) -> Self {
        Self {
            orchestrator,
            synthesizer,
            conversations,
        }
    }

    /// Open the database (migrating it if needed) and build every
    /// collaborator named in `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        let store = Arc::new(SqliteStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        let synthesizer = create_synthesizer(&config.synthesis)?;

        let orchestrator = Orchestrator::new(
            Backends::from_store(store, embedder),
            config.orchestrator_params(),
        );
        let conversations =
            ConversationStore::new(Duration::from_secs(config.conversations.ttl_secs));
        Ok(Self::new(orchestrator, synthesizer, conversations))
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Plan a new conversation and store it.
    pub async fn start(&self, query: &str) -> Result<ConversationState> {
        self.conversations.evict_expired();
        let id = Uuid::new_v4().to_string();
        let state = self.orchestrator.plan(&id, query).await;
        self.conversations.put(state);
        info!(conversation = %id, "conversation started");
        Ok(self.conversations.get(&id).await?)
    }

    pub async fn execute(&self, id: &str, request: &ExecuteRequest) -> Result<TurnReport> {
        let mut state = self.conversations.lock(id).await?;
        let outcome = self.orchestrator.execute(&mut state, request).await;
        state.bump_version();
        Ok(TurnReport {
            outcome,
            state: state.clone(),
        })
    }

    pub async fn answer(&self, id: &str) -> Result<Answer> {
        let state = self.conversations.lock(id).await?;
        Ok(self
            .orchestrator
            .answer(&state, self.synthesizer.as_ref())
            .await)
    }

    pub async fn sweep(&self, id: &str, followup: Option<&str>) -> Result<SweepReport> {
        let mut state = self.conversations.lock(id).await?;
        let report = self
            .orchestrator
            .sweep(&mut state, self.synthesizer.as_ref(), followup)
            .await;
        state.bump_version();
        Ok(report?)
    }

    pub async fn snapshot(&self, id: &str) -> Result<ConversationState> {
        Ok(self.conversations.get(id).await?)
    }

    /// Summaries of every stored template; empty without a template store.
    pub async fn templates(&self) -> Result<Vec<TemplateSummary>> {
        let Some(store) = &self.orchestrator.backends().templates else {
            return Ok(Vec::new());
        };
        let templates = store.list_templates().await?;
        Ok(templates.iter().map(|t| t.summary()).collect())
    }
}
