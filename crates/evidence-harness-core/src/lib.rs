//! # Evidence Harness Core
//!
//! Retrieval-strategy orchestration for operational question answering:
//! strategy proposal, strategy dispatch, result-quality validation,
//! bounded retry/escalation, graph traversal, and hybrid fusion.
//!
//! This crate contains no tokio, sqlx, network, or filesystem
//! dependencies. Storage, embedding, and language-model synthesis are
//! consumed through the traits in [`store`], [`embedding`], and
//! [`synthesis`].
//!
//! ```text
//!  QueryAnalyzer ──▶ Orchestrator ──▶ Strategy ──▶ RetrievalValidator
//!                        ▲   │            │                │
//!                        │   │     ┌──────┴───────┐        │
//!                        │   │     │ Vector       │        │
//!                        │   │     │ Template ◀── ParamAutofill
//!                        │   │     │ Graph    ◀── SubgraphRetriever
//!                        │   │     │ Hybrid   ◀── HybridReranker
//!                        │   │     └──────────────┘        │
//!                        └───┴──── retry / ask-user ◀──────┘
//! ```

pub mod analyzer;
pub mod artifacts;
pub mod autofill;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod models;
pub mod orchestrator;
pub mod rerank;
pub mod state;
pub mod store;
pub mod strategy;
pub mod sweep;
pub mod synthesis;
pub mod text;
pub mod validate;

pub use error::Issue;
pub use orchestrator::{ExecuteRequest, Orchestrator, OrchestratorParams, TurnOutcome};
pub use state::ConversationState;
pub use strategy::StrategyKind;
