//! # Evidence Harness
//!
//! A local-first evidence retrieval orchestrator for operational Q&A.
//!
//! A question is planned into candidate retrieval strategies (semantic
//! chunks, hybrid reranking, templated SQL, knowledge-graph expansion).
//! Each turn runs one strategy, grades the evidence, and either accepts
//! it, retries with a fallback strategy, or asks the user a clarifying
//! question, within a fixed loop budget per conversation.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────────────────────┐   ┌──────────┐
//! │   CLI    │──▶│ Assistant                    │──▶│  SQLite  │
//! │  (evh)   │   │  ConversationStore           │   │ chunks   │
//! └──────────┘   │  Orchestrator (core crate)   │   │ graph    │
//!                │  Embedder / Synthesizer      │   │ templates│
//!                └──────────────┬───────────────┘   └──────────┘
//!                               ▼
//!                       OpenAI-compatible API
//!                         (optional)
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! evh init                                  # create database
//! evh load ./seed.json                      # documents, graph, templates
//! evh plan "LOT_A 불량 원인"                 # proposals only
//! evh ask "LOT_A 불량 원인" --strategy graph --answer
//! evh sweep "2026-02-01~2026-02-07 LINE2 수율 추이"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite implementation of the store traits |
//! | [`seed`] | Seed file loading |
//! | [`embedding`] | Embedding providers |
//! | [`synthesis`] | Synthesizer providers |
//! | [`sessions`] | Per-conversation locking and TTL eviction |
//! | [`assistant`] | The conversation service |

pub mod assistant;
pub mod config;
pub mod db;
pub mod embedding;
pub mod migrate;
pub mod openai;
pub mod seed;
pub mod sessions;
pub mod sqlite_store;
pub mod synthesis;
