//! SQLite backend against a temporary database.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use evidence_harness::assistant::Assistant;
use evidence_harness::config::{load_config, Config};
use evidence_harness::seed::{load_seed, SeedFile};
use evidence_harness::sqlite_store::SqliteStore;
use evidence_harness::{db, migrate};
use evidence_harness_core::embedding::{Embedder, HashEmbedder};
use evidence_harness_core::models::Params;
use evidence_harness_core::store::{ChunkIndex, GraphStore, TemplateStore, ROW_CAP};
use evidence_harness_core::{ExecuteRequest, TurnOutcome};

const SEED: &str = r#"{
  "setup_sql": "CREATE TABLE IF NOT EXISTS daily_yield (day TEXT, line TEXT, yield REAL, note TEXT); DELETE FROM daily_yield; INSERT INTO daily_yield VALUES ('2026-02-01', 'LINE2', 97.5, NULL), ('2026-02-02', 'LINE2', 96.75, 'recipe change'), ('2026-02-02', 'LINE3', 91.0, NULL), ('2026-03-01', 'LINE2', 99.0, NULL); CREATE TABLE IF NOT EXISTS numbers (n INTEGER); DELETE FROM numbers; WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 250) INSERT INTO numbers SELECT n FROM seq;",
  "documents": [
    {
      "id": "sop-7",
      "title": "Etch SOP",
      "chunks": [
        { "text": "Line 2 etch chamber cleaning procedure", "meta": { "page": 3 } },
        { "text": "Escalate repeated particle defects to the process owner" }
      ]
    },
    { "id": "memo-1", "chunks": [{ "text": "Quarterly yield review notes" }] }
  ],
  "nodes": [
    { "id": "lot_a", "label": "LOT_A" },
    { "id": "defect_x", "label": "DEFECT_X", "properties": { "severity": "high" } },
    { "id": "eq_7", "label": "Etcher 7" }
  ],
  "edges": [
    { "id": "e1", "src_id": "lot_a", "dst_id": "defect_x", "relation": "has_defect" },
    { "id": "e2", "src_id": "eq_7", "dst_id": "lot_a", "relation": "processed" }
  ],
  "templates": [
    {
      "id": "yield_daily",
      "name": "Daily yield",
      "description": "일자별 수율 추이",
      "sql_text": "SELECT day, line, yield, note FROM daily_yield WHERE line = :line AND day BETWEEN :from_date AND :to_date ORDER BY day;"
    },
    {
      "id": "numbers",
      "name": "Numbers",
      "sql_text": "SELECT n FROM numbers ORDER BY n"
    }
  ]
}"#;

fn setup() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let config_path: PathBuf = tmp.path().join("evh.toml");
    fs::write(
        &config_path,
        format!(
            "[db]\npath = \"{}/data/evh.sqlite\"\n\n[embedding]\nprovider = \"hash\"\ndims = 32\n",
            tmp.path().display()
        ),
    )
    .unwrap();
    let config = load_config(&config_path).unwrap();
    (tmp, config)
}

async fn seeded_store(config: &Config) -> SqliteStore {
    migrate::run_migrations(config).await.unwrap();
    migrate::run_migrations(config).await.unwrap();

    let pool = db::connect(config).await.unwrap();
    let store = SqliteStore::new(pool);
    let seed: SeedFile = serde_json::from_str(SEED).unwrap();
    let report = load_seed(&store, &HashEmbedder::new(32), &seed).await.unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.chunks, 3);
    assert_eq!(report.templates, 2);
    store
}

#[tokio::test]
async fn test_seed_counts_and_reload_replaces_chunks() {
    let (_tmp, config) = setup();
    let store = seeded_store(&config).await;

    let seed: SeedFile = serde_json::from_str(SEED).unwrap();
    load_seed(&store, &HashEmbedder::new(32), &seed).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.documents, 2);
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.embedded, 3);
    assert_eq!(stats.graph_nodes, 3);
    assert_eq!(stats.graph_edges, 2);
    assert_eq!(stats.templates, 2);
}

#[tokio::test]
async fn test_vector_search_ranks_scopes_and_carries_title() {
    let (_tmp, config) = setup();
    let store = seeded_store(&config).await;

    let query = HashEmbedder::new(32)
        .embed("Line 2 etch chamber cleaning procedure")
        .await
        .unwrap();
    let hits = store.vector_search(&query, 2, None).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].similarity > 0.999);
    assert!(hits[0].distance.abs() < 1e-3);
    assert_eq!(hits[0].document_id, "sop-7");
    assert_eq!(hits[0].meta["title"], "Etch SOP");
    assert_eq!(hits[0].meta["page"], 3);

    let scoped = store.vector_search(&query, 10, Some("memo-1")).await.unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].document_id, "memo-1");
    assert!(!scoped[0].meta.contains_key("title"));
}

#[tokio::test]
async fn test_template_run_binds_named_params_and_types_values() {
    let (_tmp, config) = setup();
    let store = seeded_store(&config).await;

    let template = store.get_template("yield_daily").await.unwrap().unwrap();
    assert_eq!(template.declared_params(), vec!["from_date", "line", "to_date"]);

    let params = Params::from([
        ("line".to_string(), "LINE2".to_string()),
        ("from_date".to_string(), "2026-02-01".to_string()),
        ("to_date".to_string(), "2026-02-28".to_string()),
    ]);
    let rows = store.run(&template.sql_text, &params).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["day"], "2026-02-01");
    assert_eq!(rows[0]["yield"], 97.5);
    assert_eq!(rows[0]["note"], Value::Null);
    assert_eq!(rows[1]["note"], "recipe change");
    let columns: Vec<&str> = rows[0].keys().map(String::as_str).collect();
    assert_eq!(columns, vec!["day", "line", "yield", "note"]);

    let missing = Params::from([("line".to_string(), "LINE2".to_string())]);
    let err = store.run(&template.sql_text, &missing).await.unwrap_err();
    assert!(err.to_string().contains(":from_date"));
}

#[tokio::test]
async fn test_template_run_caps_rows() {
    let (_tmp, config) = setup();
    let store = seeded_store(&config).await;

    let rows = store
        .run("SELECT n FROM numbers ORDER BY n", &Params::new())
        .await
        .unwrap();
    assert_eq!(rows.len(), ROW_CAP);
    assert_eq!(rows[0]["n"], 1);
}

#[tokio::test]
async fn test_params_json_object_form() {
    let (_tmp, config) = setup();
    let store = seeded_store(&config).await;

    sqlx::query(
        "INSERT INTO query_templates (id, name, sql_text, params_json) VALUES ('by_lot', 'By lot', 'SELECT 1', '{\"required\": [\"lot\"]}')",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let template = store.get_template("by_lot").await.unwrap().unwrap();
    assert_eq!(template.required_params, vec!["lot"]);
    assert_eq!(store.list_templates().await.unwrap().len(), 3);
    assert!(store.get_template("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_graph_queries() {
    let (_tmp, config) = setup();
    let store = seeded_store(&config).await;

    let found = store.find_nodes_by_label_substring("lot", 10).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "lot_a");
    assert!(store
        .find_nodes_by_label_substring("", 10)
        .await
        .unwrap()
        .is_empty());

    let edges = store
        .neighbors(&["lot_a".to_string()], 10)
        .await
        .unwrap();
    let ids: Vec<&str> = edges.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["e1", "e2"]);
    assert_eq!(store.neighbors(&["lot_a".to_string()], 1).await.unwrap().len(), 1);

    let node = store.get_node("defect_x").await.unwrap().unwrap();
    assert_eq!(node.properties["severity"], "high");
    assert!(store.get_node("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_assistant_runs_template_turn_against_sqlite() {
    let (_tmp, config) = setup();
    let store = seeded_store(&config).await;
    store.pool().close().await;

    let assistant = Arc::new(Assistant::from_config(&config).await.unwrap());
    let state = assistant
        .start("2026-02-01 ~ 2026-02-28 LINE2 수율 추이")
        .await
        .unwrap();
    assert_eq!(state.proposed_templates[0].template.id, "yield_daily");

    let mut request = ExecuteRequest::new("structured_template");
    request.options.template_id = Some("yield_daily".into());
    let turn = assistant
        .execute(&state.conversation_id, &request)
        .await
        .unwrap();
    assert_eq!(turn.outcome, TurnOutcome::Accepted);

    let answer = assistant.answer(&state.conversation_id).await.unwrap();
    assert_eq!(answer.artifacts.len(), 2);

    let graph = assistant
        .execute(&state.conversation_id, &ExecuteRequest::new("graph"))
        .await
        .unwrap();
    assert_eq!(graph.state.loop_count(), 2);
}
