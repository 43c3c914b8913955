use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn evh_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("evh");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/evh.sqlite"

[retrieval]
max_loops = 3

[embedding]
provider = "hash"
dims = 32
"#,
        root.display()
    );
    let config_path = config_dir.join("evh.toml");
    fs::write(&config_path, config_content).unwrap();

    fs::write(
        root.join("seed.json"),
        r#"{
  "setup_sql": "CREATE TABLE IF NOT EXISTS daily_yield (day TEXT, yield REAL); INSERT INTO daily_yield VALUES ('2026-02-01', 97.5), ('2026-02-02', 96.8);",
  "documents": [
    { "id": "sop-7", "title": "Etch SOP", "chunks": [{ "text": "etch chamber cleaning procedure" }] }
  ],
  "nodes": [{ "id": "lot_a", "label": "LOT_A" }, { "id": "defect_x", "label": "DEFECT_X" }],
  "edges": [{ "id": "e1", "src_id": "lot_a", "dst_id": "defect_x", "relation": "has_defect" }],
  "templates": [{
    "id": "yield_daily",
    "name": "Daily yield",
    "description": "일자별 수율 추이",
    "sql_text": "SELECT day, yield FROM daily_yield WHERE day BETWEEN :from_date AND :to_date ORDER BY day"
  }]
}"#,
    )
    .unwrap();

    (tmp, config_path)
}

fn run_evh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = evh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run evh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_json(config_path: &Path, args: &[&str]) -> Value {
    let (stdout, stderr, success) = run_evh(config_path, args);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({e}): {stdout}"))
}

fn seeded() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    run_json(&config_path, &["init"]);
    let seed = tmp.path().join("seed.json");
    let report = run_json(&config_path, &["load", seed.to_str().unwrap()]);
    assert_eq!(report["chunks"], 1);
    assert_eq!(report["templates"], 1);
    (tmp, config_path)
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let first = run_json(&config_path, &["init"]);
    assert_eq!(first["status"], "initialized");
    let second = run_json(&config_path, &["init"]);
    assert_eq!(second["status"], "initialized");
}

#[test]
fn test_invalid_config_fails() {
    let (tmp, _) = setup_test_env();
    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[db]\npath = \"x.sqlite\"\n[retrieval]\ntop_k = 0\n").unwrap();

    let (_, stderr, success) = run_evh(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("retrieval.top_k"));
}

#[test]
fn test_stats_and_templates() {
    let (_tmp, config_path) = seeded();

    let stats = run_json(&config_path, &["stats"]);
    assert_eq!(stats["counts"]["documents"], 1);
    assert_eq!(stats["counts"]["graph_edges"], 1);

    let templates = run_json(&config_path, &["templates"]);
    assert_eq!(templates[0]["id"], "yield_daily");
    assert_eq!(templates[0]["required_params"][0], "from_date");
}

#[test]
fn test_plan_proposes_template_first() {
    let (_tmp, config_path) = seeded();

    let state = run_json(&config_path, &["plan", "2026-02-01 ~ 2026-02-07 수율 추이"]);
    assert_eq!(state["proposed_strategies"][0]["key"], "structured_template");
    assert_eq!(state["proposed_templates"][0]["id"], "yield_daily");
    assert_eq!(state["validation_ok"], false);
}

#[test]
fn test_ask_template_with_answer() {
    let (_tmp, config_path) = seeded();

    let out = run_json(
        &config_path,
        &[
            "ask",
            "2026-02-01 ~ 2026-02-07 수율 추이",
            "--strategy",
            "sql_template",
            "--template",
            "yield_daily",
            "--answer",
        ],
    );
    assert_eq!(out["turn"]["status"], "accepted");
    assert_eq!(out["turn"]["state"]["retrieval"]["kind"], "rows");
    assert_eq!(out["answer"]["source"], "synthesized");
    assert_eq!(out["answer"]["artifacts"][0]["type"], "grid");
}

#[test]
fn test_ask_explicit_params_and_unknown_strategy() {
    let (_tmp, config_path) = seeded();

    let out = run_json(
        &config_path,
        &[
            "ask",
            "daily yield",
            "--strategy",
            "template",
            "--template",
            "yield_daily",
            "--param",
            "from_date=2026-02-02",
            "--param",
            "to_date=2026-02-02",
        ],
    );
    assert_eq!(out["turn"]["status"], "accepted");
    assert_eq!(out["turn"]["state"]["retrieval"]["payload"][0]["yield"], 96.8);
    assert!(out["answer"].is_null());

    let rejected = run_json(&config_path, &["ask", "anything", "--strategy", "magic"]);
    assert_eq!(rejected["turn"]["status"], "rejected");
    assert_eq!(rejected["turn"]["issues"][0], "unknown strategy: magic");
}

#[test]
fn test_bad_param_syntax_is_a_usage_error() {
    let (_tmp, config_path) = seeded();

    let (_, stderr, success) = run_evh(
        &config_path,
        &["ask", "q", "--strategy", "template", "--param", "no_equals"],
    );
    assert!(!success);
    assert!(stderr.contains("expected name=value"));
}

#[test]
fn test_graph_turn_and_sweep() {
    let (_tmp, config_path) = seeded();

    let out = run_json(&config_path, &["ask", "LOT_A 불량 원인", "--strategy", "graph"]);
    assert_eq!(out["turn"]["status"], "accepted");
    assert_eq!(out["turn"]["state"]["retrieval"]["kind"], "graph");

    let sweep = run_json(&config_path, &["sweep", "LOT_A 불량 원인"]);
    assert_eq!(sweep["sweep"]["rounds"][0]["graph_nodes"], 2);
    assert_eq!(sweep["state"]["loop_count"], 1);
}
