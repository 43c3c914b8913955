//! Presentation artifacts derived from structured rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Row;

pub const GRID_ROW_LIMIT: usize = 200;
pub const CHART_ROW_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// A single-series bar chart: first column as category, second as value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarChartSpec {
    pub category_column: String,
    pub value_column: String,
    pub categories: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "spec", rename_all = "snake_case")]
pub enum Artifact {
    Grid(GridSpec),
    BarChart(BarChartSpec),
}

/// Column names in first-seen order across `rows`.
fn columns(rows: &[Row]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !out.contains(key) {
                out.push(key.clone());
            }
        }
    }
    out
}

fn as_category(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn as_number(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// A grid for any non-empty row set, plus a bar chart when there are at
/// least two columns.
pub fn artifacts_for_rows(rows: &[Row]) -> Vec<Artifact> {
    if rows.is_empty() {
        return Vec::new();
    }
    let grid_rows = &rows[..rows.len().min(GRID_ROW_LIMIT)];
    let cols = columns(grid_rows);
    let mut out = Vec::new();

    if let [category, value, ..] = cols.as_slice() {
        let charted = &rows[..rows.len().min(CHART_ROW_LIMIT)];
        out.push(Artifact::BarChart(BarChartSpec {
            category_column: category.clone(),
            value_column: value.clone(),
            categories: charted.iter().map(|r| as_category(r.get(category))).collect(),
            values: charted.iter().map(|r| as_number(r.get(value))).collect(),
        }));
    }
    out.insert(
        0,
        Artifact::Grid(GridSpec {
            columns: cols,
            rows: grid_rows.to_vec(),
        }),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(day: &str, value: Value) -> Row {
        let mut r = Row::new();
        r.insert("day".into(), Value::from(day));
        r.insert("yield".into(), value);
        r
    }

    #[test]
    fn test_grid_and_chart_for_two_columns() {
        let rows = vec![
            row("2026-02-01", Value::from(97.5)),
            row("2026-02-02", Value::from("n/a")),
            row("2026-02-03", Value::from("96.1")),
        ];
        let arts = artifacts_for_rows(&rows);
        assert_eq!(arts.len(), 2);
        match &arts[1] {
            Artifact::BarChart(chart) => {
                assert_eq!(chart.category_column, "day");
                assert_eq!(chart.values, vec![97.5, 0.0, 96.1]);
            }
            other => panic!("expected chart, got {other:?}"),
        }
        let v = serde_json::to_value(&arts[0]).unwrap();
        assert_eq!(v["type"], "grid");
        assert_eq!(v["spec"]["columns"][1], "yield");
    }

    #[test]
    fn test_limits_and_single_column() {
        let many: Vec<Row> = (0..300).map(|i| row(&i.to_string(), Value::from(i))).collect();
        let arts = artifacts_for_rows(&many);
        match (&arts[0], &arts[1]) {
            (Artifact::Grid(g), Artifact::BarChart(c)) => {
                assert_eq!(g.rows.len(), GRID_ROW_LIMIT);
                assert_eq!(c.values.len(), CHART_ROW_LIMIT);
            }
            other => panic!("unexpected artifacts {other:?}"),
        }

        let mut single = Row::new();
        single.insert("only".into(), Value::from(1));
        assert_eq!(artifacts_for_rows(&[single]).len(), 1);
        assert!(artifacts_for_rows(&[]).is_empty());
    }
}
