//! Parameter autofill for structured query templates.
//!
//! Recognizes three kinds of values in free text:
//!
//! | Value | Pattern | Normalized | Filled params |
//! |-------|---------|------------|---------------|
//! | date range | `DATE ~ DATE` or `DATE - DATE` | `YYYY-MM-DD` | `from_date`/`start_date`, `to_date`/`end_date` |
//! | lot | `LOT`, optional `-`/`_`, id | `LOT<id>` | `lot`, `lot_id` |
//! | line | `LINE<n>` or `라인 <n>` | `LINE<n>` | `line`, `line_id` |
//!
//! A `DATE` is `YYYY-MM-DD` (also `/` or `.` separated, 1–2 digit month
//! and day) or `YYYYMMDD`. A single date that is not part of a range is
//! never used: from/to would be a guess.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

use crate::models::Params;

const DATE: &str = r"\d{4}[-/.]\d{1,2}[-/.]\d{1,2}|\d{8}";

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?:^|[^0-9])({DATE})\s*[~\-]\s*({DATE})(?:$|[^0-9])"
    ))
    .expect("date range regex is valid")
});
static SEPARATED_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").expect("date regex is valid")
});
static COMPACT_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})(\d{2})(\d{2})$").expect("date regex is valid"));
static LOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[^A-Za-z0-9_])LOT(?:[-_]?([0-9A-Za-z]+(?:-[0-9A-Za-z]+)*)|\s+([0-9][0-9A-Za-z]*(?:-[0-9A-Za-z]+)*))",
    )
    .expect("lot regex is valid")
});
static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^A-Za-z0-9_])LINE[-_ ]?(\d{1,3})(?:$|[^0-9])")
        .expect("line regex is valid")
});
static LINE_LOCAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"라인\s*(\d{1,3})(?:$|[^0-9])").expect("line regex is valid"));

/// Normalize one date token to `YYYY-MM-DD`, rejecting impossible dates.
pub fn normalize_date(token: &str) -> Option<String> {
    let token = token.trim();
    let caps = SEPARATED_DATE_RE
        .captures(token)
        .or_else(|| COMPACT_DATE_RE.captures(token))?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// The first explicit `from ~ to` range in `text`.
///
/// Both ends must be valid calendar dates.
pub fn extract_date_range(text: &str) -> Option<(String, String)> {
    let caps = RANGE_RE.captures(text)?;
    let from = normalize_date(&caps[1])?;
    let to = normalize_date(&caps[2])?;
    Some((from, to))
}

pub fn extract_lot(text: &str) -> Option<String> {
    let caps = LOT_RE.captures(text)?;
    let id = caps.get(1).or_else(|| caps.get(2))?;
    Some(format!("LOT{}", id.as_str()))
}

pub fn extract_line(text: &str) -> Option<String> {
    LINE_RE
        .captures(text)
        .or_else(|| LINE_LOCAL_RE.captures(text))
        .map(|caps| format!("LINE{}", &caps[1]))
}

fn is_blank(value: Option<&String>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

/// Fill missing `required` parameters from `text`.
///
/// Caller-supplied non-blank values in `given` are never overwritten.
/// Parameters the text gives no value for are left absent.
pub fn autofill_params(required: &[String], text: &str, given: &Params) -> Params {
    let mut filled = given.clone();
    let range = extract_date_range(text);
    let lot = extract_lot(text);
    let line = extract_line(text);

    for name in required {
        if !is_blank(filled.get(name)) {
            continue;
        }
        let value = match name.as_str() {
            "from_date" | "start_date" => range.as_ref().map(|(from, _)| from.clone()),
            "to_date" | "end_date" => range.as_ref().map(|(_, to)| to.clone()),
            "lot" | "lot_id" => lot.clone(),
            "line" | "line_id" => line.clone(),
            _ => None,
        };
        if let Some(v) = value {
            filled.insert(name.clone(), v);
        }
    }
    filled
}

/// Required names whose resolved value is absent or blank, in declaration order.
pub fn missing_params(required: &[String], params: &Params) -> Vec<String> {
    required
        .iter()
        .filter(|name| is_blank(params.get(*name)))
        .cloned()
        .collect()
}
