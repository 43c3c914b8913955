//! Query text utilities: normalization, keyword extraction, overlap scoring.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9A-Za-z가-힣_]+").expect("token regex is valid"));
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^:]):([A-Za-z_][A-Za-z0-9_]*)").expect("placeholder regex is valid")
});

/// Particles, request verbs, and filler words that never make useful
/// keywords.
const STOPWORDS: &[&str] = &[
    "은", "는", "이", "가", "을", "를", "에", "의", "와", "과", "로", "으로", "및", "등", "좀",
    "더", "해줘", "알려줘", "어떻게", "왜", "무엇", "뭐", "정리", "설명", "관련", "대해", "대한",
    "the", "and", "for", "with", "what", "how", "why", "about", "show", "me", "of", "in", "on",
    "is", "are", "to", "a", "an",
];

/// Default minimum keyword length in characters.
pub const MIN_KEYWORD_LEN: usize = 2;

/// Trim and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    WHITESPACE_RE.replace_all(query.trim(), " ").into_owned()
}

/// Extract up to `max_n` lowercase keywords, in first-seen order.
///
/// Tokens are runs of ASCII alphanumerics, underscores, or Hangul
/// syllables. Tokens shorter than [`MIN_KEYWORD_LEN`] characters and
/// stopwords are dropped; duplicates keep their first position.
pub fn extract_keywords(text: &str, max_n: usize) -> Vec<String> {
    let lowered = normalize_query(text).to_lowercase();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for m in TOKEN_RE.find_iter(&lowered) {
        let token = m.as_str();
        if token.chars().count() < MIN_KEYWORD_LEN || STOPWORDS.contains(&token) {
            continue;
        }
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
            if out.len() >= max_n {
                break;
            }
        }
    }
    out
}

/// Fraction of `keywords` that occur (case-insensitively) in `text`.
///
/// Returns `0.0` when there are no keywords.
pub fn overlap_score(keywords: &[String], text: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let lowered = text.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|k| lowered.contains(k.to_lowercase().as_str()))
        .count();
    hits as f64 / keywords.len() as f64
}

/// `:name` placeholders in a SQL text, in order of appearance
/// (duplicates included). `::type` casts are not placeholders.
pub fn placeholder_names(sql: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(sql)
        .map(|c| c[2].to_string())
        .collect()
}

/// Rewrite `:name` placeholders to positional `?` markers.
///
/// Returns the rewritten SQL and the parameter name for each marker, in
/// binding order.
pub fn compile_placeholders(sql: &str) -> (String, Vec<String>) {
    let order = placeholder_names(sql);
    let compiled = PLACEHOLDER_RE.replace_all(sql, "${1}?").into_owned();
    (compiled, order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_query("  yield \n\t trend  "), "yield trend");
    }

    #[test]
    fn test_keywords_drop_stopwords_and_short_tokens() {
        let kws = extract_keywords("LOT_A 불량 원인 알려줘 a x", 10);
        assert_eq!(kws, vec!["lot_a", "불량", "원인"]);
    }

    #[test]
    fn test_keywords_dedup_and_cap() {
        let kws = extract_keywords("alpha beta alpha gamma delta", 3);
        assert_eq!(kws, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_overlap_score() {
        let kws = vec!["yield".to_string(), "line".to_string()];
        assert!((overlap_score(&kws, "Daily YIELD report") - 0.5).abs() < 1e-9);
        assert_eq!(overlap_score(&[], "anything"), 0.0);
    }

    #[test]
    fn test_placeholders_skip_casts() {
        let names = placeholder_names("SELECT x::text FROM t WHERE a = :from_date AND b = :to_date");
        assert_eq!(names, vec!["from_date", "to_date"]);
    }

    #[test]
    fn test_compile_placeholders_keeps_order_and_repeats() {
        let (sql, order) =
            compile_placeholders("SELECT d::date FROM y WHERE d >= :from AND (:from <= d OR l = :line)");
        assert_eq!(sql, "SELECT d::date FROM y WHERE d >= ? AND (? <= d OR l = ?)");
        assert_eq!(order, vec!["from", "from", "line"]);
    }
}
