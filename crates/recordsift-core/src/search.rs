//! Pattern search over a user's records.
//!
//! The query string is used verbatim as a case-insensitive regular
//! expression; regex metacharacters are not escaped. Every record of every
//! dataset the user owns is serialized to compact JSON and scanned left to
//! right for non-overlapping matches.
//!
//! Patterns follow ECMAScript conventions where they differ from the
//! `regex` crate: lookaround and backreferences are accepted, and `\w`,
//! `\d` and `\b` are ASCII-only. A `[` inside a character class is a
//! literal.
//!
//! # Ranking
//!
//! 1. Matches whose text equals the query exactly come first.
//! 2. Within each class, matches sort by their text under root-locale
//!    collation: case and accents only break ties, lowercase first.
//! 3. Remaining ties keep discovery order (dataset order, record order,
//!    position in the record). The sort is stable.
//!
//! There is no relevance score.

use std::cmp::Ordering;

use fancy_regex::{Regex, RegexBuilder};
use icu_collator::{Collator, CollatorOptions};
use serde::Serialize;
use thiserror::Error;

use crate::store::Store;

/// Compiled-size ceiling for user-supplied patterns.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

const WORD: &str = "0-9A-Za-z_";
// Complement of WORD, minus U+017F and U+212A which case-fold into it.
const NOT_WORD: &str = r"\x00-\x2F\x3A-\x40\x5B-\x5E\x60\x7B-\x{17E}\x{180}-\x{2129}\x{212B}-\x{10FFFF}";
const DIGIT: &str = "0-9";
const NOT_DIGIT: &str = r"\x00-\x2F\x3A-\x{10FFFF}";
const WORD_BOUNDARY: &str =
    "(?:(?<=[0-9A-Za-z_])(?![0-9A-Za-z_])|(?<![0-9A-Za-z_])(?=[0-9A-Za-z_]))";
const NOT_WORD_BOUNDARY: &str =
    "(?:(?<=[0-9A-Za-z_])(?=[0-9A-Za-z_])|(?<![0-9A-Za-z_])(?![0-9A-Za-z_]))";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is missing or not a string")]
    MissingQuery,
    #[error("invalid search pattern: {0}")]
    InvalidPattern(fancy_regex::Error),
    #[error("search pattern failed while matching: {0}")]
    Evaluation(fancy_regex::Error),
    #[error("failed to serialize record data: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// One located occurrence of the pattern inside a record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub dataset_name: String,
    pub record_name: String,
    /// Char offset of the first matched character in the serialized record.
    pub start: usize,
    /// Char offset one past the last matched character.
    pub end: usize,
    pub query: String,
    #[serde(rename = "match")]
    pub matched: String,
}

/// A match position inside one text, before it is attributed to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Rewrite the ASCII-only escapes into explicit classes and lookarounds.
fn translate_pattern(query: &str) -> String {
    let mut out = String::with_capacity(query.len() + 16);
    let mut chars = query.chars();
    let mut in_class = false;

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let Some(next) = chars.next() else {
                    out.push('\\');
                    break;
                };
                match (next, in_class) {
                    ('w', false) => out.push_str(&format!("[{}]", WORD)),
                    ('w', true) => out.push_str(WORD),
                    ('W', false) => out.push_str(&format!("[{}]", NOT_WORD)),
                    ('W', true) => out.push_str(NOT_WORD),
                    ('d', false) => out.push_str(&format!("[{}]", DIGIT)),
                    ('d', true) => out.push_str(DIGIT),
                    ('D', false) => out.push_str(&format!("[{}]", NOT_DIGIT)),
                    ('D', true) => out.push_str(NOT_DIGIT),
                    ('b', false) => out.push_str(WORD_BOUNDARY),
                    ('b', true) => out.push_str(r"\x08"),
                    ('B', false) => out.push_str(NOT_WORD_BOUNDARY),
                    ('B', true) => out.push('B'),
                    (other, _) => {
                        out.push('\\');
                        out.push(other);
                    }
                }
            }
            '[' if in_class => out.push_str(r"\["),
            '[' => {
                in_class = true;
                out.push('[');
            }
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            other => out.push(other),
        }
    }

    out
}

/// Compile a raw query into a case-insensitive pattern.
pub fn compile_pattern(query: &str) -> Result<Regex, SearchError> {
    RegexBuilder::new(&format!("(?i){}", translate_pattern(query)))
        .delegate_size_limit(PATTERN_SIZE_LIMIT)
        .build()
        .map_err(SearchError::InvalidPattern)
}

/// All non-overlapping matches of `pattern` in `text`, left to right, with
/// char (not byte) offsets. Empty matches are reported and skipped over.
pub fn find_matches(pattern: &Regex, text: &str) -> Result<Vec<Span>, SearchError> {
    let mut spans = Vec::new();
    let mut byte_pos = 0;
    let mut char_pos = 0;

    for m in pattern.find_iter(text) {
        let m = m.map_err(SearchError::Evaluation)?;
        char_pos += text[byte_pos..m.start()].chars().count();
        let len = m.as_str().chars().count();
        spans.push(Span {
            start: char_pos,
            end: char_pos + len,
            text: m.as_str().to_string(),
        });
        char_pos += len;
        byte_pos = m.end();
    }

    Ok(spans)
}

// Used only if the root collation data cannot be loaded.
fn caseless_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Order matches: exact hits first, then by collated matched text. Stable.
pub fn rank_matches(matches: &mut [Match]) {
    let collator = Collator::try_new(&Default::default(), CollatorOptions::new()).ok();
    matches.sort_by(|a, b| {
        let exact_a = a.matched == a.query;
        let exact_b = b.matched == b.query;
        exact_b.cmp(&exact_a).then_with(|| match &collator {
            Some(collator) => collator.compare(&a.matched, &b.matched),
            None => caseless_cmp(&a.matched, &b.matched),
        })
    });
}

/// Search every record owned by `user_id` for `query`.
///
/// `None` or an empty query is rejected before the pattern is compiled.
/// A user without datasets, or without any hit, gets an empty list.
pub async fn search_records<S: Store + ?Sized>(
    store: &S,
    user_id: i64,
    query: Option<&str>,
) -> Result<Vec<Match>, SearchError> {
    let query = match query {
        Some(q) if !q.is_empty() => q,
        _ => return Err(SearchError::MissingQuery),
    };
    let pattern = compile_pattern(query)?;

    let mut matches = Vec::new();
    for dataset in store.list_datasets(user_id).await? {
        for record in store.list_records(dataset.id).await? {
            let text = serde_json::to_string(&record.data_json)?;
            for span in find_matches(&pattern, &text)? {
                matches.push(Match {
                    dataset_name: dataset.name.clone(),
                    record_name: record.name.clone(),
                    start: span.start,
                    end: span.end,
                    query: query.to_string(),
                    matched: span.text,
                });
            }
        }
    }

    rank_matches(&mut matches);
    Ok(matches)
}
