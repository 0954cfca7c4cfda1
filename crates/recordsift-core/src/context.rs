//! Question context assembly.
//!
//! A dataset's records are flattened into one string and cut down so that
//! question plus context never exceed [`MAX_CONTEXT_CHARS`] characters. Only
//! the context is ever shortened.

use crate::models::Record;

/// Combined character budget for question and context.
pub const MAX_CONTEXT_CHARS: usize = 1000;

/// Text form of a record's data: string values are used as-is, anything
/// else is serialized to compact JSON.
pub fn serialize_data(data: &serde_json::Value) -> String {
    match data {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Join every record's text with a single space, in the given order.
pub fn build_context(records: &[Record]) -> String {
    records
        .iter()
        .map(|r| serialize_data(&r.data_json))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep the first `MAX_CONTEXT_CHARS - len(question)` characters of
/// `context` when the pair is over budget. A question at or above the
/// budget leaves an empty context.
pub fn truncate_context(question: &str, context: &str) -> String {
    let question_len = question.chars().count();
    let context_len = context.chars().count();

    if question_len + context_len <= MAX_CONTEXT_CHARS {
        return context.to_string();
    }

    let allowed = MAX_CONTEXT_CHARS.saturating_sub(question_len);
    context.chars().take(allowed).collect()
}
