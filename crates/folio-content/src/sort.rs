//! Search and ordering of loaded entries.

use std::cmp::Ordering;

use serde_json::Value;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::entry::{CREATED_AT, Entry, SortOrder, UPDATED_AT};

/// Text form of a field value used for search and sorting.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accent- and case-insensitive key.
fn collation_key(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compare ignoring accents and case first, then exactly.
pub(crate) fn collate(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

/// True if any field value contains `needle`, ignoring case.
pub(crate) fn matches_search(entry: &Entry, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    if needle.is_empty() {
        return true;
    }
    entry
        .fields
        .values()
        .any(|value| value_text(value).to_lowercase().contains(&needle))
}

/// Stable sort by a field name.
pub(crate) fn sort_entries(entries: &mut [Entry], sort_by: &str, order: SortOrder) {
    let compare = |a: &Entry, b: &Entry| match sort_by {
        UPDATED_AT => a.updated_at.cmp(&b.updated_at),
        CREATED_AT => a.created_at.cmp(&b.created_at),
        "slug" => collate(&a.slug, &b.slug),
        field => collate(&field_text(a, field), &field_text(b, field)),
    };
    match order {
        SortOrder::Asc => entries.sort_by(compare),
        SortOrder::Desc => entries.sort_by(|a, b| compare(b, a)),
    }
}

fn field_text(entry: &Entry, field: &str) -> String {
    entry.fields.get(field).map(value_text).unwrap_or_default()
}
