//! Entry and listing types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Front-matter key holding the creation timestamp.
pub const CREATED_AT: &str = "createdAt";

/// Front-matter key holding the last-update timestamp.
pub const UPDATED_AT: &str = "updatedAt";

/// A content entry, freshly read from storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Directory name of the entry inside its collection.
    pub slug: String,
    /// Collection name.
    pub collection: String,
    /// Front-matter fields, in document order, without timestamps.
    pub fields: Map<String, Value>,
    /// Markdown body.
    pub body: String,
    /// Storage path of the entry document.
    pub file_path: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Field values and body supplied for create and update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryData {
    /// Front-matter fields.
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Markdown body.
    #[serde(default)]
    pub body: String,
}

impl EntryData {
    /// Create entry data.
    #[must_use]
    pub fn new(fields: Map<String, Value>, body: impl Into<String>) -> Self {
        Self {
            fields,
            body: body.into(),
        }
    }

    /// Add or replace a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Listing parameters for [`ContentManager::list_entries`](crate::ContentManager::list_entries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListOptions {
    /// 1-based page number. Values below 1 are treated as 1.
    pub page: usize,
    /// Page size. Values below 1 are treated as 1.
    pub limit: usize,
    /// Field to sort by; `updatedAt` and `createdAt` sort as timestamps.
    pub sort_by: String,
    /// Sort direction.
    pub sort_order: SortOrder,
    /// Case-insensitive substring matched against every field value.
    pub search: Option<String>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 20,
            sort_by: UPDATED_AT.to_owned(),
            sort_order: SortOrder::Desc,
            search: None,
        }
    }
}

impl ListOptions {
    /// Set the page number.
    #[must_use]
    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    /// Set the page size.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the sort field and direction.
    #[must_use]
    pub fn with_sort(mut self, sort_by: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = sort_by.into();
        self.sort_order = order;
        self
    }

    /// Set the search text.
    #[must_use]
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPage {
    /// Entries on this page.
    pub entries: Vec<Entry>,
    /// Number of matching entries before pagination.
    pub total: usize,
    /// Effective page number.
    pub page: usize,
    /// Effective page size.
    pub limit: usize,
}

/// Result of loading one directory of a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryLoad {
    /// The directory holds a readable entry.
    Loaded(Entry),
    /// The directory was skipped.
    Skipped {
        /// Directory name.
        slug: String,
        /// Why it was skipped.
        reason: String,
    },
}

impl EntryLoad {
    /// The loaded entry, if any.
    #[must_use]
    pub fn entry(self) -> Option<Entry> {
        match self {
            Self::Loaded(entry) => Some(entry),
            Self::Skipped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_list_options_default() {
        let options = ListOptions::default();

        assert_eq!(options.page, 1);
        assert_eq!(options.limit, 20);
        assert_eq!(options.sort_by, "updatedAt");
        assert_eq!(options.sort_order, SortOrder::Desc);
        assert!(options.search.is_none());
    }

    #[test]
    fn test_list_options_deserialize_partial() {
        let options: ListOptions =
            serde_json::from_value(json!({"page": 3, "sortOrder": "asc"})).unwrap();

        assert_eq!(options.page, 3);
        assert_eq!(options.limit, 20);
        assert_eq!(options.sort_order, SortOrder::Asc);
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let date = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let entry = Entry {
            slug: "a".to_owned(),
            collection: "posts".to_owned(),
            fields: Map::new(),
            body: String::new(),
            file_path: "posts/a/index.md".to_owned(),
            created_at: date,
            updated_at: date,
        };

        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["filePath"], json!("posts/a/index.md"));
        assert_eq!(value["createdAt"], json!("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_entry_data_with_field() {
        let data = EntryData::default().with_field("title", "A").with_field("draft", true);

        assert_eq!(data.fields["title"], json!("A"));
        assert_eq!(data.fields["draft"], json!(true));
    }

    #[test]
    fn test_entry_load_entry() {
        let skipped = EntryLoad::Skipped {
            slug: "x".to_owned(),
            reason: "no index.md".to_owned(),
        };
        assert!(skipped.entry().is_none());
    }
}
