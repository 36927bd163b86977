//! Upstream API data types.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// One repository's detail record, as returned by `GET /repos/{full_name}`.
///
/// Only the fields we persist are declared; everything else in the payload
/// is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    /// Upstream identifier. Sole key across runs.
    pub id: i64,
    /// `owner/name`.
    pub full_name: String,
    pub created_at: DateTime<FixedOffset>,
    pub updated_at: DateTime<FixedOffset>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub stars_count: i64,
    /// Size as reported upstream (KiB).
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub release_counter: i64,
    #[serde(default)]
    pub tag_count: i64,
}

/// Body of `GET /repos/search`.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub data: Vec<SearchEntry>,
}

/// One hit in a search page. Only the name is used.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchEntry {
    #[serde(rename = "fullName")]
    pub full_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ignores_unknown_fields() {
        let json = r#"{
            "id": 42,
            "name": "widget",
            "full_name": "acme/widget",
            "description": "ignored",
            "created_at": "2024-03-01T10:00:00+03:00",
            "updated_at": "2024-05-01T12:30:00Z",
            "archived": true,
            "stars_count": 17,
            "size": 2048,
            "release_counter": 3,
            "tag_count": 5
        }"#;
        let record: RepositoryRecord = serde_json::from_str(json).expect("decode");
        assert_eq!(record.id, 42);
        assert_eq!(record.full_name, "acme/widget");
        assert!(record.archived);
        assert_eq!(record.stars_count, 17);
        assert_eq!(record.created_at.offset().local_minus_utc(), 3 * 3600);
    }

    #[test]
    fn record_defaults_missing_counters_to_zero() {
        let json = r#"{
            "id": 1,
            "full_name": "a/b",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z"
        }"#;
        let record: RepositoryRecord = serde_json::from_str(json).expect("decode");
        assert!(!record.archived);
        assert_eq!(record.stars_count, 0);
        assert_eq!(record.tag_count, 0);
    }

    #[test]
    fn search_page_reads_camel_case_names() {
        let json = r#"{"total": 101, "data": [{"fullName": "a/one", "id": 1}, {"fullName": "b/two"}]}"#;
        let page: SearchPage = serde_json::from_str(json).expect("decode");
        assert_eq!(page.total, 101);
        let names: Vec<_> = page.data.into_iter().map(|e| e.full_name).collect();
        assert_eq!(names, vec!["a/one", "b/two"]);
    }
}
