//! End-of-run star ranking.

use serde::Serialize;

use crate::upstream::RepositoryRecord;

/// One line of the star ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopEntry {
    pub full_name: String,
    pub stars_count: i64,
}

/// The `n` most-starred records, descending. Ties are broken by id so the
/// ranking is stable across runs.
#[must_use]
pub fn rank_by_stars<'a>(
    records: impl IntoIterator<Item = &'a RepositoryRecord>,
    n: usize,
) -> Vec<TopEntry> {
    let mut ranked: Vec<&RepositoryRecord> = records.into_iter().collect();
    ranked.sort_by(|a, b| b.stars_count.cmp(&a.stars_count).then(a.id.cmp(&b.id)));
    ranked
        .into_iter()
        .take(n)
        .map(|r| TopEntry {
            full_name: r.full_name.clone(),
            stars_count: r.stars_count,
        })
        .collect()
}

/// Render the ranking as numbered lines: `1) owner/name: 20 stars`.
#[must_use]
pub fn format_top(entries: &[TopEntry]) -> Vec<String> {
    entries
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}) {}: {} stars", i + 1, e.full_name, e.stars_count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn record(id: i64, name: &str, stars: i64) -> RepositoryRecord {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").expect("valid date");
        RepositoryRecord {
            id,
            full_name: name.to_string(),
            created_at: ts,
            updated_at: ts,
            archived: false,
            stars_count: stars,
            size: 0,
            release_counter: 0,
            tag_count: 0,
        }
    }

    #[test]
    fn ranks_descending_and_truncates() {
        let records = vec![
            record(1, "a/low", 1),
            record(2, "b/high", 20),
            record(3, "c/mid", 5),
        ];
        let top = rank_by_stars(&records, 2);
        assert_eq!(
            top.iter().map(|e| e.full_name.as_str()).collect::<Vec<_>>(),
            vec!["b/high", "c/mid"]
        );
    }

    #[test]
    fn ties_break_by_id() {
        let records = vec![record(9, "z/late", 3), record(4, "y/early", 3)];
        let top = rank_by_stars(&records, 10);
        assert_eq!(top[0].full_name, "y/early");
    }

    #[test]
    fn format_numbers_from_one() {
        let lines = format_top(&[
            TopEntry {
                full_name: "b/high".to_string(),
                stars_count: 20,
            },
            TopEntry {
                full_name: "c/mid".to_string(),
                stars_count: 5,
            },
        ]);
        assert_eq!(lines, vec!["1) b/high: 20 stars", "2) c/mid: 5 stars"]);
    }
}
