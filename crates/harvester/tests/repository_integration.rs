//! Integration tests for repository storage.
//!
//! These tests require the `sqlite` and `migrate` features to be enabled
//! and use an in-memory SQLite database.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use chrono::{DateTime, FixedOffset, Utc};
use harvester::connect_and_migrate;
use harvester::entity::repository::ActiveModel;
use harvester::export::export_dataset;
use harvester::repository::{self, Pagination, RepositoryError};
use harvester::upstream::RepositoryRecord;
use sea_orm::DatabaseConnection;

async fn setup_test_db() -> DatabaseConnection {
    connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database")
}

fn timestamp(s: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(s).expect("valid timestamp")
}

fn record(id: i64, full_name: &str, stars: i64) -> RepositoryRecord {
    RepositoryRecord {
        id,
        full_name: full_name.to_string(),
        created_at: timestamp("2023-11-02T08:15:00+03:00"),
        updated_at: timestamp("2024-05-20T17:45:00+03:00"),
        archived: false,
        stars_count: stars,
        size: 2048,
        release_counter: 2,
        tag_count: 5,
    }
}

fn models(records: &[RepositoryRecord]) -> Vec<ActiveModel> {
    let synced_at = Utc::now().fixed_offset();
    records
        .iter()
        .map(|r| ActiveModel::from_record(r, synced_at))
        .collect()
}

#[tokio::test]
async fn test_bulk_upsert_inserts_rows() {
    let db = setup_test_db().await;
    let batch = [record(1, "alpha/one", 3), record(2, "beta/two", 8)];

    let written = repository::bulk_upsert(&db, models(&batch), 1000)
        .await
        .expect("bulk upsert");
    assert_eq!(written, 2);
    assert_eq!(repository::count(&db).await.expect("count"), 2);

    let stored = repository::find_by_id(&db, 2).await.expect("row 2");
    assert_eq!(stored.full_name, "beta/two");
    assert_eq!(stored.stars_count, 8);
    assert_eq!(RepositoryRecord::from(stored), batch[1]);
}

#[tokio::test]
async fn test_bulk_upsert_is_idempotent() {
    let db = setup_test_db().await;
    let batch = [record(10, "gamma/x", 1), record(11, "gamma/y", 2), record(12, "gamma/z", 3)];

    repository::bulk_upsert(&db, models(&batch), 2)
        .await
        .expect("first sync");
    repository::bulk_upsert(&db, models(&batch), 2)
        .await
        .expect("second sync");

    assert_eq!(repository::count(&db).await.expect("count"), 3);
}

#[tokio::test]
async fn test_bulk_upsert_replaces_changed_fields() {
    let db = setup_test_db().await;
    repository::bulk_upsert(&db, models(&[record(7, "old/name", 1)]), 1000)
        .await
        .expect("first sync");

    let mut renamed = record(7, "new/name", 42);
    renamed.archived = true;
    repository::bulk_upsert(&db, models(&[renamed]), 1000)
        .await
        .expect("second sync");

    let stored = repository::find_by_id(&db, 7).await.expect("row 7");
    assert_eq!(stored.full_name, "new/name");
    assert_eq!(stored.stars_count, 42);
    assert!(stored.archived);
    assert_eq!(repository::count(&db).await.expect("count"), 1);
}

#[tokio::test]
async fn test_top_by_stars_orders_descending() {
    let db = setup_test_db().await;
    let batch = [
        record(1, "a/low", 5),
        record(2, "b/high", 20),
        record(3, "c/none", 1),
        record(4, "d/tie", 5),
    ];
    repository::bulk_upsert(&db, models(&batch), 1000)
        .await
        .expect("bulk upsert");

    let top = repository::top_by_stars(&db, 3).await.expect("top");
    let names: Vec<_> = top.iter().map(|m| m.full_name.as_str()).collect();
    assert_eq!(names, ["b/high", "a/low", "d/tie"]);
}

#[tokio::test]
async fn test_find_all_paginates_by_id() {
    let db = setup_test_db().await;
    let batch: Vec<_> = (1..=5).map(|i| record(i, &format!("o/r{i}"), i)).collect();
    repository::bulk_upsert(&db, models(&batch), 1000)
        .await
        .expect("bulk upsert");

    let page = repository::find_all(&db, Pagination::new(1, 2))
        .await
        .expect("page");
    assert_eq!(page.total, 5);
    assert_eq!(page.total_pages, 3);
    let ids: Vec<_> = page.items.iter().map(|m| m.id).collect();
    assert_eq!(ids, [3, 4]);
}

#[tokio::test]
async fn test_find_by_id_missing() {
    let db = setup_test_db().await;
    let err = repository::find_by_id(&db, 999).await.expect_err("missing");
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}

#[tokio::test]
async fn test_export_writes_stored_rows() {
    let db = setup_test_db().await;
    repository::bulk_upsert(
        &db,
        models(&[record(2, "b/two", 4), record(1, "a/one", 9)]),
        1000,
    )
    .await
    .expect("bulk upsert");

    let dir = tempfile::tempdir().expect("tempdir");
    let now = timestamp("2025-01-02T03:04:05Z").naive_utc();
    let paths = export_dataset(&db, dir.path(), now).await.expect("export");

    assert_eq!(paths.rows, 2);
    assert!(paths.csv.ends_with("repos_2025-01-02_03-04-05.csv"));
    let text = std::fs::read_to_string(&paths.csv).expect("csv");
    let ids: Vec<_> = text
        .lines()
        .skip(1)
        .filter_map(|l| l.split(',').next())
        .collect();
    assert_eq!(ids, ["1", "2"]);
    assert!(paths.xlsx.exists());
}
