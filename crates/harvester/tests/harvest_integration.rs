//! End-to-end harvest runs against a scripted upstream and in-memory SQLite.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harvester::harvest::{HarvestOptions, HarvestProgress, TopEntry};
use harvester::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use harvester::upstream::{UpstreamClient, UpstreamConfig};
use harvester::{Harvester, Shutdown, connect_and_migrate, repository};
use serde_json::json;

const BASE: &str = "http://upstream.local/api/v1";

/// Serves fixed responses per URL. Queued one-shot responses are served
/// first; after that the URL's standing response repeats. Unknown URLs
/// get a 404.
#[derive(Default)]
struct ScriptedUpstream {
    standing: Mutex<HashMap<String, HttpResponse>>,
    queued: Mutex<HashMap<String, VecDeque<HttpResponse>>>,
    hits: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    fn serve(&self, url: String, status: u16, body: serde_json::Value) {
        self.standing
            .lock()
            .unwrap()
            .insert(url, response(status, body, Vec::new()));
    }

    fn queue(&self, url: String, response: HttpResponse) {
        self.queued
            .lock()
            .unwrap()
            .entry(url)
            .or_default()
            .push_back(response);
    }

    fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedUpstream {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.hits.lock().unwrap().push(request.url.clone());
        if let Some(next) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(VecDeque::pop_front)
        {
            return Ok(next);
        }
        Ok(self
            .standing
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| response(404, json!({"message": "not found"}), Vec::new())))
    }
}

fn response(status: u16, body: serde_json::Value, headers: Vec<(String, String)>) -> HttpResponse {
    HttpResponse {
        status,
        headers,
        body: serde_json::to_vec(&body).unwrap(),
    }
}

fn repo(id: i64, full_name: &str, stars: i64) -> serde_json::Value {
    json!({
        "id": id,
        "full_name": full_name,
        "created_at": "2022-02-02T10:00:00+03:00",
        "updated_at": "2024-09-09T10:00:00+03:00",
        "archived": false,
        "stars_count": stars,
        "size": 100,
        "release_counter": 0,
        "tag_count": 1,
    })
}

fn search(total: u64, names: &[&str]) -> serde_json::Value {
    let data: Vec<_> = names.iter().map(|n| json!({"fullName": n})).collect();
    json!({"total": total, "data": data})
}

fn client(upstream: &Arc<ScriptedUpstream>) -> UpstreamClient {
    let config = UpstreamConfig {
        base_url: BASE.to_string(),
        ..UpstreamConfig::default()
    };
    UpstreamClient::new_with_transport(upstream.clone(), &config)
}

fn options() -> HarvestOptions {
    let mut options = HarvestOptions {
        progress_interval: Duration::ZERO,
        ..HarvestOptions::default()
    };
    options.discovery.page_size = 2;
    options.detail.rate_per_second = 1000;
    options
}

/// Three repositories over two search pages.
fn three_repo_upstream() -> (Arc<ScriptedUpstream>, UpstreamClient) {
    let upstream = Arc::new(ScriptedUpstream::default());
    let client = client(&upstream);
    upstream.serve(client.search_url(1, 1), 200, search(3, &[]));
    upstream.serve(client.search_url(1, 2), 200, search(3, &["team/low", "team/high"]));
    upstream.serve(client.search_url(2, 2), 200, search(3, &["team/mid"]));
    upstream.serve(client.repository_url("team/low"), 200, repo(1, "team/low", 5));
    upstream.serve(client.repository_url("team/high"), 200, repo(2, "team/high", 20));
    upstream.serve(client.repository_url("team/mid"), 200, repo(3, "team/mid", 1));
    (upstream, client)
}

#[tokio::test]
async fn test_full_run_stores_and_ranks() {
    let (_upstream, client) = three_repo_upstream();
    let db = Arc::new(connect_and_migrate("sqlite::memory:").await.unwrap());

    let report = Harvester::new(client, Arc::clone(&db), options())
        .run(&Shutdown::new())
        .await
        .expect("run");

    assert_eq!(report.total, 3);
    assert_eq!(report.discovered, 3);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.saved, 3);
    assert!(report.failed_pages.is_empty());
    assert_eq!(
        report.top,
        vec![
            TopEntry { full_name: "team/high".into(), stars_count: 20 },
            TopEntry { full_name: "team/low".into(), stars_count: 5 },
            TopEntry { full_name: "team/mid".into(), stars_count: 1 },
        ]
    );

    assert_eq!(repository::count(&db).await.unwrap(), 3);
    let stored_top = repository::top_by_stars(&db, 1).await.unwrap();
    assert_eq!(stored_top[0].full_name, "team/high");
}

#[tokio::test]
async fn test_second_run_does_not_duplicate() {
    let (_upstream, client) = three_repo_upstream();
    let db = Arc::new(connect_and_migrate("sqlite::memory:").await.unwrap());
    let harvester = Harvester::new(client, Arc::clone(&db), options());

    harvester.run(&Shutdown::new()).await.expect("first run");
    harvester.run(&Shutdown::new()).await.expect("second run");

    assert_eq!(repository::count(&db).await.unwrap(), 3);
}

#[tokio::test]
async fn test_rate_limited_repository_is_retried_after_hint() {
    let (upstream, client) = three_repo_upstream();
    let limited = client.repository_url("team/mid");
    upstream.queue(
        limited.clone(),
        response(
            429,
            json!({"message": "slow down"}),
            vec![("Retry-After".to_string(), "1".to_string())],
        ),
    );

    let backoffs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&backoffs);
    let db = Arc::new(connect_and_migrate("sqlite::memory:").await.unwrap());
    let report = Harvester::new(client, db, options())
        .with_progress(Box::new(move |event| {
            if let HarvestProgress::RateLimitBackoff { retry_after_ms, .. } = event {
                sink.lock().unwrap().push(retry_after_ms);
            }
        }))
        .run(&Shutdown::new())
        .await
        .expect("run");

    assert_eq!(report.fetched, 3);
    assert_eq!(report.failed_details, 0);
    assert_eq!(upstream.hits(&limited), 2);
    assert_eq!(*backoffs.lock().unwrap(), vec![1000]);
}

#[tokio::test]
async fn test_missing_repository_is_skipped() {
    let (upstream, client) = three_repo_upstream();
    upstream.serve(client.search_url(2, 2), 200, search(3, &["team/mid", "team/gone"]));
    let db = Arc::new(connect_and_migrate("sqlite::memory:").await.unwrap());

    let report = Harvester::new(client, Arc::clone(&db), options())
        .run(&Shutdown::new())
        .await
        .expect("run");

    assert_eq!(report.discovered, 4);
    assert_eq!(report.fetched, 3);
    assert_eq!(report.failed_details, 1);
    assert_eq!(repository::count(&db).await.unwrap(), 3);
}

#[tokio::test]
async fn test_cancelled_run_saves_what_was_fetched() {
    let (upstream, client) = three_repo_upstream();
    upstream.queue(
        client.repository_url("team/mid"),
        response(503, json!({"message": "busy"}), Vec::new()),
    );

    // One worker per stage keeps the order fixed: team/low, team/high, team/mid.
    let mut options = options();
    options.discovery.workers = 1;
    options.detail.workers = 1;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    let db = Arc::new(connect_and_migrate("sqlite::memory:").await.unwrap());
    let report = Harvester::new(client, Arc::clone(&db), options)
        .with_progress(Box::new(move |event| {
            if let HarvestProgress::RateLimitBackoff { target, .. } = event
                && target == "team/mid"
            {
                trigger.trigger();
            }
        }))
        .run(&shutdown)
        .await
        .expect("partial run");

    assert!(report.cancelled);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.saved, 2);
    assert_eq!(repository::count(&db).await.unwrap(), 2);
    let stored: Vec<_> = repository::list_all(&db)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.full_name)
        .collect();
    assert_eq!(stored, vec!["team/low", "team/high"]);
}
