//! Fixtures shared by unit tests.

use std::sync::Arc;

use crate::http::{HttpResponse, MockTransport};
use crate::upstream::{UpstreamClient, UpstreamConfig};

pub(crate) const BASE: &str = "https://upstream.test/api/v1";

pub(crate) fn response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: Vec::new(),
        body: serde_json::to_vec(&body).unwrap_or_default(),
    }
}

pub(crate) fn search_json(total: u64, names: &[&str]) -> serde_json::Value {
    let data: Vec<_> = names
        .iter()
        .map(|n| serde_json::json!({ "fullName": n }))
        .collect();
    serde_json::json!({ "total": total, "data": data })
}

pub(crate) fn repo_json(id: i64, full_name: &str, stars: i64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "full_name": full_name,
        "created_at": "2024-01-15T09:30:00+03:00",
        "updated_at": "2024-06-01T12:00:00Z",
        "archived": false,
        "stars_count": stars,
        "size": 512,
        "release_counter": 1,
        "tag_count": 2,
    })
}

pub(crate) fn test_client(transport: &MockTransport) -> UpstreamClient {
    let config = UpstreamConfig {
        base_url: BASE.to_string(),
        ..UpstreamConfig::default()
    };
    UpstreamClient::new_with_transport(Arc::new(transport.clone()), &config)
}
