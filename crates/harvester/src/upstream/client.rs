use std::sync::Arc;
use std::time::Duration;

use super::error::Result;
use super::types::{RepositoryRecord, SearchPage};
use crate::harvest::ProgressCallback;
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpError, HttpRequest, HttpTransport};
use crate::retry::{DEFAULT_BODY_EXCERPT, RetryAfterHeaders, RetryEngine, RetryPolicy};
use crate::shutdown::Shutdown;

pub const DEFAULT_BASE_URL: &str = "https://gitverse.ru/sc/sbt/api/v1";
pub const DEFAULT_SEARCH_PATH: &str = "/repos/search";
pub const DEFAULT_USER_AGENT: &str = "gitverse-scraper/1.0";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the upstream API.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Path of the search listing, relative to `base_url`.
    pub search_path: String,
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Headers consulted for a wait hint on 429.
    pub retry_headers: RetryAfterHeaders,
    /// Bytes of response body quoted in permanent errors.
    pub body_excerpt: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_headers: RetryAfterHeaders::default(),
            body_excerpt: DEFAULT_BODY_EXCERPT,
        }
    }
}

/// Upstream API client.
///
/// Cheap to clone; the transport is shared.
#[derive(Clone)]
pub struct UpstreamClient {
    engine: RetryEngine,
    base_url: String,
    search_path: String,
    user_agent: String,
}

impl UpstreamClient {
    /// Create a client backed by reqwest.
    pub fn new(config: &UpstreamConfig) -> std::result::Result<Self, HttpError> {
        let transport = ReqwestTransport::with_timeout(config.timeout)?;
        Ok(Self::new_with_transport(Arc::new(transport), config))
    }

    pub fn new_with_transport(transport: Arc<dyn HttpTransport>, config: &UpstreamConfig) -> Self {
        let engine = RetryEngine::new(transport, config.retry_headers.clone())
            .with_body_excerpt(config.body_excerpt);
        Self {
            engine,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            search_path: format!("/{}", config.search_path.trim_start_matches('/')),
            user_agent: config.user_agent.clone(),
        }
    }

    /// URL of one search page.
    #[must_use]
    pub fn search_url(&self, page: u32, limit: u32) -> String {
        format!(
            "{}{}?page={page}&limit={limit}",
            self.base_url, self.search_path
        )
    }

    /// URL of one repository's detail record. Spaces are percent-encoded.
    #[must_use]
    pub fn repository_url(&self, full_name: &str) -> String {
        format!("{}/repos/{}", self.base_url, full_name.replace(' ', "%20"))
    }

    fn request(&self, url: String) -> HttpRequest {
        HttpRequest::get(url)
            .with_header("Accept", "application/json")
            .with_header("User-Agent", self.user_agent.as_str())
    }

    /// Total number of repositories in the search index.
    pub async fn fetch_total(
        &self,
        policy: &RetryPolicy,
        shutdown: &Shutdown,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<u64> {
        let page: SearchPage = self
            .engine
            .get_json(
                self.request(self.search_url(1, 1)),
                policy,
                "search total",
                shutdown,
                on_progress,
            )
            .await?;
        Ok(page.total)
    }

    /// Full names listed on one search page.
    pub async fn fetch_page(
        &self,
        page: u32,
        limit: u32,
        policy: &RetryPolicy,
        shutdown: &Shutdown,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<Vec<String>> {
        let label = format!("search page {page}");
        let body: SearchPage = self
            .engine
            .get_json(
                self.request(self.search_url(page, limit)),
                policy,
                &label,
                shutdown,
                on_progress,
            )
            .await?;
        Ok(body.data.into_iter().map(|e| e.full_name).collect())
    }

    /// Detail record for one repository.
    pub async fn fetch_repository(
        &self,
        full_name: &str,
        policy: &RetryPolicy,
        shutdown: &Shutdown,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<RepositoryRecord> {
        self.engine
            .get_json(
                self.request(self.repository_url(full_name)),
                policy,
                full_name,
                shutdown,
                on_progress,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockTransport, header_get};
    use crate::test_support::{BASE, repo_json, response, search_json, test_client};
    use crate::upstream::UpstreamError;

    #[test]
    fn urls_are_built_from_config() {
        let client = test_client(&MockTransport::new());
        assert_eq!(
            client.search_url(3, 50),
            format!("{BASE}/repos/search?page=3&limit=50")
        );
        assert_eq!(
            client.repository_url("acme/my widget"),
            format!("{BASE}/repos/acme/my%20widget")
        );
    }

    #[test]
    fn trailing_and_leading_slashes_are_normalized() {
        let config = UpstreamConfig {
            base_url: "https://example.test/api/".to_string(),
            search_path: "repos/search".to_string(),
            ..UpstreamConfig::default()
        };
        let client = UpstreamClient::new_with_transport(Arc::new(MockTransport::new()), &config);
        assert_eq!(
            client.search_url(1, 1),
            "https://example.test/api/repos/search?page=1&limit=1"
        );
    }

    #[tokio::test]
    async fn fetch_total_reads_total_and_sends_identity_headers() {
        let transport = MockTransport::new();
        let client = test_client(&transport);
        transport.push_response(client.search_url(1, 1), response(200, search_json(101, &["a/b"])));

        let total = client
            .fetch_total(&RetryPolicy::page(), &Shutdown::new(), None)
            .await
            .expect("total");
        assert_eq!(total, 101);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(header_get(&requests[0].headers, "accept"), Some("application/json"));
        assert_eq!(
            header_get(&requests[0].headers, "user-agent"),
            Some(DEFAULT_USER_AGENT)
        );
    }

    #[tokio::test]
    async fn fetch_page_returns_names_in_listing_order() {
        let transport = MockTransport::new();
        let client = test_client(&transport);
        transport.push_response(
            client.search_url(2, 50),
            response(200, search_json(120, &["x/one", "y/two", "z/three"])),
        );

        let names = client
            .fetch_page(2, 50, &RetryPolicy::page(), &Shutdown::new(), None)
            .await
            .expect("page");
        assert_eq!(names, vec!["x/one", "y/two", "z/three"]);
    }

    #[tokio::test]
    async fn fetch_repository_decodes_detail_record() {
        let transport = MockTransport::new();
        let client = test_client(&transport);
        transport.push_response(
            client.repository_url("acme/widget"),
            response(200, repo_json(9, "acme/widget", 33)),
        );

        let record = client
            .fetch_repository("acme/widget", &RetryPolicy::detail(), &Shutdown::new(), None)
            .await
            .expect("record");
        assert_eq!(record.id, 9);
        assert_eq!(record.stars_count, 33);
    }

    #[tokio::test]
    async fn fetch_repository_surfaces_not_found_without_retrying() {
        let transport = MockTransport::new();
        let client = test_client(&transport);
        transport.push_response(
            client.repository_url("gone/away"),
            response(404, serde_json::json!({"message": "not found"})),
        );

        let err = client
            .fetch_repository("gone/away", &RetryPolicy::detail(), &Shutdown::new(), None)
            .await
            .expect_err("404");
        assert!(matches!(err, UpstreamError::Permanent { status: 404, .. }));
        assert_eq!(transport.requests().len(), 1);
    }
}
