//! Configuration file support for harvester.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables: `HARVESTER_` prefix, `__` between section and key
//!    (e.g., `HARVESTER_DATABASE__URL`, `HARVESTER_DETAIL__RATE_PER_SECOND`)
//! 3. Config file (./harvester.toml, then ~/.config/harvester/config.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/harvester/harvester.db` on Linux
//! (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "postgres://localhost/harvester"
//! write_chunk_size = 1000
//!
//! [upstream]
//! base_url = "https://gitverse.ru/sc/sbt/api/v1"
//! timeout_secs = 30
//!
//! [discovery]
//! page_size = 50
//! workers = 10
//! max_pages = 200000
//!
//! [detail]
//! workers = 40
//! rate_per_second = 100
//!
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [export]
//! dir = "dataset/tables"
//!
//! [report]
//! top_n = 10
//! progress_interval_secs = 30
//! ```

use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File, FileFormat};
use directories::ProjectDirs;
use harvester::harvest::{
    DEFAULT_DETAIL_WORKERS, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_WORKERS,
    DEFAULT_PROGRESS_INTERVAL_SECS, DEFAULT_RATE_PER_SECOND, DEFAULT_TOP_N,
    DETAIL_INITIAL_BACKOFF_MS, DETAIL_MAX_ATTEMPTS, DetailOptions, DiscoveryOptions,
    HarvestOptions, MAX_BACKOFF_MS, PAGE_BACKOFF_BASE_MS, PAGE_BACKOFF_JITTER_MS,
    PAGE_MAX_ATTEMPTS,
};
use harvester::repository::{DEFAULT_CHUNK_SIZE, default_write_retry};
use harvester::retry::{Backoff, DEFAULT_BODY_EXCERPT, RetryAfterHeaders, RetryPolicy};
use harvester::upstream::{
    DEFAULT_BASE_URL, DEFAULT_SEARCH_PATH, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
    UpstreamConfig,
};
use serde::Deserialize;

const APP_NAME: &str = "harvester";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub upstream: UpstreamSection,
    pub discovery: DiscoveryConfig,
    pub detail: DetailConfig,
    pub server: ServerConfig,
    pub export: ExportConfig,
    pub report: ReportConfig,
}

/// Database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Supports sqlite:// and postgres:// schemes.
    pub url: Option<String>,
    /// Rows per INSERT during bulk sync.
    pub write_chunk_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            write_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Upstream API settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpstreamSection {
    pub base_url: String,
    pub search_path: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Bytes of an error body quoted in failure messages.
    pub body_excerpt_bytes: usize,
    pub retry_after_seconds_header: String,
    pub retry_after_header: String,
    pub reset_epoch_header: String,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        let headers = RetryAfterHeaders::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            body_excerpt_bytes: DEFAULT_BODY_EXCERPT,
            retry_after_seconds_header: headers.retry_after_seconds,
            retry_after_header: headers.retry_after,
            reset_epoch_header: headers.reset_epoch,
        }
    }
}

/// Search page discovery settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub page_size: u32,
    pub workers: usize,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_jitter_ms: u64,
    /// Largest page count accepted from the index total.
    pub max_pages: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            workers: DEFAULT_PAGE_WORKERS,
            max_attempts: PAGE_MAX_ATTEMPTS,
            backoff_base_ms: PAGE_BACKOFF_BASE_MS,
            backoff_jitter_ms: PAGE_BACKOFF_JITTER_MS,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Detail fetch settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DetailConfig {
    pub workers: usize,
    /// Requests per second shared by all workers.
    pub rate_per_second: u32,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for DetailConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_DETAIL_WORKERS,
            rate_per_second: DEFAULT_RATE_PER_SECOND,
            max_attempts: DETAIL_MAX_ATTEMPTS,
            initial_backoff_ms: DETAIL_INITIAL_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
        }
    }
}

/// Trigger service settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: harvester::server::DEFAULT_BIND.to_string(),
        }
    }
}

/// Export settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(harvester::export::DEFAULT_EXPORT_DIR),
        }
    }
}

/// Reporting settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_n: usize,
    /// Seconds between progress heartbeats. Zero disables them.
    pub progress_interval_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            progress_interval_secs: DEFAULT_PROGRESS_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/harvester/config.toml)
    /// 3. Local config file (./harvester.toml)
    /// 4. Environment variables (see [`Config::environment`])
    ///
    /// A malformed file or value is an error rather than a silent fallback.
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("harvester.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./harvester.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(Self::environment());

        builder.build()?.try_deserialize()
    }

    /// Environment source: `HARVESTER_DETAIL__RATE_PER_SECOND` -> `detail.rate_per_second`.
    ///
    /// Keys contain single underscores, so sections are split on `__`.
    fn environment() -> Environment {
        Environment::with_prefix("HARVESTER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Get the database URL, falling back to the default state directory path.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("harvester.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    pub fn upstream_config(&self) -> UpstreamConfig {
        let upstream = &self.upstream;
        UpstreamConfig {
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            search_path: upstream.search_path.clone(),
            user_agent: upstream.user_agent.clone(),
            timeout: Duration::from_secs(upstream.timeout_secs),
            retry_headers: RetryAfterHeaders {
                retry_after_seconds: upstream.retry_after_seconds_header.clone(),
                retry_after: upstream.retry_after_header.clone(),
                reset_epoch: upstream.reset_epoch_header.clone(),
            },
            body_excerpt: upstream.body_excerpt_bytes,
        }
    }

    pub fn harvest_options(&self) -> HarvestOptions {
        let max_delay = Duration::from_millis(self.detail.max_backoff_ms);
        HarvestOptions {
            discovery: DiscoveryOptions {
                page_size: self.discovery.page_size,
                workers: self.discovery.workers,
                retry: RetryPolicy {
                    max_attempts: self.discovery.max_attempts,
                    backoff: Backoff::Jittered {
                        base: Duration::from_millis(self.discovery.backoff_base_ms),
                        jitter: Duration::from_millis(self.discovery.backoff_jitter_ms),
                    },
                    max_delay,
                },
                max_pages: self.discovery.max_pages,
            },
            detail: DetailOptions {
                workers: self.detail.workers,
                rate_per_second: self.detail.rate_per_second,
                retry: RetryPolicy {
                    max_attempts: self.detail.max_attempts,
                    backoff: Backoff::Doubling {
                        initial: Duration::from_millis(self.detail.initial_backoff_ms),
                    },
                    max_delay,
                },
            },
            progress_interval: Duration::from_secs(self.report.progress_interval_secs),
            write_chunk_size: self.database.write_chunk_size,
            write_retry: default_write_retry(),
            top_n: self.report.top_n,
        }
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.server.bind.parse()
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/harvester` or `~/.local/state/harvester`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}
