//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - config.toml (default configuration)
//! - config.local.toml (git-ignored local overrides)
//! - Environment variables (QUERYLANE_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! [http]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [query]
//! max_queries = 500
//! query_timeout_ms = 60000
//!
//! [pagination]
//! max_rows = 5000
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! QUERYLANE_HTTP__PORT=9090
//! QUERYLANE_PAGINATION__MAX_ROWS=100
//! ```

use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::query::RegistryConfig;

const ENV_PREFIX: &str = "QUERYLANE_";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Allowed CORS origins (empty = same-origin only, unless cors_allow_all is true)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Explicitly allow all CORS origins (dev mode opt-in)
    #[serde(default)]
    pub cors_allow_all: bool,

    /// Maximum accepted statement body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Base URL advertised in `nextUri` links, e.g. when behind a proxy.
    /// Falls back to the request `Host` header, then to host:port.
    #[serde(default)]
    pub public_url: Option<String>,
}

/// Query lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Maximum number of queued or running statements (0 = unlimited)
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Statement execution timeout in milliseconds. 0 = no timeout.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    /// How long a cancel waits for the runner before force-removing
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,

    /// Finished statements are evicted after this many seconds
    #[serde(default = "default_result_retention_secs")]
    pub result_retention_secs: u64,

    /// Interval between eviction sweeps. 0 = never sweep.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

/// Result page bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    /// Rows per page (0 = unlimited)
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Serialized bytes per page (0 = unlimited). A page always holds at least one row.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional log file; logs go to stdout when unset
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_max_body_bytes() -> usize {
    1_048_576 // 1 MB
}
fn default_max_queries() -> usize {
    1000
}
fn default_query_timeout_ms() -> u64 {
    0
}
fn default_cancel_timeout_ms() -> u64 {
    5_000
}
fn default_result_retention_secs() -> u64 {
    3600
}
fn default_reaper_interval_secs() -> u64 {
    60
}
fn default_max_rows() -> usize {
    1000
}
fn default_max_bytes() -> usize {
    1_048_576
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. config.toml (base configuration)
    /// 2. config.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (QUERYLANE_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }
}

impl HttpConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl QueryConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }

    pub fn result_retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_secs)
    }

    pub fn reaper_interval(&self) -> Option<Duration> {
        (self.reaper_interval_secs > 0).then(|| Duration::from_secs(self.reaper_interval_secs))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_queries: self.max_queries,
            cancel_timeout: Duration::from_millis(self.cancel_timeout_ms),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            cors_origins: Vec::new(),
            cors_allow_all: false,
            max_body_bytes: default_max_body_bytes(),
            public_url: None,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            max_queries: default_max_queries(),
            query_timeout_ms: default_query_timeout_ms(),
            cancel_timeout_ms: default_cancel_timeout_ms(),
            result_retention_secs: default_result_retention_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        PaginationConfig {
            max_rows: default_max_rows(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}
