//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::events::{StepCatalog, ZonePolicy};
use crate::store::{RemoteConfig, DEFAULT_REPLICA_TIMEOUT_MS};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which local backend holds the capped event log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(ConfigError::Invalid(format!("Unknown store backend: {}", other))),
        }
    }
}

/// Event store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Maximum retained events; 0 disables the cap
    #[serde(default = "default_cap")]
    pub cap: usize,

    #[serde(default = "default_replica_timeout")]
    pub replica_timeout_ms: u64,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_data_dir() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("quizpulse").to_string_lossy().to_string())
        .unwrap_or_else(|| "./quizpulse_data".to_string())
}

fn default_cap() -> usize {
    10_000
}

fn default_replica_timeout() -> u64 {
    DEFAULT_REPLICA_TIMEOUT_MS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
            cap: default_cap(),
            replica_timeout_ms: default_replica_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn cap(&self) -> Option<usize> {
        (self.cap > 0).then_some(self.cap)
    }

    /// Data directory with a leading `~/` expanded
    pub fn data_path(&self) -> PathBuf {
        match (self.data_dir.strip_prefix("~/"), dirs::home_dir()) {
            (Some(rest), Some(home)) => home.join(rest),
            _ => PathBuf::from(&self.data_dir),
        }
    }
}

/// Remote event table configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_table")]
    pub table: String,

    #[serde(default = "default_remote_timeout")]
    pub timeout_ms: u64,

    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

fn default_table() -> String {
    "quiz_events".to_string()
}

fn default_remote_timeout() -> u64 {
    5000
}

fn default_fetch_limit() -> usize {
    10_000
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            api_key: String::new(),
            table: default_table(),
            timeout_ms: default_remote_timeout(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

impl RemoteSection {
    /// Client settings when the remote table is enabled and addressable
    pub fn client_config(&self) -> Option<RemoteConfig> {
        if !self.enabled || self.url.trim().is_empty() {
            return None;
        }
        Some(RemoteConfig {
            base_url: self.url.clone(),
            api_key: self.api_key.clone(),
            table: self.table.clone(),
            request_timeout_ms: self.timeout_ms,
            fetch_limit: self.fetch_limit,
        })
    }
}

/// API server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Shared secret for the retrieval, dashboard and export endpoints
    #[serde(default)]
    pub dashboard_secret: Option<String>,

    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8086
}

fn default_max_batch() -> usize {
    10_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec!["http://localhost:3000".to_string()],
            dashboard_secret: None,
            max_batch: default_max_batch(),
        }
    }
}

impl ApiConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Aggregation settings
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Offset east of UTC for calendar dates and hours of day
    #[serde(default)]
    pub utc_offset_minutes: i32,

    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Overrides the last catalog index as the terminal step
    #[serde(default)]
    pub terminal_step: Option<u32>,

    /// Replaces the reference step names, index i naming step i
    #[serde(default)]
    pub step_names: Option<Vec<String>>,
}

fn default_recent_limit() -> usize {
    crate::analytics::DEFAULT_RECENT_LIMIT
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            recent_limit: default_recent_limit(),
            terminal_step: None,
            step_names: None,
        }
    }
}

impl AnalyticsConfig {
    pub fn zone(&self) -> Result<ZonePolicy, ConfigError> {
        ZonePolicy::from_offset_minutes(self.utc_offset_minutes)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn catalog(&self) -> StepCatalog {
        let catalog = match &self.step_names {
            Some(names) => StepCatalog::new(names.iter().cloned()),
            None => StepCatalog::reference(),
        };
        match self.terminal_step {
            Some(step) => catalog.terminal(step),
            None => catalog,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("quizpulse").join("config.toml")),
            Some(PathBuf::from("/etc/quizpulse/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `QUIZPULSE_*` overrides from an arbitrary lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Store overrides
        if let Some(backend) = lookup("QUIZPULSE_STORE_BACKEND") {
            match backend.parse() {
                Ok(b) => self.store.backend = b,
                Err(e) => tracing::warn!("Ignoring QUIZPULSE_STORE_BACKEND: {}", e),
            }
        }
        if let Some(data_dir) = lookup("QUIZPULSE_DATA_DIR") {
            self.store.data_dir = data_dir;
        }
        if let Some(cap) = lookup("QUIZPULSE_STORE_CAP").and_then(|c| c.parse().ok()) {
            self.store.cap = cap;
        }

        // Remote overrides; a URL alone switches the remote table on
        if let Some(url) = lookup("QUIZPULSE_REMOTE_URL") {
            self.remote.enabled = !url.trim().is_empty();
            self.remote.url = url;
        }
        if let Some(key) = lookup("QUIZPULSE_REMOTE_KEY") {
            self.remote.api_key = key;
        }

        // API overrides
        if let Some(host) = lookup("QUIZPULSE_API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = lookup("QUIZPULSE_API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
        if let Some(secret) =
            lookup("QUIZPULSE_DASHBOARD_SECRET").or_else(|| lookup("DASHBOARD_PASSWORD"))
        {
            self.api.dashboard_secret = Some(secret).filter(|s| !s.is_empty());
        }

        // Analytics overrides
        if let Some(offset) = lookup("QUIZPULSE_UTC_OFFSET_MINUTES").and_then(|o| o.parse().ok()) {
            self.analytics.utc_offset_minutes = offset;
        }

        // Logging overrides
        if let Some(level) = lookup("QUIZPULSE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("QUIZPULSE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# QuizPulse Configuration
#
# Environment variables override these settings:
# - QUIZPULSE_STORE_BACKEND
# - QUIZPULSE_DATA_DIR
# - QUIZPULSE_STORE_CAP
# - QUIZPULSE_REMOTE_URL
# - QUIZPULSE_REMOTE_KEY
# - QUIZPULSE_API_HOST
# - QUIZPULSE_API_PORT
# - QUIZPULSE_DASHBOARD_SECRET (or DASHBOARD_PASSWORD)
# - QUIZPULSE_UTC_OFFSET_MINUTES
# - QUIZPULSE_LOG_LEVEL
# - QUIZPULSE_LOG_FORMAT

[store]
# Local event log: "sqlite" (persistent) or "memory"
backend = "sqlite"

# Directory for the SQLite database
data_dir = "~/.local/share/quizpulse"

# Maximum retained events, oldest evicted first (0 = unbounded)
cap = 10000

# How long an append waits on each replica (ms)
replica_timeout_ms = 5000

[remote]
# Mirror events to a remote PostgREST-style table
enabled = false

# Service base URL, e.g. "https://project.example.co"
url = ""

# API key sent as apikey and bearer token
api_key = ""

# Table holding quiz events
table = "quiz_events"

# Request timeout (ms)
timeout_ms = 5000

# Maximum rows per fetch
fetch_limit = 10000

[api]
# API server host
host = "0.0.0.0"

# API server port
port = 8086

# Allowed CORS origins
cors_origins = ["http://localhost:3000"]

# Shared secret for events, dashboard and export reads.
# Without one, every gated request is rejected.
# dashboard_secret = "change-me"

# Maximum events per batch ingest
max_batch = 10000

[analytics]
# Offset east of UTC (minutes) for dates and hours, e.g. -180 for UTC-3
utc_offset_minutes = 0

# Events listed in the recent feed
recent_limit = 50

# Optional terminal step (defaults to the last catalog step)
# terminal_step = 18

# Optional custom step names, index i naming step i
# step_names = ["Intro", "Goal", "Body type"]

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
