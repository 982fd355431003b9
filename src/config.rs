//! Service configuration: a TOML file overlaid with environment variables.
//!
//! The file is optional; a missing or empty file yields `Config::default()`.
//! Unknown top-level keys are accepted and logged as warnings.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::content::{DomainRule, DomainRules};
use crate::feed::HandlerSettings;
use crate::http::HttpSettings;
use crate::scheduler::SchedulerSettings;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file; `:memory:` for a throwaway database.
    pub database_path: PathBuf,
    pub worker: WorkerConfig,
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub scraper: ScraperConfig,
    /// Replaces the built-in rewrite domain table when non-empty.
    pub rewrite_rules: Vec<DomainRule>,
    /// Replaces the built-in scraper domain table when non-empty.
    pub scraper_rules: Vec<DomainRule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub pool_size: usize,
    /// Jobs that may wait in the queue before the scheduler blocks.
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub polling_frequency_minutes: u64,
    pub batch_size: usize,
    /// 0 = never stop polling failing feeds.
    pub polling_parsing_error_limit: i64,
    pub cleanup_frequency_hours: u64,
    pub cleanup_archive_read_days: u32,
    pub cleanup_remove_sessions_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
    pub max_body_size: usize,
    pub user_agent: String,
    pub allow_private_networks: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Scrape entries with less visible text than this; 0 = only crawler feeds.
    pub min_content_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("rivulet.db"),
            worker: WorkerConfig::default(),
            scheduler: SchedulerConfig::default(),
            http: HttpConfig::default(),
            scraper: ScraperConfig::default(),
            rewrite_rules: Vec::new(),
            scraper_rules: Vec::new(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: 5,
            queue_capacity: 100,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            polling_frequency_minutes: 60,
            batch_size: 10,
            polling_parsing_error_limit: 3,
            cleanup_frequency_hours: 24,
            cleanup_archive_read_days: 60,
            cleanup_remove_sessions_days: 30,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        let http = HttpSettings::default();
        Self {
            timeout_seconds: http.timeout.as_secs(),
            max_body_size: http.max_body_size,
            user_agent: http.user_agent,
            allow_private_networks: http.allow_private_networks,
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "worker",
    "scheduler",
    "http",
    "scraper",
    "rewrite_rules",
    "scraper_rules",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content)
    }

    /// Parse TOML text. Blank text yields the defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            database = %config.database_path.display(),
            workers = config.worker.pool_size,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides looked up through `lookup`; blank values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        };

        if let Some((_, v)) = get("RIVULET_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("WORKER_POOL_SIZE") {
            self.worker.pool_size = number(v)?;
        }
        if let Some(v) = get("POLLING_FREQUENCY") {
            self.scheduler.polling_frequency_minutes = number(v)?;
        }
        if let Some(v) = get("BATCH_SIZE") {
            self.scheduler.batch_size = number(v)?;
        }
        if let Some(v) = get("POLLING_PARSING_ERROR_LIMIT") {
            self.scheduler.polling_parsing_error_limit = number(v)?;
        }
        if let Some(v) = get("CLEANUP_FREQUENCY_HOURS") {
            self.scheduler.cleanup_frequency_hours = number(v)?;
        }
        if let Some(v) = get("CLEANUP_ARCHIVE_READ_DAYS") {
            self.scheduler.cleanup_archive_read_days = number(v)?;
        }
        if let Some(v) = get("CLEANUP_REMOVE_SESSIONS_DAYS") {
            self.scheduler.cleanup_remove_sessions_days = number(v)?;
        }
        if let Some(v) = get("HTTP_CLIENT_TIMEOUT") {
            self.http.timeout_seconds = number(v)?;
        }
        if let Some(v) = get("HTTP_CLIENT_MAX_BODY_SIZE") {
            self.http.max_body_size = number(v)?;
        }
        if let Some((_, v)) = get("HTTP_CLIENT_USER_AGENT") {
            self.http.user_agent = v;
        }

        Ok(())
    }

    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.http.timeout_seconds.max(1)),
            max_body_size: self.http.max_body_size,
            user_agent: self.http.user_agent.clone(),
            allow_private_networks: self.http.allow_private_networks,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            polling_frequency: Duration::from_secs(self.scheduler.polling_frequency_minutes * 60),
            batch_size: self.scheduler.batch_size,
            error_limit: self.scheduler.polling_parsing_error_limit,
            cleanup_frequency: Duration::from_secs(self.scheduler.cleanup_frequency_hours * 3600),
            archive_read_days: self.scheduler.cleanup_archive_read_days,
            remove_sessions_days: self.scheduler.cleanup_remove_sessions_days,
        }
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            min_content_length: self.scraper.min_content_length,
        }
    }

    pub fn rewrite_domain_rules(&self) -> DomainRules {
        if self.rewrite_rules.is_empty() {
            DomainRules::default_rewrite()
        } else {
            DomainRules::new(self.rewrite_rules.clone())
        }
    }

    pub fn scraper_domain_rules(&self) -> DomainRules {
        if self.scraper_rules.is_empty() {
            DomainRules::default_scraper()
        } else {
            DomainRules::new(self.scraper_rules.clone())
        }
    }
}

fn number<T: std::str::FromStr>((name, value): (&'static str, String)) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

// ============================================================================
// Tests
// ============================================================================
