use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use askdb_core::engine::EngineConfig;
use askdb_core::translate::TranslateOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Data source to connect at startup, e.g. `sqlite:data/company.db`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: default_pool_size(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

fn default_pool_size() -> u32 {
    5
}
fn default_busy_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// SQLite file holding ingested documents.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}
fn default_max_entries() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    #[serde(default = "default_top_n")]
    pub top_n: u64,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            default_limit: default_limit(),
            top_n: default_top_n(),
            history_size: default_history_size(),
        }
    }
}

fn default_page_size() -> usize {
    25
}
fn default_max_page_size() -> usize {
    1000
}
fn default_limit() -> u64 {
    1000
}
fn default_top_n() -> u64 {
    5
}
fn default_history_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive. `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

impl Config {
    /// Engine tunables derived from the `[cache]` and `[query]` sections.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            cache_capacity: self.cache.max_entries,
            default_page_size: self.query.default_page_size,
            max_page_size: self.query.max_page_size,
            history_size: self.query.history_size,
            translate: TranslateOptions {
                default_limit: self.query.default_limit,
                top_n: self.query.top_n,
                ..TranslateOptions::default()
            },
            ..EngineConfig::default()
        }
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

fn validate(config: &Config) -> Result<()> {
    if config.database.pool_size == 0 {
        anyhow::bail!("database.pool_size must be >= 1");
    }

    if config.cache.max_entries == 0 {
        anyhow::bail!("cache.max_entries must be >= 1");
    }
    if config.cache.ttl_secs == 0 {
        anyhow::bail!("cache.ttl_secs must be >= 1");
    }

    let q = &config.query;
    if q.default_page_size == 0 || q.default_page_size > q.max_page_size {
        anyhow::bail!(
            "query.default_page_size must be in [1, {}] (query.max_page_size)",
            q.max_page_size
        );
    }
    if q.top_n == 0 {
        anyhow::bail!("query.top_n must be >= 1");
    }
    if q.default_limit == 0 {
        anyhow::bail!("query.default_limit must be >= 1");
    }

    if let Some(url) = &config.database.url {
        if !url.starts_with("sqlite:") {
            anyhow::bail!(
                "Unsupported database.url '{}'. Only sqlite: URLs are supported.",
                url
            );
        }
    }

    Ok(())
}
