use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the pagemerge binary.
///
/// Every variable is optional; unset or blank variables fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// `PAGEMERGE_MIN_CONFIDENCE` (default `0.7`).
    pub min_confidence: f64,
    /// `PAGEMERGE_SIMILARITY_THRESHOLD` (default `0.85`).
    pub similarity_threshold: f64,
    /// `PAGEMERGE_OVERLAP_THRESHOLD` (default `0.5`).
    pub overlap_threshold: f64,
    /// `PAGEMERGE_MAX_CHUNK_SIZE` in words (default `1000`).
    pub max_chunk_size: usize,
    /// `PAGEMERGE_MIN_CHUNK_SIZE`; defaults to a quarter of the maximum.
    pub min_chunk_size: Option<usize>,
    /// `PAGEMERGE_CHUNK_OVERLAP`; defaults to a tenth of the maximum.
    pub chunk_overlap: Option<usize>,
    /// `PAGEMERGE_RESPECT_PARAGRAPHS` (default `true`).
    pub respect_paragraphs: bool,
    /// `PAGEMERGE_TASK_TIMEOUT_SECS` (default `30`).
    pub task_timeout_secs: u64,
    /// `PAGEMERGE_DOCUMENT_TIMEOUT_SECS` (unset means no document deadline).
    pub document_timeout_secs: Option<u64>,
    /// `PAGEMERGE_MAX_PARALLELISM` (default `4`).
    pub max_parallelism: usize,
    /// `PAGEMERGE_QUALITY_THRESHOLD` (default `0.5`).
    pub quality_threshold: f64,
    /// `PAGEMERGE_OCR_URL`: base URL of a remote OCR service.
    pub ocr_url: Option<String>,
    /// `PAGEMERGE_LAYOUT_URL`: base URL of a remote layout-analysis service.
    pub layout_url: Option<String>,
    /// `PAGEMERGE_HTTP_MAX_RETRIES` (default `2`).
    pub http_max_retries: u32,
    /// `PAGEMERGE_HTTP_RETRY_BACKOFF_MS` (default `250`).
    pub http_retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            similarity_threshold: 0.85,
            overlap_threshold: 0.5,
            max_chunk_size: 1000,
            min_chunk_size: None,
            chunk_overlap: None,
            respect_paragraphs: true,
            task_timeout_secs: 30,
            document_timeout_secs: None,
            max_parallelism: 4,
            quality_threshold: 0.5,
            ocr_url: None,
            layout_url: None,
            http_max_retries: 2,
            http_retry_backoff_ms: 250,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            min_confidence: parse_or("PAGEMERGE_MIN_CONFIDENCE", defaults.min_confidence)?,
            similarity_threshold: parse_or(
                "PAGEMERGE_SIMILARITY_THRESHOLD",
                defaults.similarity_threshold,
            )?,
            overlap_threshold: parse_or("PAGEMERGE_OVERLAP_THRESHOLD", defaults.overlap_threshold)?,
            max_chunk_size: parse_or("PAGEMERGE_MAX_CHUNK_SIZE", defaults.max_chunk_size)?,
            min_chunk_size: parse_optional("PAGEMERGE_MIN_CHUNK_SIZE")?,
            chunk_overlap: parse_optional("PAGEMERGE_CHUNK_OVERLAP")?,
            respect_paragraphs: load_env_optional("PAGEMERGE_RESPECT_PARAGRAPHS")
                .map(|value| {
                    parse_bool(&value).ok_or_else(|| {
                        ConfigError::InvalidValue("PAGEMERGE_RESPECT_PARAGRAPHS".to_string())
                    })
                })
                .transpose()?
                .unwrap_or(defaults.respect_paragraphs),
            task_timeout_secs: parse_or("PAGEMERGE_TASK_TIMEOUT_SECS", defaults.task_timeout_secs)?,
            document_timeout_secs: parse_optional("PAGEMERGE_DOCUMENT_TIMEOUT_SECS")?,
            max_parallelism: parse_or("PAGEMERGE_MAX_PARALLELISM", defaults.max_parallelism)?,
            quality_threshold: parse_or("PAGEMERGE_QUALITY_THRESHOLD", defaults.quality_threshold)?,
            ocr_url: load_env_optional("PAGEMERGE_OCR_URL"),
            layout_url: load_env_optional("PAGEMERGE_LAYOUT_URL"),
            http_max_retries: parse_or("PAGEMERGE_HTTP_MAX_RETRIES", defaults.http_max_retries)?,
            http_retry_backoff_ms: parse_or(
                "PAGEMERGE_HTTP_RETRY_BACKOFF_MS",
                defaults.http_retry_backoff_ms,
            )?,
        })
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        min_confidence = config.min_confidence,
        max_chunk_size = config.max_chunk_size,
        max_parallelism = config.max_parallelism,
        ocr_url = ?config.ocr_url,
        layout_url = ?config.layout_url,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
