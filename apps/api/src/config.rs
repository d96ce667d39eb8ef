use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::matches::cache::DEFAULT_CAPACITY;
use crate::pipeline::coordinator::PipelineSettings;
use crate::pipeline::validation::UploadRules;
use crate::remote::retry::RetryPolicy;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub remote_api_url: String,
    pub remote_api_token: Option<String>,
    /// Without Redis, progress runs over an in-process channel and no
    /// processor-side messages are received.
    pub redis_url: Option<String>,
    pub progress_topic: String,
    pub accepted_extensions: Vec<String>,
    pub max_upload_bytes: usize,
    pub stage_timeout: Duration,
    pub stage_max_attempts: u32,
    pub stage_backoff: Duration,
    /// Finished sessions stay readable this long.
    pub session_retention: Duration,
    /// Documents whose match lists are kept in memory.
    pub match_cache_capacity: usize,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = UploadRules::default();

        Ok(Config {
            remote_api_url: require_env("REMOTE_API_URL")?,
            remote_api_token: optional_env("REMOTE_API_TOKEN"),
            redis_url: optional_env("REDIS_URL"),
            progress_topic: optional_env("PROGRESS_TOPIC")
                .unwrap_or_else(|| "resume-processing".to_string()),
            accepted_extensions: optional_env("ACCEPTED_EXTENSIONS")
                .map(|raw| parse_extensions(&raw))
                .unwrap_or(defaults.accepted_extensions),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", defaults.max_bytes)?,
            stage_timeout: Duration::from_secs(parse_env("STAGE_TIMEOUT_SECS", 60)?),
            stage_max_attempts: parse_env("STAGE_MAX_ATTEMPTS", 3)?,
            stage_backoff: Duration::from_millis(parse_env("STAGE_BACKOFF_MS", 500)?),
            session_retention: Duration::from_secs(parse_env("SESSION_RETENTION_SECS", 900)?),
            match_cache_capacity: parse_env("MATCH_CACHE_CAPACITY", DEFAULT_CAPACITY)?,
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }

    pub fn upload_rules(&self) -> UploadRules {
        UploadRules {
            accepted_extensions: self.accepted_extensions.clone(),
            max_bytes: self.max_upload_bytes,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            upload_rules: self.upload_rules(),
            retry: RetryPolicy {
                max_attempts: self.stage_max_attempts,
                base_delay: self.stage_backoff,
                attempt_timeout: self.stage_timeout,
                ..RetryPolicy::default()
            },
            progress_topic: self.progress_topic.clone(),
            session_retention: self.session_retention,
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

/// "PDF, .docx" → ["pdf", "docx"]
fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}
