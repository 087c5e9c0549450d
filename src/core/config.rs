use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::edgar::error::EdgarError;
use crate::fetch::RetryPolicy;

pub const DEFAULT_USER_AGENT: &str = "insider-scout/0.1 (ops@example.com)";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub user_agent: String,
    pub data_dir: PathBuf,
    pub request_interval: Duration,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub workers: usize,
    pub min_document_bytes: usize,
    pub batch_budget: Duration,
    pub sec_api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            data_dir: PathBuf::from("data"),
            request_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(15),
            workers: 2,
            min_document_bytes: 200,
            batch_budget: Duration::from_secs(600),
            sec_api_key: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let user_agent = lookup("INSIDER_USER_AGENT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.user_agent);

        let data_dir = lookup("INSIDER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let interval_ms: u64 = parse_var(&lookup, "INSIDER_REQUEST_INTERVAL_MS", 500)?;
        let max_attempts: u32 = parse_var(&lookup, "INSIDER_MAX_ATTEMPTS", 3)?;
        let backoff_base_ms: u64 = parse_var(&lookup, "INSIDER_BACKOFF_BASE_MS", 1_000)?;
        let backoff_max_ms: u64 = parse_var(&lookup, "INSIDER_BACKOFF_MAX_MS", 10_000)?;
        let timeout_secs: u64 = parse_var(&lookup, "INSIDER_TIMEOUT_SECS", 15)?;
        let workers: usize = parse_var(&lookup, "INSIDER_WORKERS", defaults.workers)?;
        let min_document_bytes: usize =
            parse_var(&lookup, "INSIDER_MIN_DOCUMENT_BYTES", defaults.min_document_bytes)?;
        let budget_secs: u64 = parse_var(&lookup, "INSIDER_BATCH_BUDGET_SECS", 600)?;

        if max_attempts == 0 {
            return Err(anyhow!("INSIDER_MAX_ATTEMPTS must be at least 1"));
        }
        if timeout_secs == 0 {
            return Err(anyhow!("INSIDER_TIMEOUT_SECS must be at least 1"));
        }

        let sec_api_key = lookup("SEC_API_KEY").filter(|v| !v.trim().is_empty());

        Ok(Self {
            user_agent,
            data_dir,
            request_interval: Duration::from_millis(interval_ms),
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(backoff_base_ms),
                max_delay: Duration::from_millis(backoff_max_ms.max(backoff_base_ms)),
            },
            timeout: Duration::from_secs(timeout_secs),
            workers: workers.clamp(1, 4),
            min_document_bytes,
            batch_budget: Duration::from_secs(budget_secs),
            sec_api_key,
        })
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, 4);
        self
    }

    pub fn with_data_dir(mut self, data_dir: PathBuf) -> Self {
        self.data_dir = data_dir;
        self
    }

    pub fn require_api_key(&self) -> std::result::Result<&str, EdgarError> {
        self.sec_api_key
            .as_deref()
            .ok_or_else(|| EdgarError::Config("SEC_API_KEY environment variable not set".into()))
    }
}

fn parse_var<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("invalid value {:?} for {}: {}", raw, name, e)),
    }
}
