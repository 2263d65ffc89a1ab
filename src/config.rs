use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::CrawlFilters;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CrawlConfig {
    pub max_pages: usize,
    pub max_depth: u32,
    pub concurrency: usize,
    pub delay_ms: u64,
    pub user_agent: String,
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub filters: CrawlFilters,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            max_depth: 2,
            concurrency: 2,
            delay_ms: 1000,
            user_agent: "Mozilla/5.0 (compatible; LeadHarvester/1.0)".to_string(),
            request_timeout_seconds: 30,
            filters: CrawlFilters::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests allowed per period (bucket capacity).
    pub requests: u32,
    /// Period in seconds over which `requests` refill.
    pub period_seconds: u32,
    pub adaptive_backoff: bool,
    pub respect_crawl_delay: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 10,
            period_seconds: 60,
            adaptive_backoff: true,
            respect_crawl_delay: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub failure_threshold: u32,
    pub circuit_reset_timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_factor: 2.0,
            failure_threshold: 5,
            circuit_reset_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    pub directory: String,
    pub pretty_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "output".to_string(),
            pretty_json: true,
        }
    }
}

pub async fn load_config(path: &str) -> Result<Config> {
    let content = tokio::fs::read_to_string(path).await?;
    let config: Config = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.rate_limit.requests, 10);
        assert!(config.crawl.concurrency >= 1);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "crawl:\n  max_pages: 50\n  max_depth: 3\n  concurrency: 4\n  delay_ms: 500\n  user_agent: test\n  request_timeout_seconds: 10\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.crawl.max_pages, 50);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.rate_limit.adaptive_backoff);
    }
}
