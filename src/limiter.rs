use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};
use url::Url;

use crate::config::RateLimitConfig;

/// Continuously-refilling token bucket. One token per admitted request.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate_per_second: f64) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_rate: refill_rate_per_second,
            last_refill: Instant::now(),
        }
    }

    pub fn take_token(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available_tokens(&mut self) -> u32 {
        self.refill();
        self.tokens.floor() as u32
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    pub domain: String,
    pub available_tokens: u32,
    pub backoff: Option<Duration>,
    pub last_request: Option<Instant>,
}

#[derive(Default)]
struct LimiterState {
    buckets: HashMap<String, TokenBucket>,
    domain_delays: HashMap<String, Duration>,
    last_request: HashMap<String, Instant>,
}

/// Per-domain admission control shared by all workers of a job.
///
/// Never errors: `wait_for_slot` always eventually yields a slot.
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState::default()),
        }
    }

    /// Non-blocking variant: take a token for the url's domain if one is
    /// available right now.
    pub async fn check_limit(&self, url: &str) -> bool {
        let domain = extract_domain(url);
        let mut state = self.state.lock().await;
        let bucket = self.bucket_for(&mut state, &domain);
        bucket.take_token()
    }

    /// Suspend until a token is available for the url's domain, honoring any
    /// active backoff window first.
    pub async fn wait_for_slot(&self, url: &str) {
        let domain = extract_domain(url);

        // Sleep out any custom domain delay relative to the last request.
        let backoff = {
            let state = self.state.lock().await;
            match (
                state.domain_delays.get(&domain),
                state.last_request.get(&domain),
            ) {
                (Some(delay), Some(last)) => {
                    let since = last.elapsed();
                    delay.checked_sub(since)
                }
                _ => None,
            }
        };
        if let Some(remaining) = backoff {
            debug!("Backing off {} for {:?}", domain, remaining);
            tokio::time::sleep(remaining).await;
        }

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let bucket = self.bucket_for(&mut state, &domain);
                if bucket.take_token() {
                    state.last_request.insert(domain.clone(), Instant::now());
                    return;
                }
                Duration::from_millis((1000.0 / bucket.refill_rate()).ceil() as u64)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Adjust the domain bucket and backoff window from server feedback.
    /// No-op unless adaptive backoff is enabled.
    pub async fn update_limits(&self, url: &str, headers: &HeaderMap) {
        if !self.config.adaptive_backoff {
            return;
        }
        let domain = extract_domain(url);
        let mut state = self.state.lock().await;

        if let Some(retry_after) = header_str(headers, "retry-after") {
            let delay = parse_retry_after(retry_after);
            info!("Adaptive backoff: delaying {} by {:?}", domain, delay);
            state.domain_delays.insert(domain.clone(), delay);
        } else if header_str(headers, "x-ratelimit-remaining")
            .and_then(|v| v.parse::<i64>().ok())
            .map(|remaining| remaining == 0)
            .unwrap_or(false)
        {
            if let Some(reset) =
                header_str(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok())
            {
                let now = chrono::Utc::now().timestamp();
                let delay = Duration::from_secs((reset - now).max(0) as u64);
                info!("Rate limit hit: backing off {} for {:?}", domain, delay);
                state.domain_delays.insert(domain.clone(), delay);
            }
        }

        // Rebuild the bucket when the server advertises its own limits.
        if let (Some(limit), Some(reset)) = (
            header_str(headers, "x-ratelimit-limit").and_then(|v| v.parse::<u32>().ok()),
            header_str(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok()),
        ) {
            let now = chrono::Utc::now().timestamp();
            let period = (reset - now).max(1) as f64;
            state
                .buckets
                .insert(domain, TokenBucket::new(limit, limit as f64 / period));
        }
    }

    /// Apply a robots.txt crawl-delay as the minimum spacing for a domain.
    pub async fn set_crawl_delay(&self, domain: &str, delay_seconds: u64) {
        if !self.config.respect_crawl_delay {
            return;
        }
        info!("Crawl delay for {}: {}s", domain, delay_seconds);
        let mut state = self.state.lock().await;
        state
            .domain_delays
            .insert(domain.to_string(), Duration::from_secs(delay_seconds));
    }

    /// Drop all limiter state for a domain.
    pub async fn reset_limit(&self, url: &str) {
        let domain = extract_domain(url);
        let mut state = self.state.lock().await;
        state.buckets.remove(&domain);
        state.domain_delays.remove(&domain);
        state.last_request.remove(&domain);
    }

    pub async fn status(&self, url: &str) -> RateLimitStatus {
        let domain = extract_domain(url);
        let mut state = self.state.lock().await;
        let available = state
            .buckets
            .get_mut(&domain)
            .map(|b| b.available_tokens())
            .unwrap_or(self.config.requests);
        RateLimitStatus {
            available_tokens: available,
            backoff: state.domain_delays.get(&domain).copied(),
            last_request: state.last_request.get(&domain).copied(),
            domain,
        }
    }

    fn bucket_for<'a>(&self, state: &'a mut LimiterState, domain: &str) -> &'a mut TokenBucket {
        let requests = self.config.requests;
        let rate = requests as f64 / self.config.period_seconds.max(1) as f64;
        state
            .buckets
            .entry(domain.to_string())
            .or_insert_with(|| TokenBucket::new(requests, rate))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Retry-After is either seconds or an HTTP-date.
fn parse_retry_after(value: &str) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }
    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delta = date.timestamp_millis() - chrono::Utc::now().timestamp_millis();
        return Duration::from_millis(delta.max(0) as u64);
    }
    Duration::from_secs(60)
}

fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn bucket_drains_to_zero_and_refills() {
        let mut bucket = TokenBucket::new(5, 1.0);
        for _ in 0..5 {
            assert!(bucket.take_token());
        }
        assert_eq!(bucket.available_tokens(), 0);
        assert!(!bucket.take_token());

        // One token back after 1/refill_rate seconds.
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(bucket.available_tokens(), 1);
        assert!(bucket.take_token());
    }

    #[tokio::test(start_paused = true)]
    async fn bucket_never_exceeds_capacity() {
        let mut bucket = TokenBucket::new(3, 10.0);
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(bucket.available_tokens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn check_limit_is_per_domain() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests: 1,
            period_seconds: 60,
            adaptive_backoff: true,
            respect_crawl_delay: true,
        });
        assert!(limiter.check_limit("https://a.example.com/x").await);
        assert!(!limiter.check_limit("https://a.example.com/y").await);
        assert!(limiter.check_limit("https://b.example.com/z").await);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_slot_suspends_until_refill() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests: 1,
            period_seconds: 1,
            adaptive_backoff: true,
            respect_crawl_delay: true,
        });
        limiter.wait_for_slot("https://example.com/").await;
        let start = Instant::now();
        limiter.wait_for_slot("https://example.com/").await;
        // Refill rate is 1/s so the second slot needs roughly a second.
        assert!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn retry_after_header_sets_backoff() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", "120".parse().unwrap());
        limiter
            .update_limits("https://example.com/page", &headers)
            .await;
        let status = limiter.status("https://example.com/").await;
        assert_eq!(status.backoff, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn crawl_delay_respected_and_resettable() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        limiter.set_crawl_delay("example.com", 5).await;
        let status = limiter.status("https://example.com/").await;
        assert_eq!(status.backoff, Some(Duration::from_secs(5)));

        limiter.reset_limit("https://example.com/").await;
        let status = limiter.status("https://example.com/").await;
        assert!(status.backoff.is_none());
    }

    #[test]
    fn parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("30"), Duration::from_secs(30));
    }

    #[test]
    fn parse_retry_after_garbage_defaults_to_a_minute() {
        assert_eq!(parse_retry_after("soon"), Duration::from_secs(60));
    }
}
