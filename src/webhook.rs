use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, ScraperError};

/// Well-known pipeline event names.
pub mod events {
    pub const SCRAPE_STARTED: &str = "scrape.started";
    pub const SCRAPE_COMPLETED: &str = "scrape.completed";
    pub const SCRAPE_FAILED: &str = "scrape.failed";
    pub const LEAD_EXTRACTED: &str = "lead.extracted";
    pub const LEAD_VALIDATED: &str = "lead.validated";
    pub const LEAD_EXPORTED: &str = "lead.exported";
    pub const QUEUE_STARTED: &str = "queue.started";
    pub const QUEUE_COMPLETED: &str = "queue.completed";
    pub const QUEUE_PAUSED: &str = "queue.paused";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
}

impl Default for WebhookRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential,
        }
    }
}

/// A subscription: where to deliver, which events, extra headers, retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    /// Event names, or `"*"` for everything.
    pub events: Vec<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub retry_policy: WebhookRetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DeliveryStatus {
    Http(u16),
    Failed,
}

impl DeliveryStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryStatus::Http(code) if (200..300).contains(code))
    }
}

/// One delivery attempt. Appended to a per-subscription history, never
/// rewritten.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookDelivery {
    pub id: String,
    pub webhook_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub payload: serde_json::Value,
    pub response: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub pending: usize,
}

#[derive(Debug, Clone)]
struct RetryEntry {
    webhook_id: String,
    payload: serde_json::Value,
    attempt: u32,
    next_retry: Instant,
}

#[derive(Default)]
struct WebhookState {
    webhooks: HashMap<String, WebhookConfig>,
    history: HashMap<String, Vec<WebhookDelivery>>,
    retry_queue: Vec<RetryEntry>,
}

/// Push delivery of pipeline events to registered HTTP endpoints.
///
/// Failures never propagate to the triggering caller; they surface through
/// delivery history and the retry queue.
#[derive(Clone)]
pub struct WebhookManager {
    client: reqwest::Client,
    state: Arc<Mutex<WebhookState>>,
    base_delay: Duration,
}

impl Default for WebhookManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookManager {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            state: Arc::new(Mutex::new(WebhookState::default())),
            base_delay: Duration::from_millis(1000),
        }
    }

    /// Shrink the retry base delay. Intended for tests.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub async fn register(&self, config: WebhookConfig) -> String {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().await;
        info!("Webhook registered: {} -> {}", id, config.url);
        state.history.insert(id.clone(), Vec::new());
        state.webhooks.insert(id.clone(), config);
        id
    }

    pub async fn unregister(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        state.history.remove(id);
        state.webhooks.remove(id).is_some()
    }

    /// Deliver `event` to every subscription whose event list matches.
    /// First attempts are awaited; retries run in the background.
    pub async fn trigger(&self, event: &str, data: serde_json::Value) {
        let payload = json!({
            "event": event,
            "data": data,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let targets: Vec<(String, WebhookConfig)> = {
            let state = self.state.lock().await;
            state
                .webhooks
                .iter()
                .filter(|(_, config)| {
                    config.events.iter().any(|e| e == event || e == "*")
                })
                .map(|(id, config)| (id.clone(), config.clone()))
                .collect()
        };

        for (id, config) in targets {
            self.send_webhook(&id, &config, payload.clone(), 1).await;
        }
    }

    /// Deliver a test event to one subscription, bypassing event matching.
    pub async fn test_webhook(&self, id: &str) -> Result<()> {
        let config = {
            let state = self.state.lock().await;
            state
                .webhooks
                .get(id)
                .cloned()
                .ok_or_else(|| ScraperError::WebhookDelivery(format!("unknown webhook {}", id)))?
        };
        let payload = json!({
            "event": "test",
            "data": { "message": "This is a test webhook delivery" },
            "timestamp": Utc::now().to_rfc3339(),
        });
        self.send_webhook(id, &config, payload, 1).await;
        Ok(())
    }

    // Boxed rather than `async fn`: send_webhook spawns process_retry_queue,
    // which awaits send_webhook, a cycle the compiler cannot resolve for
    // opaque futures.
    fn send_webhook<'a>(
        &'a self,
        id: &'a str,
        config: &'a WebhookConfig,
        payload: serde_json::Value,
        attempt: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
        let event = payload["event"].as_str().unwrap_or("").to_string();
        let timestamp = payload["timestamp"].as_str().unwrap_or("").to_string();

        let mut request = self
            .client
            .post(&config.url)
            .header("Content-Type", "application/json")
            .header("X-Webhook-Id", id)
            .header("X-Webhook-Event", &event)
            .header("X-Webhook-Timestamp", &timestamp)
            .header("X-Webhook-Signature", generate_signature(&payload));
        for (name, value) in &config.headers {
            request = request.header(name, value);
        }

        let outcome = request.json(&payload).send().await;

        let (status, response_body) = match outcome {
            Ok(response) => {
                let code = response.status().as_u16();
                let body = response.text().await.ok();
                (DeliveryStatus::Http(code), body)
            }
            Err(err) => {
                warn!("Webhook {} attempt {} errored: {}", id, attempt, err);
                (DeliveryStatus::Failed, None)
            }
        };

        let delivered = status.is_success();
        let delivery = WebhookDelivery {
            id: Uuid::new_v4().to_string(),
            webhook_id: id.to_string(),
            timestamp: Utc::now(),
            status,
            attempt,
            payload: payload.clone(),
            response: response_body,
        };

        {
            let mut state = self.state.lock().await;
            state.history.entry(id.to_string()).or_default().push(delivery);
        }

        if delivered {
            debug!("Webhook delivered: {} (attempt {})", id, attempt);
            return;
        }

        if attempt < config.retry_policy.max_attempts {
            let delay = calculate_retry_delay(attempt, config.retry_policy.backoff, self.base_delay);
            info!("Webhook {} scheduled for retry in {:?}", id, delay);
            {
                let mut state = self.state.lock().await;
                state.retry_queue.push(RetryEntry {
                    webhook_id: id.to_string(),
                    payload,
                    attempt: attempt + 1,
                    next_retry: Instant::now() + delay,
                });
            }
            let manager = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                manager.process_retry_queue().await;
            });
        } else {
            error!("Webhook {} failed after {} attempts", id, attempt);
        }
        })
    }

    /// Resend every retry-queue entry whose backoff has elapsed.
    pub async fn process_retry_queue(&self) {
        let now = Instant::now();
        let due: Vec<RetryEntry> = {
            let mut state = self.state.lock().await;
            let (ready, later): (Vec<_>, Vec<_>) = state
                .retry_queue
                .drain(..)
                .partition(|entry| entry.next_retry <= now);
            state.retry_queue = later;
            ready
        };

        for entry in due {
            let config = {
                let state = self.state.lock().await;
                state.webhooks.get(&entry.webhook_id).cloned()
            };
            if let Some(config) = config {
                self.send_webhook(&entry.webhook_id, &config, entry.payload, entry.attempt)
                    .await;
            }
        }
    }

    pub async fn delivery_status(&self, id: &str) -> DeliveryStats {
        let state = self.state.lock().await;
        let history = state.history.get(id).map(Vec::as_slice).unwrap_or(&[]);
        let pending = state
            .retry_queue
            .iter()
            .filter(|entry| entry.webhook_id == id)
            .count();
        let successful = history.iter().filter(|d| d.status.is_success()).count();
        let failed = history
            .iter()
            .filter(|d| match &d.status {
                DeliveryStatus::Failed => true,
                DeliveryStatus::Http(code) => *code >= 400,
            })
            .count();
        DeliveryStats {
            total: history.len(),
            successful,
            failed,
            pending,
        }
    }

    pub async fn delivery_history(&self, id: &str) -> Vec<WebhookDelivery> {
        let state = self.state.lock().await;
        state.history.get(id).cloned().unwrap_or_default()
    }

    pub async fn webhooks(&self) -> Vec<(String, WebhookConfig)> {
        let state = self.state.lock().await;
        state
            .webhooks
            .iter()
            .map(|(id, config)| (id.clone(), config.clone()))
            .collect()
    }

    pub async fn clear_history(&self, id: Option<&str>) {
        let mut state = self.state.lock().await;
        match id {
            Some(id) => {
                state.history.insert(id.to_string(), Vec::new());
            }
            None => state.history.clear(),
        }
    }

    pub async fn retry_queue_status(&self) -> Vec<(String, u32)> {
        let state = self.state.lock().await;
        state
            .retry_queue
            .iter()
            .map(|entry| (entry.webhook_id.clone(), entry.attempt))
            .collect()
    }
}

/// `linear`: base × attempt. `exponential`: base × 2^(attempt−1) plus up to
/// 10% jitter, capped at 5 minutes.
fn calculate_retry_delay(attempt: u32, backoff: BackoffStrategy, base: Duration) -> Duration {
    match backoff {
        BackoffStrategy::Linear => base * attempt,
        BackoffStrategy::Exponential => {
            let exponential = base.as_millis() as f64 * 2f64.powi(attempt.saturating_sub(1) as i32);
            let jitter = fastrand::f64() * 0.1 * exponential;
            Duration::from_millis(((exponential + jitter) as u64).min(300_000))
        }
    }
}

fn generate_signature(payload: &serde_json::Value) -> String {
    let content = payload.to_string();
    let mut encoded = base64::engine::general_purpose::STANDARD.encode(content);
    encoded.truncate(32);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP endpoint answering with a fixed status sequence; the
    /// last status repeats.
    async fn serve_statuses(statuses: Vec<u16>) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let call = counter.fetch_add(1, Ordering::SeqCst);
                let status = *statuses.get(call).unwrap_or(statuses.last().unwrap());
                let mut buf = vec![0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {} STATUS\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    fn config(url: String, events: Vec<&str>) -> WebhookConfig {
        WebhookConfig {
            url,
            events: events.into_iter().map(str::to_string).collect(),
            headers: HashMap::new(),
            retry_policy: WebhookRetryPolicy::default(),
        }
    }

    #[tokio::test]
    async fn delivers_matching_event() {
        let (addr, hits) = serve_statuses(vec![200]).await;
        let manager = WebhookManager::new();
        let id = manager
            .register(config(format!("http://{}/hook", addr), vec!["lead.extracted"]))
            .await;

        manager.trigger("lead.extracted", json!({"count": 3})).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let stats = manager.delivery_status(&id).await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn wildcard_subscription_gets_everything() {
        let (addr, hits) = serve_statuses(vec![200]).await;
        let manager = WebhookManager::new();
        manager
            .register(config(format!("http://{}/hook", addr), vec!["*"]))
            .await;

        manager.trigger("queue.completed", json!({})).await;
        manager.trigger("scrape.started", json!({})).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_matching_event_is_skipped() {
        let (addr, hits) = serve_statuses(vec![200]).await;
        let manager = WebhookManager::new();
        manager
            .register(config(format!("http://{}/hook", addr), vec!["lead.extracted"]))
            .await;

        manager.trigger("queue.paused", json!({})).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn server_error_retries_once_then_succeeds() {
        let (addr, hits) = serve_statuses(vec![500, 200]).await;
        let manager = WebhookManager::new().with_base_delay(Duration::from_millis(10));
        let id = manager
            .register(config(format!("http://{}/hook", addr), vec!["*"]))
            .await;

        manager.trigger("scrape.completed", json!({"pages": 5})).await;

        // Let the background retry fire.
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        let history = manager.delivery_history(&id).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].status, DeliveryStatus::Http(500));
        assert_eq!(history[0].attempt, 1);
        assert_eq!(history[1].status, DeliveryStatus::Http(200));
        assert_eq!(history[1].attempt, 2);

        // No further retries scheduled.
        assert!(manager.retry_queue_status().await.is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_terminal_failure() {
        let (addr, hits) = serve_statuses(vec![500]).await;
        let manager = WebhookManager::new().with_base_delay(Duration::from_millis(5));
        let id = manager
            .register(WebhookConfig {
                url: format!("http://{}/hook", addr),
                events: vec!["*".to_string()],
                headers: HashMap::new(),
                retry_policy: WebhookRetryPolicy {
                    max_attempts: 2,
                    backoff: BackoffStrategy::Linear,
                },
            })
            .await;

        manager.trigger("scrape.failed", json!({})).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        let stats = manager.delivery_status(&id).await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let (addr, hits) = serve_statuses(vec![200]).await;
        let manager = WebhookManager::new();
        let id = manager
            .register(config(format!("http://{}/hook", addr), vec!["*"]))
            .await;
        assert!(manager.unregister(&id).await);
        assert!(!manager.unregister(&id).await);

        manager.trigger("lead.extracted", json!({})).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_webhook_requires_registration() {
        let manager = WebhookManager::new();
        assert!(manager.test_webhook("nope").await.is_err());
    }

    #[test]
    fn retry_delays_follow_strategy() {
        let base = Duration::from_millis(1000);
        assert_eq!(
            calculate_retry_delay(3, BackoffStrategy::Linear, base),
            Duration::from_millis(3000)
        );
        let exp = calculate_retry_delay(3, BackoffStrategy::Exponential, base);
        assert!(exp >= Duration::from_millis(4000));
        assert!(exp < Duration::from_millis(4400));
        // Large attempts stay under the five-minute cap.
        let capped = calculate_retry_delay(20, BackoffStrategy::Exponential, base);
        assert!(capped <= Duration::from_secs(300));
    }

    #[test]
    fn signature_is_stable_and_short() {
        let payload = json!({"event": "x", "data": 1});
        let a = generate_signature(&payload);
        let b = generate_signature(&payload);
        assert_eq!(a, b);
        assert!(a.len() <= 32);
    }
}
