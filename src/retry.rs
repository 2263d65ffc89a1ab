use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, warn};

use crate::config::RetryConfig;
use crate::error::{Result, ScraperError};

/// Per-key failure tracking for the circuit breaker.
#[derive(Debug, Clone, Default)]
pub struct CircuitState {
    pub failures: u32,
    pub last_failure: Option<Instant>,
    pub is_open: bool,
}

/// Wraps fallible async operations with bounded exponential-backoff retries
/// and a per-key circuit breaker.
pub struct RetryHandler {
    config: RetryConfig,
    circuits: Mutex<HashMap<String, CircuitState>>,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            circuits: Mutex::new(HashMap::new()),
        }
    }

    /// Invoke `operation` up to `max_attempts` times. Non-retryable errors
    /// (4xx client errors, malformed input) surface immediately.
    pub async fn execute<T, F, Fut>(&self, operation: F, context: &str) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error: Option<ScraperError> = None;

        for attempt in 1..=self.config.max_attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if err.is_non_retryable() {
                        return Err(err);
                    }
                    if attempt < self.config.max_attempts {
                        let delay = self.calculate_delay(attempt);
                        warn!(
                            "Retry attempt {}/{} for {} after {:?}: {}",
                            attempt, self.config.max_attempts, context, delay, err
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(ScraperError::RetriesExhausted {
            attempts: self.config.max_attempts,
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }

    /// Like `execute`, but fails fast while the circuit for `key` is open.
    /// The circuit half-opens once `circuit_reset_timeout_ms` has elapsed
    /// since the last failure; a single success then closes it.
    pub async fn execute_with_circuit_breaker<T, F, Fut>(
        &self,
        key: &str,
        operation: F,
        context: &str,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let reset_timeout = Duration::from_millis(self.config.circuit_reset_timeout_ms);

        {
            let mut circuits = self.circuits.lock().await;
            if let Some(circuit) = circuits.get_mut(key) {
                if circuit.is_open {
                    let elapsed = circuit
                        .last_failure
                        .map(|t| t.elapsed())
                        .unwrap_or(reset_timeout);
                    if elapsed < reset_timeout {
                        return Err(ScraperError::CircuitOpen {
                            key: key.to_string(),
                        });
                    }
                    // Half-open: let one call through.
                    circuit.is_open = false;
                    circuit.failures = 0;
                }
            }
        }

        match self.execute(operation, context).await {
            Ok(value) => {
                let mut circuits = self.circuits.lock().await;
                if let Some(circuit) = circuits.get_mut(key) {
                    circuit.failures = 0;
                    circuit.is_open = false;
                }
                Ok(value)
            }
            Err(err) => {
                let mut circuits = self.circuits.lock().await;
                let circuit = circuits.entry(key.to_string()).or_default();
                circuit.failures += 1;
                circuit.last_failure = Some(Instant::now());
                if circuit.failures >= self.config.failure_threshold {
                    circuit.is_open = true;
                    error!(
                        "Circuit breaker opened for {} after {} failures",
                        key, circuit.failures
                    );
                }
                Err(err)
            }
        }
    }

    pub async fn circuit_status(&self, key: &str) -> CircuitState {
        let circuits = self.circuits.lock().await;
        circuits.get(key).cloned().unwrap_or_default()
    }

    pub async fn reset_circuit(&self, key: &str) {
        let mut circuits = self.circuits.lock().await;
        circuits.remove(key);
    }

    pub async fn reset_all_circuits(&self) {
        let mut circuits = self.circuits.lock().await;
        circuits.clear();
    }

    /// `min(initial × factor^(attempt−1) + jitter, max)` where jitter is up
    /// to 10% of the exponential term.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponential = self.config.initial_delay_ms as f64
            * self.config.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let jitter = fastrand::f64() * 0.1 * exponential;
        let delay = (exponential + jitter).min(self.config.max_delay_ms as f64);
        Duration::from_millis(delay as u64)
    }
}
