use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScraperError>;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error {status} for {url}")]
    Http { status: u16, url: String },

    #[error("request failed for {url}: {message}")]
    Network { url: String, message: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("circuit breaker open for {key}")]
    CircuitOpen { key: String },

    #[error("failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("webhook delivery failed: {0}")]
    WebhookDelivery(String),

    #[error("export failed: {0}")]
    Export(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ScraperError {
    /// Errors that retrying cannot fix: client-side HTTP statuses and
    /// malformed input.
    pub fn is_non_retryable(&self) -> bool {
        match self {
            ScraperError::Http { status, .. } => matches!(status, 401 | 403 | 404),
            ScraperError::InvalidUrl(_) => true,
            other => {
                let message = other.to_string().to_lowercase();
                ["404", "not found", "403", "forbidden", "401", "unauthorized", "invalid url", "malformed"]
                    .iter()
                    .any(|needle| message.contains(needle))
            }
        }
    }
}

impl From<reqwest::Error> for ScraperError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if let Some(status) = err.status() {
            ScraperError::Http {
                status: status.as_u16(),
                url,
            }
        } else {
            ScraperError::Network {
                url,
                message: err.to_string(),
            }
        }
    }
}

impl From<url::ParseError> for ScraperError {
    fn from(err: url::ParseError) -> Self {
        ScraperError::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_errors_are_non_retryable() {
        for status in [401u16, 403, 404] {
            let err = ScraperError::Http {
                status,
                url: "https://example.org/page".into(),
            };
            assert!(err.is_non_retryable(), "status {} should not retry", status);
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        let err = ScraperError::Http {
            status: 503,
            url: "https://example.org".into(),
        };
        assert!(!err.is_non_retryable());
    }

    #[test]
    fn message_classification_catches_malformed_input() {
        let err = ScraperError::Network {
            url: "nope".into(),
            message: "malformed response body".into(),
        };
        assert!(err.is_non_retryable());
    }
}
