//! WebhookEventPublisher - Global publisher that POSTs events over HTTP.
//!
//! The record's `event_path` is the target URL, either absolute or relative
//! to the configured base URL. The request body is the stored JSON payload;
//! string-valued event headers become HTTP headers.
//!
//! | Response | Result |
//! |----------|--------|
//! | 2xx | `Ok(true)` |
//! | any other status | `Ok(false)`, retried without backoff |
//! | transport error | `Err`, counts toward the retry backoff |
//!
//! # Configuration
//!
//! ```ignore
//! let publisher = WebhookEventPublisher::new(
//!     WebhookConfig::default()
//!         .with_base_url("https://hooks.example.com")
//!         .with_timeout(Duration::from_secs(5)),
//! )?;
//!
//! let registry = ProviderRegistry::<Outbox>::builder()
//!     .add_global_publisher(EventProvider::WebHook, publisher)
//!     .build();
//! ```

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::time::Duration;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{GlobalEventPublisher, RawEvent};

/// Configuration for the webhook publisher.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Prefix for relative event paths.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl WebhookConfig {
    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Publishes events of the `WebHook` provider as HTTP POST requests.
pub struct WebhookEventPublisher {
    config: WebhookConfig,
    client: Client,
}

impl WebhookEventPublisher {
    /// Creates a new publisher with the given configuration.
    pub fn new(config: WebhookConfig) -> Result<Self, DomainError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::ConfigurationError,
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self { config, client })
    }

    /// Resolves the target URL of an event path.
    fn target_url(&self, event_path: &str) -> Result<String, DomainError> {
        if event_path.starts_with("http://") || event_path.starts_with("https://") {
            return Ok(event_path.to_string());
        }
        match &self.config.base_url {
            Some(base) => Ok(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                event_path.trim_start_matches('/')
            )),
            None => Err(DomainError::new(
                ErrorCode::ValidationFailed,
                format!("Webhook path {:?} is not an absolute URL", event_path),
            )),
        }
    }
}

/// Builds HTTP headers from the string-valued event headers.
fn http_headers(event: &RawEvent) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(event_headers) = &event.headers else {
        return headers;
    };

    for (name, value) in event_headers {
        let Some(value) = value.as_str() else {
            continue;
        };
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(
                event_id = %event.id,
                header = %name,
                "Skipping header that is not a valid HTTP header"
            ),
        }
    }
    headers
}

#[async_trait]
impl GlobalEventPublisher for WebhookEventPublisher {
    async fn publish(&self, event: RawEvent) -> Result<bool, DomainError> {
        let url = self.target_url(&event.event_path)?;

        let response = self
            .client
            .post(&url)
            .headers(http_headers(&event))
            .header("X-Event-Id", event.id.to_string())
            .header("X-Event-Name", event.event_name.as_str())
            .json(&event.payload)
            .send()
            .await
            .map_err(|e| {
                let code = if e.is_timeout() {
                    ErrorCode::HandlerTimeout
                } else {
                    ErrorCode::HandlerFailed
                };
                DomainError::new(code, format!("Webhook request to {} failed: {}", url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                event_id = %event.id,
                event_name = %event.event_name,
                url = %url,
                status = status.as_u16(),
                "Webhook responded with a non-success status"
            );
        }
        Ok(status.is_success())
    }
}
