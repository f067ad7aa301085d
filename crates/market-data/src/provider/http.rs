//! Shared HTTP client with per-request timeout and bounded retries.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::errors::{MarketDataError, RetryClass};
use crate::models::SourceId;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(250);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(4);

/// Exponential backoff for retryable failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Worst-case time for one request: every attempt running into
    /// `per_attempt`, plus every backoff delay between them.
    pub fn budget(&self, per_attempt: Duration) -> Duration {
        let attempts = self.max_attempts.max(1);
        (1..attempts).fold(per_attempt.saturating_mul(attempts), |total, attempt| {
            total.saturating_add(self.delay_for(attempt))
        })
    }
}

/// GET-only HTTP fetcher shared by all quote sources.
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, RetryPolicy::default())
    }
}

impl HttpFetcher {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { client, retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url` and return the body text.
    ///
    /// 5xx, timeouts and transport errors are retried with backoff. 4xx
    /// responses are returned immediately; 429 becomes `RateLimited` and 401
    /// becomes `ProviderUnavailable`.
    pub async fn get_text(
        &self,
        provider: SourceId,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.send_once(provider, url, query, headers).await {
                Ok(body) => return Ok(body),
                Err(error)
                    if error.retry_class() == RetryClass::WithBackoff
                        && attempt < max_attempts =>
                {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "{} request to {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        provider, url, attempt, max_attempts, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn send_once(
        &self,
        provider: SourceId,
        url: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<String, MarketDataError> {
        let mut request = self.client.get(url).query(query);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        // Query strings can carry API keys, so only the bare URL is logged.
        debug!("{} request: {} with {} params", provider, url, query.len());

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: provider.to_string(),
                message: "HTTP 429 Too Many Requests".to_string(),
            });
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(MarketDataError::ProviderUnavailable {
                provider: provider.to_string(),
                message: "Invalid or missing API key".to_string(),
            });
        }

        if !status.is_success() {
            return Err(MarketDataError::HttpStatus {
                provider: provider.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| transport_error(provider, e))
    }
}

fn transport_error(provider: SourceId, error: reqwest::Error) -> MarketDataError {
    if error.is_timeout() {
        MarketDataError::Timeout {
            provider: provider.to_string(),
        }
    } else {
        // reqwest errors embed the request URL, query string included.
        MarketDataError::Network {
            provider: provider.to_string(),
            message: error.without_url().to_string(),
        }
    }
}
