//! Rate-limited HTTP GET
//!
//! One [`RateLimitedClient`] exists per process and is shared through an
//! `Arc` by every path that talks to the exchange. Its governor limiter
//! allows a single cell per period with no burst, so request starts are never
//! closer together than `1 / requests_per_second` no matter how many tasks
//! call it. Status codes are handed back untouched; retry decisions belong to
//! the caller.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::config::ClientConfig;
use super::{FetchResponse, Fetcher};
use crate::errors::{FetchError, FetchResult};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP client gated by the global request budget
#[derive(Debug)]
pub struct RateLimitedClient {
    client: Client,
    rate_limiter: DirectLimiter,
    request_timeout: Duration,
}

impl RateLimitedClient {
    /// Creates a client from configuration
    ///
    /// # Errors
    ///
    /// Returns `FetchError::InvalidRateLimit` if `requests_per_second` is not a
    /// positive finite number, or `FetchError::ClientBuild` if reqwest fails.
    pub fn new(config: &ClientConfig) -> FetchResult<Self> {
        let client = config.build_http_client()?;
        Self::with_client(client, config.requests_per_second, config.request_timeout)
    }

    /// Creates a client around an existing reqwest client
    pub fn with_client(
        client: Client,
        requests_per_second: f64,
        request_timeout: Duration,
    ) -> FetchResult<Self> {
        let rate_limiter = Self::build_rate_limiter(requests_per_second)?;
        Ok(Self {
            client,
            rate_limiter,
            request_timeout,
        })
    }

    /// Builds a limiter with one cell per `1 / requests_per_second` and burst 1
    fn build_rate_limiter(requests_per_second: f64) -> FetchResult<DirectLimiter> {
        if !(requests_per_second.is_finite() && requests_per_second > 0.0) {
            return Err(FetchError::InvalidRateLimit {
                reason: format!(
                    "requests per second must be positive, got {}",
                    requests_per_second
                ),
            });
        }

        let period = Duration::from_secs_f64(1.0 / requests_per_second);
        let quota = Quota::with_period(period)
            .ok_or_else(|| FetchError::InvalidRateLimit {
                reason: format!("request interval {:?} is too small", period),
            })?
            .allow_burst(NonZeroU32::MIN);
        Ok(RateLimiter::direct(quota))
    }

    fn map_transport_error(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                seconds: self.request_timeout.as_secs(),
            }
        } else {
            FetchError::Http(error)
        }
    }
}

#[async_trait]
impl Fetcher for RateLimitedClient {
    async fn wait_turn(&self) {
        self.rate_limiter.until_ready().await;
    }

    async fn send(&self, url: &str) -> FetchResult<FetchResponse> {
        let url = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        debug!("GET {} -> {} ({} bytes)", url, status, body.len());
        Ok(FetchResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_rate_limiter_rejects_invalid_rates() {
        assert!(RateLimitedClient::build_rate_limiter(0.0).is_err());
        assert!(RateLimitedClient::build_rate_limiter(-3.0).is_err());
        assert!(RateLimitedClient::build_rate_limiter(f64::INFINITY).is_err());
        assert!(RateLimitedClient::build_rate_limiter(0.5).is_ok());
    }

    #[tokio::test]
    async fn test_rate_limit_spans_requests() {
        let rps = 20.0;
        let tasks = 5;
        let client = Arc::new(
            RateLimitedClient::new(&ClientConfig {
                requests_per_second: rps,
                ..Default::default()
            })
            .unwrap(),
        );

        let start = Instant::now();
        let handles: Vec<_> = (0..tasks)
            .map(|_| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.wait_turn().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        // 5 starts at 20 rps need at least 4 intervals of 50ms
        let minimum = Duration::from_secs_f64((tasks - 1) as f64 / rps);
        // governor and tokio read different monotonic clocks
        let tolerance = Duration::from_millis(2);
        assert!(
            start.elapsed() + tolerance >= minimum,
            "elapsed {:?} < {:?}",
            start.elapsed(),
            minimum
        );
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let client = RateLimitedClient::new(&ClientConfig::default()).unwrap();
        let result = client.fetch("not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl { .. })));
    }
}
