//! Shared HTTP retry, backoff and pacing for provider fetchers
//!
//! Every HTTP provider goes through [`RetryingClient::get_json`], so the
//! policy is identical across providers:
//!
//! - at most `max_retries` attempts per request;
//! - after a transient failure (network error, 5xx, 408, 429) wait the current
//!   backoff delay, then double it, capped at `max_retry_delay`;
//! - after a successful request wait `rate_limit_delay` before returning, so
//!   consecutive requests respect provider quotas;
//! - anything else (other 4xx, undecodable body) fails immediately.

use reqwest::{header::HeaderMap, Client};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::FetchError;

/// Exponential backoff schedule: `initial, 2·initial, 4·initial, …` capped at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.saturating_mul(2).min(self.max);
        Some(current)
    }
}

/// HTTP client applying the shared retry policy
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    policy: RetryConfig,
}

impl RetryingClient {
    /// Build a client with the policy's request timeout and default headers
    pub fn new(policy: RetryConfig, headers: HeaderMap) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(policy.request_timeout)
            .user_agent(concat!("coinetl-ingest/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(FetchError::Network)?;

        Ok(Self { client, policy })
    }

    /// GET `url` with `query` and decode the JSON body, retrying transient failures
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let attempts = self.policy.max_retries.max(1);
        let mut backoff = Backoff::new(self.policy.initial_retry_delay, self.policy.max_retry_delay);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(url, attempt, attempts, "Requesting provider");

            match self.attempt(url, query).await {
                Ok(body) => {
                    tokio::time::sleep(self.policy.rate_limit_delay).await;
                    return Ok(body);
                },
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) if attempt >= attempts => {
                    warn!(url, attempt, error = %e, "Request failed, no attempts left");
                    return Err(FetchError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    });
                },
                Err(e) => {
                    let delay = backoff.next().unwrap_or(self.policy.max_retry_delay);
                    warn!(
                        url,
                        attempt,
                        attempts,
                        error = %e,
                        delay_secs = delay.as_secs_f64(),
                        "Request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    async fn attempt(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status));
        }

        let bytes = response.bytes().await.map_err(FetchError::Network)?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn fast_policy(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_retry_delay: Duration::from_millis(5),
            max_retry_delay: Duration::from_millis(20),
            rate_limit_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_schedule_doubles_and_caps() {
        let delays: Vec<f64> = Backoff::new(Duration::from_secs(1), Duration::from_secs(60))
            .take(9)
            .map(|d| d.as_secs_f64())
            .collect();

        assert_eq!(delays, vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 60.0, 60.0, 60.0]);
    }

    #[test]
    fn test_backoff_initial_above_cap_is_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(90), Duration::from_secs(60));
        assert_eq!(backoff.next(), Some(Duration::from_secs(60)));
        assert_eq!(backoff.next(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/tickers"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tickers"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([1, 2])))
            .expect(1)
            .mount(&server)
            .await;

        let client = RetryingClient::new(fast_policy(3), HeaderMap::new()).unwrap();
        let body = client
            .get_json(&format!("{}/tickers", server.uri()), &[("limit", "2".to_string())])
            .await
            .unwrap();

        assert_eq!(body, serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_server_errors_exhaust_attempts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = RetryingClient::new(fast_policy(3), HeaderMap::new()).unwrap();
        let err = client.get_json(&server.uri(), &[]).await.unwrap_err();

        match err {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::Server(_)));
            },
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_waits_rate_limit_delay() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let policy = RetryConfig {
            rate_limit_delay: Duration::from_millis(300),
            ..fast_policy(3)
        };
        let client = RetryingClient::new(policy, HeaderMap::new()).unwrap();

        let started = std::time::Instant::now();
        client.get_json(&server.uri(), &[]).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_backoff_sleeps_between_attempts_only() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        // 200ms then 400ms capped to 300ms; nothing after the third attempt
        let policy = RetryConfig {
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(200),
            max_retry_delay: Duration::from_millis(300),
            rate_limit_delay: Duration::from_millis(400),
            request_timeout: Duration::from_secs(5),
        };
        let client = RetryingClient::new(policy, HeaderMap::new()).unwrap();

        let started = std::time::Instant::now();
        let err = client.get_json(&server.uri(), &[]).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert!(elapsed >= Duration::from_millis(500), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(800), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = RetryingClient::new(fast_policy(3), HeaderMap::new()).unwrap();
        let err = client.get_json(&server.uri(), &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::Rejected(status) if status.as_u16() == 404));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_terminal() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = RetryingClient::new(fast_policy(3), HeaderMap::new()).unwrap();
        let err = client.get_json(&server.uri(), &[]).await.unwrap_err();

        assert!(matches!(err, FetchError::Decode(_)));
    }
}
