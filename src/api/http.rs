use super::ProviderError;
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

// Type alias for the rate limiter to simplify signatures
type ProviderRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Throttling and retry knobs shared by all provider clients
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    pub requests_per_second: u32,
    pub timeout: Duration,
    /// Retries after the first attempt; 0 sends each request once
    pub max_retries: u32,
    /// Wait before the first retry; doubled on every further attempt
    pub retry_backoff: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(2000),
        }
    }
}

impl RequestPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff * 2u32.pow(attempt.saturating_sub(1))
    }
}

/// HTTP client with a shared rate limiter and retry on transient failures
///
/// Cloneable; all clones share the same rate limiter, so concurrent symbol
/// tasks never exceed the configured request rate.
#[derive(Clone)]
pub struct RateLimitedHttp {
    client: Client,
    rate_limiter: Arc<ProviderRateLimiter>,
    policy: RequestPolicy,
}

impl RateLimitedHttp {
    pub fn new(policy: RequestPolicy) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(policy.timeout).build()?;

        let per_second = NonZeroU32::new(policy.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            rate_limiter,
            policy,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a rate-limited request, retrying 429, 5xx and transport errors
    ///
    /// `build` is called once per attempt since a `RequestBuilder` is consumed
    /// on send.
    pub async fn send<F>(&self, provider: &str, build: F) -> Result<Response, ProviderError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let max_attempts = self.policy.max_retries.saturating_add(1);

        for attempt in 1..=max_attempts {
            self.rate_limiter.until_ready().await;

            match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < max_attempts {
                        let backoff = self.policy.backoff(attempt);
                        tracing::warn!(
                            "{} returned {}, retrying in {:?} (attempt {}/{})",
                            provider,
                            status,
                            backoff,
                            attempt,
                            max_attempts
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(ProviderError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if attempt < max_attempts => {
                    let backoff = self.policy.backoff(attempt);
                    tracing::warn!(
                        "Network error from {}: {}, retrying in {:?} (attempt {}/{})",
                        provider,
                        e,
                        backoff,
                        attempt,
                        max_attempts
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(ProviderError::Transport(e)),
            }
        }

        Err(ProviderError::Malformed(format!(
            "{} request exhausted {} attempts",
            provider, max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_policy() -> RequestPolicy {
        RequestPolicy {
            requests_per_second: 100,
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RequestPolicy {
            retry_backoff: Duration::from_millis(100),
            ..RequestPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_server_errors_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(503)
            .with_body("maintenance")
            .expect(3)
            .create_async()
            .await;

        let http = RateLimitedHttp::new(fast_policy()).unwrap();
        let url = format!("{}/ping", server.url());
        let result = http.send("test", |c| c.get(&url)).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_max_retries_counts_retries_not_attempts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(502)
            .expect(4)
            .create_async()
            .await;

        let policy = RequestPolicy {
            max_retries: 3,
            ..fast_policy()
        };
        let http = RateLimitedHttp::new(policy).unwrap();
        let url = format!("{}/ping", server.url());
        let result = http.send("test", |c| c.get(&url)).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ProviderError::Status { status: 502, .. })));
    }

    #[tokio::test]
    async fn test_zero_retries_sends_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(503)
            .expect(1)
            .create_async()
            .await;

        let policy = RequestPolicy {
            max_retries: 0,
            ..fast_policy()
        };
        let http = RateLimitedHttp::new(policy).unwrap();
        let url = format!("{}/ping", server.url());
        let result = http.send("test", |c| c.get(&url)).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ProviderError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_rate_limit_status_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let http = RateLimitedHttp::new(fast_policy()).unwrap();
        let url = format!("{}/ping", server.url());
        let result = http.send("test", |c| c.get(&url)).await;

        mock.assert_async().await;
        assert!(matches!(result, Err(ProviderError::Status { status: 429, .. })));
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ping")
            .with_status(401)
            .with_body("invalid token")
            .expect(1)
            .create_async()
            .await;

        let http = RateLimitedHttp::new(fast_policy()).unwrap();
        let url = format!("{}/ping", server.url());
        let err = http.send("test", |c| c.get(&url)).await.unwrap_err();

        mock.assert_async().await;
        match err {
            ProviderError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
