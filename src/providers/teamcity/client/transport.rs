use std::time::Duration;

use log::warn;
use reqwest::{Client, Request, Response};

use crate::error::{Result, TcLensError};

/// Exponential backoff settings for transient network failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap)]
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(secs.max(0.0))
    }
}

/// Limits for a single HTTP attempt. A timed-out attempt counts as a
/// transient failure and is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Whole request, from connecting until the response headers arrive.
    pub request: Duration,
    pub connect: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request: Duration::from_secs(30),
            connect: Duration::from_secs(10),
        }
    }
}

/// HTTP transport that retries connection-level failures.
///
/// Status codes are returned untouched; interpreting them is the
/// dispatcher's job.
#[derive(Clone)]
pub struct RetryingTransport {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingTransport {
    /// Builds the shared reqwest client. Idle connections are not kept in the
    /// pool so that wide fan-outs do not pile up sockets.
    pub fn new(policy: RetryPolicy, timeouts: &Timeouts) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tclens/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(0)
            .timeout(timeouts.request)
            .connect_timeout(timeouts.connect)
            .build()
            .map_err(|e| TcLensError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, policy })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn execute(&self, request: Request) -> Result<Response> {
        let mut attempt = 0;
        loop {
            // Streaming bodies cannot be replayed; send those once.
            let Some(current) = request.try_clone() else {
                return Ok(self.client.execute(request).await?);
            };

            match self.client.execute(current).await {
                Ok(response) => return Ok(response),
                Err(e) if is_transient(&e) && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "Network error ({e}), retrying in {delay:?} ({}/{})...",
                        attempt + 1,
                        self.policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout() || error.is_request()
}
