//! Fixed retry ladder around a [`Transport`].

use std::time::Duration;

use tracing::{debug, warn};

use crate::TransferError;
use crate::client::{BoxFuture, Transport};
use crate::types::{Delivery, MultipartRequest};

/// Default delays between attempts: 4 attempts in total.
pub const DEFAULT_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
];

/// Which failures are retried and how long to wait before each retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_DELAYS.to_vec())
    }
}

impl RetryPolicy {
    /// One retry per entry in `delays`, waiting that long before it.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }

    /// Delay before retry number `retry` (0-based), or `None` once exhausted.
    pub fn delay_for_retry(&self, retry: usize) -> Option<Duration> {
        self.delays.get(retry).copied()
    }

    /// Server errors are worth retrying; client errors are definitive.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        status >= 500
    }
}

/// Blocks the upload pipeline between attempts.
///
/// Abstracted so tests can observe delays without sleeping.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()>;
}

/// Real sleeps via `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// A [`Transport`] wrapped in a [`RetryPolicy`].
pub struct RetryingClient<T, S = TokioSleeper> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingClient<T, TokioSleeper> {
    /// Wraps `transport` with the default ladder and real sleeps.
    pub fn new(transport: T) -> Self {
        Self::with_sleeper(transport, TokioSleeper, RetryPolicy::default())
    }
}

impl<T: Transport, S: Sleeper> RetryingClient<T, S> {
    pub fn with_sleeper(transport: T, sleeper: S, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Posts `request`, retrying connection failures and 5xx responses.
    ///
    /// - 2xx: [`Delivery::Accepted`].
    /// - 4xx (or other non-2xx below 500): [`Delivery::Rejected`] at once.
    /// - 5xx after the ladder is exhausted: [`Delivery::Rejected`].
    /// - Connection failure after the ladder is exhausted: the last
    ///   [`TransferError::Connection`] is returned.
    pub async fn post(&self, request: &MultipartRequest) -> Result<Delivery, TransferError> {
        let endpoint = request.endpoint.path();
        let mut retry = 0;

        loop {
            let attempt = retry + 1;
            let failure = match self.transport.send(request).await {
                Ok(status) if (200..300).contains(&status) => {
                    debug!(endpoint, status, attempt, "request accepted");
                    return Ok(Delivery::Accepted { status });
                }
                Ok(status) if !self.policy.is_retryable_status(status) => {
                    debug!(endpoint, status, attempt, "request rejected");
                    return Ok(Delivery::Rejected { status });
                }
                Ok(status) => Failure::Status(status),
                Err(e) if e.is_connection() => Failure::Connection(e),
                Err(e) => return Err(e),
            };

            let Some(delay) = self.policy.delay_for_retry(retry) else {
                warn!(endpoint, attempt, reason = %failure, "retries exhausted");
                return match failure {
                    Failure::Status(status) => Ok(Delivery::Rejected { status }),
                    Failure::Connection(e) => Err(e),
                };
            };

            warn!(
                endpoint,
                attempt,
                delay_secs = delay.as_secs_f64(),
                reason = %failure,
                "retrying"
            );
            self.sleeper.sleep(delay).await;
            retry += 1;
        }
    }
}

/// A failed attempt that the ladder may retry.
enum Failure {
    Status(u16),
    Connection(TransferError),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Status(status) => write!(f, "server error {status}"),
            Failure::Connection(e) => write!(f, "{e}"),
        }
    }
}
