//! services/api/src/adapters/retry.rs
//!
//! Retries for calls to external services. The schedule comes from a
//! `retry_policies` policy; operations classify each failure as retryable or
//! final with `MaybeRetry`.

use classroom_core::ports::{PortError, PortResult};
use reqwest::{RequestBuilder, Response, StatusCode};
use retry_policies::policies::ExponentialBackoff;
use retry_policies::{RetryDecision, RetryPolicy};
use std::future::Future;
use std::time::{Duration, SystemTime};
use tracing::warn;

pub enum MaybeRetry<T> {
    MaybeRetry(T),
    NoRetry(T),
}

impl<T> MaybeRetry<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::MaybeRetry(inner) | Self::NoRetry(inner) => inner,
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(self, Self::MaybeRetry(_))
    }
}

/// Three retries, 250ms to 4s apart.
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(250), Duration::from_secs(4))
        .build_with_max_retries(3)
}

/// Runs `op` until it succeeds, fails with `MaybeRetry::NoRetry`, or the
/// policy gives up.
pub async fn with_backoff<T, E, P, F, Fut>(policy: &P, service: &str, mut op: F) -> Result<T, E>
where
    P: RetryPolicy,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MaybeRetry<E>>>,
    E: std::fmt::Display,
{
    let started = SystemTime::now();
    let mut past_retries = 0;
    loop {
        let failure = match op().await {
            Ok(value) => return Ok(value),
            Err(failure) => failure,
        };
        if !failure.should_retry() {
            return Err(failure.into_inner());
        }
        let execute_after = match policy.should_retry(started, past_retries) {
            RetryDecision::Retry { execute_after } => execute_after,
            RetryDecision::DoNotRetry => return Err(failure.into_inner()),
        };

        let delay = execute_after
            .duration_since(SystemTime::now())
            .unwrap_or_default();
        past_retries += 1;
        warn!(
            service,
            attempt = past_retries,
            error = %failure.into_inner(),
            delay_ms = delay.as_millis() as u64,
            "External call failed, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Sends the request built by `build` with backoff, turning transport
/// failures and non-success statuses into `PortError::ExternalService`.
/// The request is rebuilt for every attempt.
pub async fn send_with_retry<P, F>(policy: &P, service: &str, build: F) -> PortResult<Response>
where
    P: RetryPolicy,
    F: Fn() -> RequestBuilder + Send + Sync,
{
    let build = &build;
    with_backoff(policy, service, move || async move {
        let response = match build().send().await {
            Ok(response) => response,
            Err(e) => {
                let retry = e.is_timeout() || e.is_connect() || e.is_request();
                let err = PortError::ExternalService(format!("{} request failed: {}", service, e));
                return Err(if retry {
                    MaybeRetry::MaybeRetry(err)
                } else {
                    MaybeRetry::NoRetry(err)
                });
            }
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(300).collect();
        let err = PortError::ExternalService(format!(
            "{} returned {}: {}",
            service, status, snippet
        ));
        if is_retryable_status(status) {
            Err(MaybeRetry::MaybeRetry(err))
        } else {
            Err(MaybeRetry::NoRetry(err))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> ExponentialBackoff {
        ExponentialBackoff::builder()
            .retry_bounds(Duration::from_millis(1), Duration::from_millis(2))
            .build_with_max_retries(2)
    }

    #[test]
    fn default_backoff_allows_three_retries() {
        assert_eq!(default_backoff().max_n_retries, Some(3));
    }

    #[tokio::test]
    async fn retryable_failures_are_retried_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, String> = with_backoff(&quick(), "test", move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(MaybeRetry::MaybeRetry(format!("flaky {}", n)))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result, Ok(3));
    }

    #[tokio::test]
    async fn final_failures_stop_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_backoff(&quick(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MaybeRetry::NoRetry("bad request".to_string()))
        })
        .await;
        assert_eq!(result, Err("bad request".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_stop_when_the_policy_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), String> = with_backoff(&quick(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(MaybeRetry::MaybeRetry("down".to_string()))
        })
        .await;
        assert!(result.is_err());
        // One first attempt plus the two retries the policy allows.
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
