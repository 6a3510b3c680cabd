//! Retry policy and failure classification shared by every remote call.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;

use crate::delay_manager;

/// Classified failure of a single attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("not found")]
    NotFound,
    #[error("client error: {0}")]
    ClientError(String),
    #[error("server error: {0}")]
    ServerError(String),
    #[error("timed out")]
    Timeout,
    #[error("transient protocol error: {0}")]
    TransientProtocol(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::ServerError(_) | FetchError::Timeout | FetchError::TransientProtocol(_)
        )
    }
}

/// Result of one attempt.
pub type FetchOutcome<T> = Result<T, FetchError>;

/// Successful fetch and the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub attempts: u32,
}

/// Final failure after the retry policy gave up.
///
/// `exhausted` is set when the last kind was retryable and the attempt
/// budget ran out, as opposed to a terminal failure returned immediately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FetchError,
    pub attempts: u32,
    pub exhausted: bool,
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} attempt(s)", self.kind, self.attempts)?;
        if self.exhausted {
            f.write_str(", exhausted")?;
        }
        f.write_str(")")
    }
}

impl std::error::Error for FetchFailure {}

impl FetchFailure {
    pub fn is_not_found(&self) -> bool {
        self.kind == FetchError::NotFound
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Total tries, including the first.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout: Duration::from_secs(20),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
        }
    }
}

/// Runs `attempt` until it succeeds, fails terminally, or the budget is spent.
/// The closure receives the 1-indexed attempt number.
pub async fn fetch_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<Fetched<T>, FetchFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = FetchOutcome<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut number = 1;

    loop {
        if number > 1 {
            delay_manager::retry_pause(policy.backoff_base, number, policy.max_jitter).await;
        }

        let outcome = match tokio::time::timeout(policy.timeout, attempt(number)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchError::Timeout),
        };

        match outcome {
            Ok(value) => {
                return Ok(Fetched {
                    value,
                    attempts: number,
                })
            }
            Err(kind) if !kind.is_retryable() => {
                return Err(FetchFailure {
                    kind,
                    attempts: number,
                    exhausted: false,
                })
            }
            Err(kind) if number >= max_attempts => {
                warn!("Giving up after {} attempt(s): {}", number, kind);
                return Err(FetchFailure {
                    kind,
                    attempts: number,
                    exhausted: true,
                });
            }
            Err(kind) => {
                debug!("Attempt {}/{} failed: {}", number, max_attempts, kind);
                number += 1;
            }
        }
    }
}

/// Maps an HTTP status code to a failure kind; `None` means success.
pub fn classify_status(status: u16) -> Option<FetchError> {
    match status {
        200..=299 => None,
        404 => Some(FetchError::NotFound),
        403 | 429 => Some(FetchError::TransientProtocol(format!("HTTP {}", status))),
        400..=499 => Some(FetchError::ClientError(format!("HTTP {}", status))),
        500..=599 => Some(FetchError::ServerError(format!("HTTP {}", status))),
        _ => Some(FetchError::ClientError(format!("unexpected HTTP {}", status))),
    }
}

/// Maps a transport-level reqwest failure to a failure kind.
pub fn classify_reqwest_error(err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout;
    }
    if let Some(status) = err.status() {
        if let Some(kind) = classify_status(status.as_u16()) {
            return kind;
        }
    }
    if err.is_builder() {
        return FetchError::ClientError(err.to_string());
    }
    FetchError::TransientProtocol(err.to_string())
}

const TRANSIENT_MARKERS: &[&str] = &[
    "429",
    "403",
    "too many requests",
    "rate limit",
    "rate-limit",
    "temporarily",
    "timed out",
    "connection reset",
    "sign in to confirm",
];

const NOT_FOUND_MARKERS: &[&str] = &["404", "not found", "does not exist"];

const CLIENT_MARKERS: &[&str] = &["unsupported url", "private video", "unavailable"];

/// Classifies a lookup backend failure from its error text.
pub fn classify_backend_error(text: &str) -> FetchError {
    let lower = text.to_lowercase();
    let excerpt: String = text.trim().chars().take(120).collect();

    if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        FetchError::TransientProtocol(excerpt)
    } else if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        FetchError::NotFound
    } else if CLIENT_MARKERS.iter().any(|m| lower.contains(m)) {
        FetchError::ClientError(excerpt)
    } else {
        FetchError::ServerError(excerpt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(5),
            max_attempts,
            backoff_base: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(204), None);
        assert_eq!(classify_status(404), Some(FetchError::NotFound));
        assert!(matches!(classify_status(403), Some(FetchError::TransientProtocol(_))));
        assert!(matches!(classify_status(429), Some(FetchError::TransientProtocol(_))));
        assert!(matches!(classify_status(400), Some(FetchError::ClientError(_))));
        assert!(matches!(classify_status(410), Some(FetchError::ClientError(_))));
        assert!(matches!(classify_status(500), Some(FetchError::ServerError(_))));
        assert!(matches!(classify_status(503), Some(FetchError::ServerError(_))));
        assert!(matches!(classify_status(302), Some(FetchError::ClientError(_))));
    }

    #[test]
    fn retryable_kinds() {
        assert!(FetchError::ServerError("x".into()).is_retryable());
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::TransientProtocol("x".into()).is_retryable());
        assert!(!FetchError::NotFound.is_retryable());
        assert!(!FetchError::ClientError("x".into()).is_retryable());
    }

    #[test]
    fn backend_error_text() {
        assert!(matches!(
            classify_backend_error("ERROR: HTTP Error 429: Too Many Requests"),
            FetchError::TransientProtocol(_)
        ));
        assert!(matches!(
            classify_backend_error("Sign in to confirm you're not a bot"),
            FetchError::TransientProtocol(_)
        ));
        assert_eq!(
            classify_backend_error("ERROR: [youtube:tab] channel does not exist"),
            FetchError::NotFound
        );
        assert!(matches!(
            classify_backend_error("ERROR: Unsupported URL: foo"),
            FetchError::ClientError(_)
        ));
        assert!(matches!(
            classify_backend_error("something odd happened"),
            FetchError::ServerError(_)
        ));
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let result = fetch_with_retry(&quick_policy(3), |_| async { Ok::<_, FetchError>(7) }).await;
        assert_eq!(result, Ok(Fetched { value: 7, attempts: 1 }));
    }

    #[tokio::test]
    async fn terminal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<Fetched<()>, _> = fetch_with_retry(&quick_policy(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::NotFound) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let failure = result.unwrap_err();
        assert!(failure.is_not_found());
        assert!(!failure.exhausted);
        assert_eq!(failure.attempts, 1);
    }

    #[tokio::test]
    async fn retryable_failure_recovers() {
        let result = fetch_with_retry(&quick_policy(3), |n| async move {
            if n < 3 {
                Err(FetchError::ServerError("HTTP 502".into()))
            } else {
                Ok("page")
            }
        })
        .await;
        assert_eq!(result, Ok(Fetched { value: "page", attempts: 3 }));
    }

    #[tokio::test]
    async fn exhausted_retries_are_tagged() {
        let calls = AtomicU32::new(0);
        let result: Result<Fetched<()>, _> = fetch_with_retry(&quick_policy(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::TransientProtocol("HTTP 429".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let failure = result.unwrap_err();
        assert!(failure.exhausted);
        assert_eq!(failure.attempts, 3);
        assert!(failure.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn slow_attempt_times_out() {
        let policy = RetryPolicy {
            timeout: Duration::from_millis(20),
            ..quick_policy(2)
        };
        let result: Result<Fetched<()>, _> = fetch_with_retry(&policy, |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FetchError::Timeout);
        assert_eq!(failure.attempts, 2);
        assert!(failure.exhausted);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let result = fetch_with_retry(&quick_policy(0), |_| async { Ok::<_, FetchError>(1) }).await;
        assert_eq!(result.map(|f| f.attempts), Ok(1));
    }
}
