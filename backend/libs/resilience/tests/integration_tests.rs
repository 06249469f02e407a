/// Integration tests for resilience library
use resilience::{with_retry_if, with_timeout, RetryConfig, RetryError, TimeoutError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum StoreError {
    Unavailable,
    Rejected,
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Unavailable => write!(f, "unavailable"),
            StoreError::Rejected => write!(f, "rejected"),
        }
    }
}

impl From<TimeoutError> for StoreError {
    fn from(_: TimeoutError) -> Self {
        StoreError::Unavailable
    }
}

fn fast_config(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

fn is_transient(e: &StoreError) -> bool {
    matches!(e, StoreError::Unavailable)
}

#[tokio::test]
async fn test_timed_out_attempts_are_retried() {
    let attempts = Arc::new(AtomicU32::new(0));

    let result = with_retry_if(&fast_config(3), is_transient, || {
        let attempts = attempts.clone();
        async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            let slow = async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                Ok::<_, StoreError>(n)
            };
            with_timeout(Duration::from_millis(20), slow).await?
        }
    })
    .await;

    assert_eq!(result.unwrap(), 1);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_permanent_error_stops_immediately() {
    let attempts = Arc::new(AtomicU32::new(0));

    let result: Result<(), _> = with_retry_if(&fast_config(5), is_transient, || {
        let attempts = attempts.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Rejected)
        }
    })
    .await;

    assert!(matches!(result, Err(RetryError::Permanent(StoreError::Rejected))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhausted_reports_attempt_count() {
    let result: Result<(), _> = with_retry_if(&fast_config(2), is_transient, || async {
        Err(StoreError::Unavailable)
    })
    .await;

    match result {
        Err(RetryError::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(last, StoreError::Unavailable));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_backoff_grows_between_attempts() {
    let start = Instant::now();
    let _: Result<(), _> = with_retry_if(&fast_config(3), is_transient, || async {
        Err(StoreError::Unavailable)
    })
    .await;

    // 5ms + 10ms + 20ms without jitter
    assert!(start.elapsed() >= Duration::from_millis(35));
}

#[tokio::test]
async fn test_disabled_config_runs_once() {
    let attempts = Arc::new(AtomicU32::new(0));

    let _: Result<(), _> = with_retry_if(&RetryConfig::disabled(), is_transient, || {
        let attempts = attempts.clone();
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable)
        }
    })
    .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
