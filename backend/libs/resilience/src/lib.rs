/// Resilience patterns for store and service calls
///
/// - **Retry**: exponential backoff with jitter, gated by a caller supplied
///   predicate so only transient failures are retried
/// - **Timeout**: deadline for a single attempt
///
/// # Example
///
/// ```rust,no_run
/// use resilience::retry::{with_retry_if, RetryConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_retry_if(&RetryConfig::default(), |e: &String| e.starts_with("busy"), || async {
///         Ok::<_, String>(42)
///     })
///     .await;
///     assert_eq!(result.ok(), Some(42));
/// }
/// ```
pub mod retry;
pub mod timeout;

pub use retry::{with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, TimeoutError};
