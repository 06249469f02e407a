use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::{
    ArchivedPolicy, ConversationService, MessageNotifier, MessageService, ReadStateEngine,
    TracingNotifier, UnreadAggregator,
};
use crate::store::{ConversationStore, MemoryStore, MessageStore};
use resilience::{with_retry_if, with_timeout, RetryConfig, RetryError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub messages: MessageService,
    pub conversations: ConversationService,
    pub read_state: ReadStateEngine,
    pub unread: UnreadAggregator,
    retry: RetryConfig,
    store_timeout: Duration,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        message_store: Arc<dyn MessageStore>,
        conversation_store: Arc<dyn ConversationStore>,
        notifier: Arc<dyn MessageNotifier>,
    ) -> Self {
        let policy = ArchivedPolicy::from_include_flag(config.unread_include_archived);
        Self {
            messages: MessageService::new(
                message_store.clone(),
                conversation_store.clone(),
                notifier,
                config.max_message_length,
            ),
            conversations: ConversationService::new(conversation_store.clone()),
            read_state: ReadStateEngine::new(message_store.clone(), conversation_store.clone()),
            unread: UnreadAggregator::new(message_store, conversation_store, policy),
            retry: config.store_retry.clone(),
            store_timeout: config.store_timeout,
            config,
        }
    }

    /// Single-process state backed by [`MemoryStore`]
    pub fn in_memory(config: Arc<Config>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(config, store.clone(), store, Arc::new(TracingNotifier))
    }

    /// Run one logical operation with a per-attempt deadline, retrying it
    /// while it fails with a retryable error.
    ///
    /// Only operations that are safe to repeat go through here: idempotent
    /// transitions, or creates carrying an idempotency key.
    pub async fn with_store_retry<T, F, Fut>(&self, operation: &'static str, mut f: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let deadline = self.store_timeout;
        with_retry_if(&self.retry, AppError::is_retryable, || {
            let attempt = f();
            async move {
                match with_timeout(deadline, attempt).await {
                    Ok(result) => result,
                    Err(elapsed) => Err(elapsed.into()),
                }
            }
        })
        .await
        .map_err(|e| {
            if let RetryError::Exhausted { attempts, last } = &e {
                tracing::error!(operation, attempts, error = %last, "store retries exhausted");
            }
            e.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn state_with_retries(max_retries: u32) -> AppState {
        let mut config = Config::for_memory("secret");
        config.store_retry = RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..RetryConfig::default()
        };
        AppState::in_memory(Arc::new(config))
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let state = state_with_retries(3);
        let calls = AtomicU32::new(0);

        let result = state
            .with_store_retry("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(AppError::TransientStore("pool timed out".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let state = state_with_retries(3);
        let calls = AtomicU32::new(0);

        let result: AppResult<()> = state
            .with_store_retry("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(AppError::Validation("bad".into())) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_error() {
        let state = state_with_retries(1);

        let result: AppResult<()> = state
            .with_store_retry("test", || async {
                Err(AppError::TransientStore("down".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::TransientStore(_))));
    }
}
