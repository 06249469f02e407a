use crate::error::AppResult;
use crate::models::Message;

/// Receives every newly created message (not idempotent replays).
///
/// Boundary for the push-notification collaborator. Failures are logged by
/// the caller and never fail the create.
#[async_trait::async_trait]
pub trait MessageNotifier: Send + Sync {
    async fn message_created(&self, message: &Message) -> AppResult<()>;
}

/// Default notifier: emits a structured log event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait::async_trait]
impl MessageNotifier for TracingNotifier {
    async fn message_created(&self, message: &Message) -> AppResult<()> {
        tracing::info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            recipient_id = %message.recipient_id,
            "new message notification"
        );
        Ok(())
    }
}
