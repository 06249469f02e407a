use crate::error::{AppError, AppResult};
use crate::metrics::{self, ReadKind};
use crate::middleware::ConversationMember;
use crate::models::{InsertOutcome, MarkReadOutcome, Message, NewMessage};
use crate::services::notifier::MessageNotifier;
use crate::store::{ConversationStore, MessageStore};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 5000;

/// Message creation and single-message read transitions
#[derive(Clone)]
pub struct MessageService {
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
    notifier: Arc<dyn MessageNotifier>,
    max_message_length: usize,
}

impl MessageService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        conversations: Arc<dyn ConversationStore>,
        notifier: Arc<dyn MessageNotifier>,
        max_message_length: usize,
    ) -> Self {
        Self {
            messages,
            conversations,
            notifier,
            max_message_length,
        }
    }

    fn validate(&self, new: &NewMessage) -> AppResult<()> {
        if new.content.trim().is_empty() {
            return Err(AppError::Validation("content must not be empty".into()));
        }
        if new.content.chars().count() > self.max_message_length {
            return Err(AppError::Validation(format!(
                "content exceeds {} characters",
                self.max_message_length
            )));
        }
        if new.sender_id == new.recipient_id {
            return Err(AppError::Validation(
                "sender and recipient must differ".into(),
            ));
        }
        if new.attachments.iter().any(|a| a.url.trim().is_empty()) {
            return Err(AppError::Validation("attachment url must not be empty".into()));
        }
        if matches!(&new.idempotency_key, Some(k) if k.trim().is_empty() || k.len() > 128) {
            return Err(AppError::Validation(
                "idempotency key must be 1-128 characters".into(),
            ));
        }
        Ok(())
    }

    /// Insert a message and bump the recipient's unread counter.
    ///
    /// The insert and the increment are one store primitive. A replay with a
    /// known idempotency key returns the stored message and leaves every
    /// counter untouched, so retrying after a partial failure never drops
    /// the increment.
    pub async fn create_message(&self, new: NewMessage) -> AppResult<Message> {
        self.validate(&new)?;

        let conversation = self
            .conversations
            .get_conversation(new.conversation_id)
            .await?
            .ok_or(AppError::ConversationNotFound(new.conversation_id))?;

        // Non-members see the same error as for a missing conversation
        if !conversation.is_participant(new.sender_id) {
            tracing::warn!(
                conversation_id = %new.conversation_id,
                sender_id = %new.sender_id,
                "create_message by non-participant"
            );
            return Err(AppError::ConversationNotFound(new.conversation_id));
        }
        if !conversation.is_participant(new.recipient_id) {
            return Err(AppError::Validation(
                "recipient is not a participant of this conversation".into(),
            ));
        }

        let now = Utc::now();
        let message = match self.messages.insert_message(&new, now).await? {
            InsertOutcome::Inserted(message) => message,
            InsertOutcome::Existing(message) => {
                tracing::debug!(
                    message_id = %message.id,
                    conversation_id = %message.conversation_id,
                    "idempotent replay of create_message"
                );
                return Ok(message);
            }
        };

        metrics::record_message_created();
        tracing::info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            sender_id = %message.sender_id,
            "message created"
        );

        if let Err(e) = self.notifier.message_created(&message).await {
            tracing::warn!(message_id = %message.id, error = %e, "message notifier failed");
        }

        Ok(message)
    }

    /// Idempotent single-message read by its recipient.
    ///
    /// The counter is decremented only by the call that performed the flip,
    /// inside the same store primitive as the flip.
    pub async fn mark_read(&self, message_id: Uuid, by_user_id: Uuid) -> AppResult<MarkReadOutcome> {
        let message = self
            .messages
            .get_message(message_id)
            .await?
            .ok_or(AppError::MessageNotFound(message_id))?;

        if message.recipient_id != by_user_id {
            tracing::warn!(
                message_id = %message_id,
                user_id = %by_user_id,
                "mark_read by non-recipient"
            );
            return Err(AppError::NotRecipient(message_id));
        }
        if message.is_read {
            return Ok(MarkReadOutcome::AlreadyRead(message));
        }

        let now = Utc::now();
        if !self.messages.mark_read_if_unread(message_id, now).await? {
            // Lost the race to a concurrent reader
            let current = self
                .messages
                .get_message(message_id)
                .await?
                .ok_or(AppError::MessageNotFound(message_id))?;
            return Ok(MarkReadOutcome::AlreadyRead(current));
        }

        metrics::record_read_transitions(ReadKind::Single, 1);

        Ok(MarkReadOutcome::Marked(Message {
            is_read: true,
            read_at: Some(now),
            ..message
        }))
    }

    /// Messages of a conversation in creation order, for a participant
    pub async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<Vec<Message>> {
        ConversationMember::verify(self.conversations.as_ref(), viewer_id, conversation_id).await?;
        self.messages.list_by_conversation(conversation_id).await
    }
}
