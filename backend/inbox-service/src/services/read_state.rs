//! Bulk "open conversation" read transition.
//!
//! The messages are flipped and the viewer's counter is reset to 0 in one
//! store primitive, so the reset never lands without the flip. Re-running an
//! open flips nothing and resets an already-zero counter.

use crate::error::AppResult;
use crate::metrics::{self, ReadKind};
use crate::middleware::ConversationMember;
use crate::models::{Conversation, Message};
use crate::store::{ConversationStore, MessageStore};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct OpenedConversation {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    /// Messages flipped to read by this open
    pub marked_read: u64,
}

#[derive(Clone)]
pub struct ReadStateEngine {
    messages: Arc<dyn MessageStore>,
    conversations: Arc<dyn ConversationStore>,
}

impl ReadStateEngine {
    pub fn new(messages: Arc<dyn MessageStore>, conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            messages,
            conversations,
        }
    }

    pub async fn open_conversation(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
    ) -> AppResult<OpenedConversation> {
        let member =
            ConversationMember::verify(self.conversations.as_ref(), viewer_id, conversation_id)
                .await?;

        let marked_read = self
            .messages
            .mark_conversation_read(conversation_id, viewer_id, Utc::now())
            .await?;

        let messages = self.messages.list_by_conversation(conversation_id).await?;

        metrics::record_read_transitions(ReadKind::Bulk, marked_read);
        tracing::debug!(
            conversation_id = %conversation_id,
            viewer_id = %viewer_id,
            marked_read,
            "conversation opened"
        );

        let mut conversation = member.conversation;
        conversation.unread_count.insert(viewer_id, 0);
        Ok(OpenedConversation {
            conversation,
            messages,
            marked_read,
        })
    }
}
