use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: Option<String>,
    pub size: Option<i64>,
}

/// A single message. Only `is_read` / `read_at` ever change after insert,
/// and they change together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn is_unread_for(&self, user_id: Uuid) -> bool {
        self.recipient_id == user_id && !self.is_read
    }

    /// `read_at` is set iff `is_read`
    pub fn read_state_consistent(&self) -> bool {
        self.is_read == self.read_at.is_some()
    }
}

/// Input for `MessageService::create_message`
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub recipient_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub idempotency_key: Option<String>,
}

impl NewMessage {
    pub fn text(conversation_id: Uuid, sender_id: Uuid, recipient_id: Uuid, content: &str) -> Self {
        Self {
            conversation_id,
            sender_id,
            recipient_id,
            content: content.to_string(),
            attachments: Vec::new(),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Result of a message insert at the store level
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Message),
    /// A message with the same idempotency key already existed
    Existing(Message),
}

impl InsertOutcome {
    pub fn message(&self) -> &Message {
        match self {
            InsertOutcome::Inserted(m) | InsertOutcome::Existing(m) => m,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            InsertOutcome::Inserted(m) | InsertOutcome::Existing(m) => m,
        }
    }
}

/// Result of a single-message read transition
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum MarkReadOutcome {
    Marked(Message),
    AlreadyRead(Message),
}

impl MarkReadOutcome {
    pub fn message(&self) -> &Message {
        match self {
            MarkReadOutcome::Marked(m) | MarkReadOutcome::AlreadyRead(m) => m,
        }
    }

    pub fn was_already_read(&self) -> bool {
        matches!(self, MarkReadOutcome::AlreadyRead(_))
    }
}
