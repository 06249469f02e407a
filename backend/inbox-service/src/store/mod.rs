//! Storage seams for messages and conversations.
//!
//! Both traits are implemented by [`MemoryStore`] (single process, tests and
//! local runs) and [`PgStore`] (Postgres). Each backend implements both on
//! one type because the read-state primitives span messages and counters.
//! Every counter mutation is a per-key atomic primitive; nothing replaces a
//! whole facet map.

pub mod memory;
pub mod postgres;

use crate::error::AppResult;
use crate::models::{Conversation, InsertOutcome, Message, NewConversation, NewMessage};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Counter value before and after a recount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreadRecount {
    pub previous: i64,
    pub current: i64,
}

impl UnreadRecount {
    pub fn drifted(&self) -> bool {
        self.previous != self.current
    }
}

/// Cached counter and archive flag of one user in one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnreadCounter {
    pub conversation_id: Uuid,
    pub unread_count: i64,
    pub is_archived: bool,
}

/// Message rows plus the counter side effects of their read state.
///
/// Every method that changes read state also moves the affected unread
/// counter inside the same primitive, so a retried or cancelled call never
/// leaves the counter behind its messages.
#[async_trait::async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a message with `is_read = false`.
    ///
    /// A new row also increments the recipient's counter and points the
    /// conversation's last message at it, atomically with the insert. When
    /// `new.idempotency_key` matches an existing message in the same
    /// conversation, that message is returned as `InsertOutcome::Existing`
    /// and nothing else changes.
    async fn insert_message(&self, new: &NewMessage, now: DateTime<Utc>)
        -> AppResult<InsertOutcome>;

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>>;

    /// Conditional false→true flip plus a decrement of the recipient's
    /// counter (clamped at 0). Returns true only for the call that flipped.
    async fn mark_read_if_unread(&self, message_id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;

    /// Flip every unread message of `recipient_id` in the conversation and
    /// reset that recipient's counter to 0, in one primitive. Returns the
    /// number flipped by this call.
    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        recipient_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Ascending by `created_at`
    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Ground truth: unread messages addressed to `recipient_id`, grouped by
    /// conversation. Conversations with none are omitted.
    async fn count_unread_by_conversation(
        &self,
        recipient_id: Uuid,
    ) -> AppResult<HashMap<Uuid, i64>>;
}

#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>>;

    /// Return the conversation with exactly this participant set, creating it
    /// if absent. `participant_ids` must already be normalized. The bool is
    /// true when this call created it.
    ///
    /// With `property_id: None` any conversation of the set matches (most
    /// recently updated wins).
    async fn find_or_create(
        &self,
        new: &NewConversation,
        now: DateTime<Utc>,
    ) -> AppResult<(Conversation, bool)>;

    /// Sorted by `updated_at` descending
    async fn list_for_user(&self, user_id: Uuid, include_archived: bool)
        -> AppResult<Vec<Conversation>>;

    /// Atomic add; the entry starts at 0 when absent. Returns the new value.
    async fn increment_unread(&self, conversation_id: Uuid, user_id: Uuid, delta: i64)
        -> AppResult<i64>;

    /// Atomic subtract clamped at 0. Returns the new value.
    async fn decrement_unread(&self, conversation_id: Uuid, user_id: Uuid, delta: i64)
        -> AppResult<i64>;

    /// Replace the cached counter with the number of unread messages
    /// addressed to `user_id` in the conversation. The count and the write
    /// are one primitive, so a concurrent create is never overwritten.
    async fn recount_unread(&self, conversation_id: Uuid, user_id: Uuid)
        -> AppResult<UnreadRecount>;

    async fn set_archived(&self, conversation_id: Uuid, user_id: Uuid, archived: bool)
        -> AppResult<()>;

    /// Cached counters of every conversation the user participates in
    async fn unread_counters(&self, user_id: Uuid) -> AppResult<Vec<UnreadCounter>>;
}
