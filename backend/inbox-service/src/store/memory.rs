use super::{ConversationStore, MessageStore, UnreadCounter, UnreadRecount};
use crate::error::{AppError, AppResult};
use crate::models::{
    participant_key, Conversation, InsertOutcome, Message, NewConversation, NewMessage,
};
use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct MessageTable {
    by_id: HashMap<Uuid, Message>,
    /// Insertion order per conversation
    by_conversation: HashMap<Uuid, Vec<Uuid>>,
    by_idempotency_key: HashMap<(Uuid, String), Uuid>,
}

/// In-process store.
///
/// Conversation facets are mutated under the `DashMap` entry lock of that
/// conversation, so two keys of different conversations never contend. The
/// message table sits behind one `RwLock`; bulk read transitions take the
/// write lock once. Primitives that touch both hold the entry lock across
/// the message table access, so counters move together with read state.
#[derive(Default)]
pub struct MemoryStore {
    conversations: DashMap<Uuid, Conversation>,
    /// participant key -> conversation ids, guarded for find-or-create
    participant_index: Mutex<HashMap<String, Vec<Uuid>>>,
    messages: RwLock<MessageTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry lock of a conversation, checked for membership of `user_id`.
    ///
    /// Lock order is conversation entry first, then the message table.
    fn participant_entry(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<RefMut<'_, Uuid, Conversation>> {
        let conversation = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or(AppError::ConversationNotFound(conversation_id))?;
        if !conversation.is_participant(user_id) {
            return Err(AppError::NotParticipant(conversation_id));
        }
        Ok(conversation)
    }

    fn with_participant<T>(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        f: impl FnOnce(&mut Conversation) -> T,
    ) -> AppResult<T> {
        let mut conversation = self.participant_entry(conversation_id, user_id)?;
        Ok(f(&mut conversation))
    }
}

#[async_trait::async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(
        &self,
        new: &NewMessage,
        now: DateTime<Utc>,
    ) -> AppResult<InsertOutcome> {
        let mut conversation = self.participant_entry(new.conversation_id, new.recipient_id)?;
        let mut table = self.messages.write();

        if let Some(key) = &new.idempotency_key {
            let existing = table
                .by_idempotency_key
                .get(&(new.conversation_id, key.clone()))
                .and_then(|id| table.by_id.get(id));
            if let Some(existing) = existing {
                return Ok(InsertOutcome::Existing(existing.clone()));
            }
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            recipient_id: new.recipient_id,
            content: new.content.clone(),
            attachments: new.attachments.clone(),
            is_read: false,
            read_at: None,
            idempotency_key: new.idempotency_key.clone(),
            created_at: now,
        };

        if let Some(key) = &new.idempotency_key {
            table
                .by_idempotency_key
                .insert((new.conversation_id, key.clone()), message.id);
        }
        table
            .by_conversation
            .entry(new.conversation_id)
            .or_default()
            .push(message.id);
        table.by_id.insert(message.id, message.clone());

        *conversation.unread_count.entry(message.recipient_id).or_insert(0) += 1;
        conversation.last_message_id = Some(message.id);
        if now > conversation.updated_at {
            conversation.updated_at = now;
        }

        Ok(InsertOutcome::Inserted(message))
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.messages.read().by_id.get(&message_id).cloned())
    }

    async fn mark_read_if_unread(&self, message_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        // conversation and recipient never change after insert
        let (conversation_id, recipient_id) = self
            .messages
            .read()
            .by_id
            .get(&message_id)
            .map(|m| (m.conversation_id, m.recipient_id))
            .ok_or(AppError::MessageNotFound(message_id))?;

        let mut conversation = self.participant_entry(conversation_id, recipient_id)?;
        let mut table = self.messages.write();
        let message = table
            .by_id
            .get_mut(&message_id)
            .ok_or(AppError::MessageNotFound(message_id))?;
        if message.is_read {
            return Ok(false);
        }
        message.is_read = true;
        message.read_at = Some(now);

        let count = conversation.unread_count.entry(recipient_id).or_insert(0);
        *count = (*count - 1).max(0);
        Ok(true)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        recipient_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut conversation = self.participant_entry(conversation_id, recipient_id)?;
        let mut guard = self.messages.write();
        let table = &mut *guard;

        let mut flipped = 0;
        if let Some(ids) = table.by_conversation.get(&conversation_id) {
            for id in ids {
                if let Some(message) = table.by_id.get_mut(id) {
                    if message.is_unread_for(recipient_id) {
                        message.is_read = true;
                        message.read_at = Some(now);
                        flipped += 1;
                    }
                }
            }
        }

        // Reset, not decrement: also absorbs any earlier drift
        conversation.unread_count.insert(recipient_id, 0);
        Ok(flipped)
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let table = self.messages.read();
        let mut messages: Vec<Message> = table
            .by_conversation
            .get(&conversation_id)
            .map(|ids| ids.iter().filter_map(|id| table.by_id.get(id).cloned()).collect())
            .unwrap_or_default();
        // Stable: equal timestamps keep insertion order
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn count_unread_by_conversation(
        &self,
        recipient_id: Uuid,
    ) -> AppResult<HashMap<Uuid, i64>> {
        let table = self.messages.read();
        let mut counts = HashMap::new();
        for message in table.by_id.values() {
            if message.is_unread_for(recipient_id) {
                *counts.entry(message.conversation_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryStore {
    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self
            .conversations
            .get(&conversation_id)
            .map(|c| c.value().clone()))
    }

    async fn find_or_create(
        &self,
        new: &NewConversation,
        now: DateTime<Utc>,
    ) -> AppResult<(Conversation, bool)> {
        let key = participant_key(&new.participant_ids);
        let mut index = self.participant_index.lock();

        let existing = index
            .get(&key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.conversations.get(id).map(|c| c.value().clone()))
            .filter(|c| new.property_id.is_none() || c.property_id == new.property_id)
            .max_by_key(|c| c.updated_at);
        if let Some(conversation) = existing {
            return Ok((conversation, false));
        }

        let conversation = Conversation::new(
            new.participant_ids.clone(),
            new.property_id,
            new.title.clone(),
            now,
        );
        self.conversations
            .insert(conversation.id, conversation.clone());
        index.entry(key).or_default().push(conversation.id);
        Ok((conversation, true))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        include_archived: bool,
    ) -> AppResult<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|c| c.is_participant(user_id))
            .filter(|c| include_archived || !c.archived_for(user_id))
            .map(|c| c.value().clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn increment_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        delta: i64,
    ) -> AppResult<i64> {
        self.with_participant(conversation_id, user_id, |c| {
            let count = c.unread_count.entry(user_id).or_insert(0);
            *count += delta;
            *count
        })
    }

    async fn decrement_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        delta: i64,
    ) -> AppResult<i64> {
        self.with_participant(conversation_id, user_id, |c| {
            let count = c.unread_count.entry(user_id).or_insert(0);
            *count = (*count - delta).max(0);
            *count
        })
    }

    async fn recount_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<UnreadRecount> {
        let mut conversation = self.participant_entry(conversation_id, user_id)?;
        let table = self.messages.read();

        let current = table
            .by_conversation
            .get(&conversation_id)
            .into_iter()
            .flatten()
            .filter_map(|id| table.by_id.get(id))
            .filter(|m| m.is_unread_for(user_id))
            .count() as i64;
        let previous = conversation.unread_count.insert(user_id, current).unwrap_or(0);

        Ok(UnreadRecount { previous, current })
    }

    async fn set_archived(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        archived: bool,
    ) -> AppResult<()> {
        self.with_participant(conversation_id, user_id, |c| {
            c.is_archived.insert(user_id, archived);
        })
    }

    async fn unread_counters(&self, user_id: Uuid) -> AppResult<Vec<UnreadCounter>> {
        Ok(self
            .conversations
            .iter()
            .filter(|c| c.is_participant(user_id))
            .map(|c| UnreadCounter {
                conversation_id: c.id,
                unread_count: c.unread_for(user_id),
                is_archived: c.archived_for(user_id),
            })
            .collect())
    }
}
