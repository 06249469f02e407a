use super::{ConversationStore, MessageStore, UnreadCounter, UnreadRecount};
use crate::error::{AppError, AppResult};
use crate::models::{
    participant_key, Attachment, Conversation, InsertOutcome, Message, NewConversation,
    NewMessage,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, recipient_id, content, \
     attachments, is_read, read_at, idempotency_key, created_at";

const CONVERSATION_COLUMNS: &str =
    "id, participant_ids, property_id, title, last_message_id, created_at, updated_at";

// Counter upserts only insert a facet row for a member of the conversation.
// $1 conversation, $2 user, $3 delta.
const INCREMENT_UNREAD_SQL: &str = r#"
    INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
    SELECT c.id, $2::uuid, $3::bigint FROM conversations c
    WHERE c.id = $1 AND $2 = ANY(c.participant_ids)
    ON CONFLICT (conversation_id, user_id)
    DO UPDATE SET unread_count = conversation_participants.unread_count + EXCLUDED.unread_count
    RETURNING unread_count
"#;

const DECREMENT_UNREAD_SQL: &str = r#"
    INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
    SELECT c.id, $2::uuid, 0 FROM conversations c
    WHERE c.id = $1 AND $2 = ANY(c.participant_ids)
    ON CONFLICT (conversation_id, user_id)
    DO UPDATE SET unread_count = GREATEST(conversation_participants.unread_count - $3, 0)
    RETURNING unread_count
"#;

// Row-locks the facet row (creating it at 0) and returns the current value.
// Read-state primitives take this lock before touching messages, so they
// serialize with creates, which take it after their insert.
const LOCK_COUNTER_SQL: &str = r#"
    INSERT INTO conversation_participants (conversation_id, user_id, unread_count)
    SELECT c.id, $2::uuid, 0 FROM conversations c
    WHERE c.id = $1 AND $2 = ANY(c.participant_ids)
    ON CONFLICT (conversation_id, user_id)
    DO UPDATE SET unread_count = conversation_participants.unread_count
    RETURNING unread_count
"#;

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    content: String,
    attachments: Json<Vec<Attachment>>,
    is_read: bool,
    read_at: Option<DateTime<Utc>>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            content: row.content,
            attachments: row.attachments.0,
            is_read: row.is_read,
            read_at: row.read_at,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    participant_ids: Vec<Uuid>,
    property_id: Option<Uuid>,
    title: Option<String>,
    last_message_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id,
            participant_ids: row.participant_ids,
            property_id: row.property_id,
            title: row.title,
            last_message_id: row.last_message_id,
            unread_count: HashMap::new(),
            is_archived: HashMap::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct FacetRow {
    conversation_id: Uuid,
    user_id: Uuid,
    unread_count: i64,
    is_archived: bool,
}

/// Postgres-backed store.
///
/// Facet rows in `conversation_participants` are created lazily by the
/// upserts below; each upsert only inserts when the user is in the
/// conversation's `participant_ids`. Primitives that change read state run
/// in one transaction together with their counter update.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_facets(&self, mut conversations: Vec<Conversation>) -> AppResult<Vec<Conversation>> {
        if conversations.is_empty() {
            return Ok(conversations);
        }
        let ids: Vec<Uuid> = conversations.iter().map(|c| c.id).collect();
        let facets = sqlx::query_as::<_, FacetRow>(
            r#"
            SELECT conversation_id, user_id, unread_count, is_archived
            FROM conversation_participants
            WHERE conversation_id = ANY($1)
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_conversation: HashMap<Uuid, Vec<FacetRow>> = HashMap::new();
        for facet in facets {
            by_conversation
                .entry(facet.conversation_id)
                .or_default()
                .push(facet);
        }
        for conversation in &mut conversations {
            for facet in by_conversation.remove(&conversation.id).unwrap_or_default() {
                conversation
                    .unread_count
                    .insert(facet.user_id, facet.unread_count);
                conversation
                    .is_archived
                    .insert(facet.user_id, facet.is_archived);
            }
        }
        Ok(conversations)
    }

    /// Explain why a participant-guarded upsert touched no row
    async fn missing_facet_error(&self, conversation_id: Uuid) -> AppError {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM conversations WHERE id = $1)",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await;

        match exists {
            Ok(true) => AppError::NotParticipant(conversation_id),
            Ok(false) => AppError::ConversationNotFound(conversation_id),
            Err(e) => e.into(),
        }
    }

    async fn upsert_counter(
        &self,
        sql: &'static str,
        conversation_id: Uuid,
        user_id: Uuid,
        value: i64,
    ) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>(sql)
            .bind(conversation_id)
            .bind(user_id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        match count {
            Some(count) => Ok(count),
            None => Err(self.missing_facet_error(conversation_id).await),
        }
    }
}

#[async_trait::async_trait]
impl MessageStore for PgStore {
    async fn insert_message(
        &self,
        new: &NewMessage,
        now: DateTime<Utc>,
    ) -> AppResult<InsertOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, MessageRow>(&format!(
            r#"
            INSERT INTO messages (
                id, conversation_id, sender_id, recipient_id, content,
                attachments, is_read, read_at, idempotency_key, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, NULL, $7, $8)
            ON CONFLICT (conversation_id, idempotency_key) DO NOTHING
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.conversation_id)
        .bind(new.sender_id)
        .bind(new.recipient_id)
        .bind(&new.content)
        .bind(Json(&new.attachments))
        .bind(&new.idempotency_key)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = inserted else {
            tx.rollback().await?;
            // Conflict is only possible with a key present
            let existing = sqlx::query_as::<_, MessageRow>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages \
                 WHERE conversation_id = $1 AND idempotency_key = $2"
            ))
            .bind(new.conversation_id)
            .bind(&new.idempotency_key)
            .fetch_one(&self.pool)
            .await?;
            return Ok(InsertOutcome::Existing(existing.into()));
        };
        let message: Message = row.into();

        let counted = sqlx::query_scalar::<_, i64>(INCREMENT_UNREAD_SQL)
            .bind(message.conversation_id)
            .bind(message.recipient_id)
            .bind(1_i64)
            .fetch_optional(&mut *tx)
            .await?;
        if counted.is_none() {
            tx.rollback().await?;
            return Err(self.missing_facet_error(message.conversation_id).await);
        }

        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_id = $2, updated_at = GREATEST(updated_at, $3)
            WHERE id = $1
            "#,
        )
        .bind(message.conversation_id)
        .bind(message.id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(InsertOutcome::Inserted(message))
    }

    async fn get_message(&self, message_id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn mark_read_if_unread(&self, message_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        // conversation and recipient never change after insert
        let (conversation_id, recipient_id) = sqlx::query_as::<_, (Uuid, Uuid)>(
            "SELECT conversation_id, recipient_id FROM messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::MessageNotFound(message_id))?;

        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query_scalar::<_, i64>(LOCK_COUNTER_SQL)
            .bind(conversation_id)
            .bind(recipient_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Err(self.missing_facet_error(conversation_id).await);
        }

        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE, read_at = $2 WHERE id = $1 AND NOT is_read",
        )
        .bind(message_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        let flipped = result.rows_affected() == 1;

        if flipped {
            sqlx::query_scalar::<_, i64>(DECREMENT_UNREAD_SQL)
                .bind(conversation_id)
                .bind(recipient_id)
                .bind(1_i64)
                .fetch_one(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(flipped)
    }

    async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        recipient_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;
        let locked = sqlx::query_scalar::<_, i64>(LOCK_COUNTER_SQL)
            .bind(conversation_id)
            .bind(recipient_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Err(self.missing_facet_error(conversation_id).await);
        }

        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = $3
            WHERE conversation_id = $1 AND recipient_id = $2 AND NOT is_read
            "#,
        )
        .bind(conversation_id)
        .bind(recipient_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Reset, not decrement: also absorbs any earlier drift
        sqlx::query(
            "UPDATE conversation_participants SET unread_count = 0 \
             WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(recipient_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE conversation_id = $1 ORDER BY created_at ASC, seq ASC"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
        Ok(messages)
    }

    async fn count_unread_by_conversation(
        &self,
        recipient_id: Uuid,
    ) -> AppResult<HashMap<Uuid, i64>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT conversation_id, COUNT(*)::BIGINT
            FROM messages
            WHERE recipient_id = $1 AND NOT is_read
            GROUP BY conversation_id
            "#,
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl ConversationStore for PgStore {
    async fn get_conversation(&self, conversation_id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, ConversationRow>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1"
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_facets(vec![row.into()]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_or_create(
        &self,
        new: &NewConversation,
        now: DateTime<Utc>,
    ) -> AppResult<(Conversation, bool)> {
        let key = participant_key(&new.participant_ids);
        let mut tx = self.pool.begin().await?;

        // Serializes find-or-create per participant set
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query_as::<_, ConversationRow>(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS} FROM conversations
            WHERE participant_key = $1 AND ($2::uuid IS NULL OR property_id = $2)
            ORDER BY updated_at DESC
            LIMIT 1
            "#
        ))
        .bind(&key)
        .bind(new.property_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (row, created) = match existing {
            Some(row) => (row, false),
            None => {
                let row = sqlx::query_as::<_, ConversationRow>(&format!(
                    r#"
                    INSERT INTO conversations (
                        id, participant_ids, participant_key, property_id, title,
                        created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $6)
                    RETURNING {CONVERSATION_COLUMNS}
                    "#
                ))
                .bind(Uuid::new_v4())
                .bind(&new.participant_ids)
                .bind(&key)
                .bind(new.property_id)
                .bind(&new.title)
                .bind(now)
                .fetch_one(&mut *tx)
                .await?;
                (row, true)
            }
        };
        tx.commit().await?;

        let conversation = self
            .attach_facets(vec![row.into()])
            .await?
            .pop()
            .ok_or(AppError::Internal)?;
        Ok((conversation, created))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        include_archived: bool,
    ) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT c.id, c.participant_ids, c.property_id, c.title, c.last_message_id,
                   c.created_at, c.updated_at
            FROM conversations c
            LEFT JOIN conversation_participants cp
              ON cp.conversation_id = c.id AND cp.user_id = $1
            WHERE $1 = ANY(c.participant_ids)
              AND ($2 OR NOT COALESCE(cp.is_archived, FALSE))
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(user_id)
        .bind(include_archived)
        .fetch_all(&self.pool)
        .await?;

        self.attach_facets(rows.into_iter().map(Into::into).collect())
            .await
    }

    async fn increment_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        delta: i64,
    ) -> AppResult<i64> {
        self.upsert_counter(INCREMENT_UNREAD_SQL, conversation_id, user_id, delta)
            .await
    }

    async fn decrement_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        delta: i64,
    ) -> AppResult<i64> {
        self.upsert_counter(DECREMENT_UNREAD_SQL, conversation_id, user_id, delta)
            .await
    }

    async fn recount_unread(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<UnreadRecount> {
        let mut tx = self.pool.begin().await?;
        let Some(previous) = sqlx::query_scalar::<_, i64>(LOCK_COUNTER_SQL)
            .bind(conversation_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Err(self.missing_facet_error(conversation_id).await);
        };

        // Separate statement so the count sees every create committed before
        // the lock was granted
        let current = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE conversation_participants
            SET unread_count = (
                SELECT COUNT(*) FROM messages
                WHERE conversation_id = $1 AND recipient_id = $2 AND NOT is_read
            )
            WHERE conversation_id = $1 AND user_id = $2
            RETURNING unread_count
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(UnreadRecount { previous, current })
    }

    async fn set_archived(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        archived: bool,
    ) -> AppResult<()> {
        let updated = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO conversation_participants (conversation_id, user_id, is_archived)
            SELECT c.id, $2::uuid, $3::boolean FROM conversations c
            WHERE c.id = $1 AND $2 = ANY(c.participant_ids)
            ON CONFLICT (conversation_id, user_id)
            DO UPDATE SET is_archived = EXCLUDED.is_archived
            RETURNING is_archived
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(archived)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(_) => Ok(()),
            None => Err(self.missing_facet_error(conversation_id).await),
        }
    }

    async fn unread_counters(&self, user_id: Uuid) -> AppResult<Vec<UnreadCounter>> {
        let rows = sqlx::query_as::<_, (Uuid, i64, bool)>(
            r#"
            SELECT c.id,
                   COALESCE(cp.unread_count, 0)::BIGINT,
                   COALESCE(cp.is_archived, FALSE)
            FROM conversations c
            LEFT JOIN conversation_participants cp
              ON cp.conversation_id = c.id AND cp.user_id = $1
            WHERE $1 = ANY(c.participant_ids)
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(conversation_id, unread_count, is_archived)| UnreadCounter {
                conversation_id,
                unread_count,
                is_archived,
            })
            .collect())
    }
}
