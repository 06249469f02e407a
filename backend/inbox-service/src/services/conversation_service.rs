use crate::error::{AppError, AppResult};
use crate::middleware::ConversationMember;
use crate::models::{normalize_participants, Conversation, NewConversation};
use crate::store::ConversationStore;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const MAX_TITLE_LENGTH: usize = 200;

#[derive(Clone)]
pub struct ConversationService {
    conversations: Arc<dyn ConversationStore>,
}

impl ConversationService {
    pub fn new(conversations: Arc<dyn ConversationStore>) -> Self {
        Self { conversations }
    }

    /// Order-independent find-or-create over the participant set
    pub async fn find_or_create(&self, new: NewConversation) -> AppResult<Conversation> {
        let participant_ids = normalize_participants(&new.participant_ids);
        if participant_ids.len() < 2 {
            return Err(AppError::Validation(
                "a conversation needs at least 2 distinct participants".into(),
            ));
        }

        let title = new
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if matches!(&title, Some(t) if t.chars().count() > MAX_TITLE_LENGTH) {
            return Err(AppError::Validation(format!(
                "title exceeds {MAX_TITLE_LENGTH} characters"
            )));
        }

        let normalized = NewConversation {
            participant_ids,
            property_id: new.property_id,
            title,
        };
        let (conversation, created) = self
            .conversations
            .find_or_create(&normalized, Utc::now())
            .await?;

        if created {
            tracing::info!(
                conversation_id = %conversation.id,
                participants = conversation.participant_ids.len(),
                "conversation created"
            );
        }
        Ok(conversation)
    }

    /// Conversation for one of its participants
    pub async fn get_for_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let member =
            ConversationMember::verify(self.conversations.as_ref(), user_id, conversation_id)
                .await?;
        Ok(member.conversation)
    }

    /// Per-user soft hide; other participants are unaffected
    pub async fn set_archived(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        archived: bool,
    ) -> AppResult<Conversation> {
        let mut member =
            ConversationMember::verify(self.conversations.as_ref(), user_id, conversation_id)
                .await?;
        self.conversations
            .set_archived(conversation_id, user_id, archived)
            .await?;

        tracing::debug!(conversation_id = %conversation_id, user_id = %user_id, archived, "archive flag set");
        member.conversation.is_archived.insert(user_id, archived);
        Ok(member.conversation)
    }

    /// Most recently updated first
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        include_archived: bool,
    ) -> AppResult<Vec<Conversation>> {
        self.conversations
            .list_for_user(user_id, include_archived)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> ConversationService {
        ConversationService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_single_distinct_participant_is_rejected() {
        let user = Uuid::new_v4();
        let err = service()
            .find_or_create(NewConversation::between(&[user, user]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_blank_title_is_dropped() {
        let svc = service();
        let conv = svc
            .find_or_create(NewConversation {
                participant_ids: vec![Uuid::new_v4(), Uuid::new_v4()],
                property_id: None,
                title: Some("   ".into()),
            })
            .await
            .unwrap();
        assert!(conv.title.is_none());
    }

    #[tokio::test]
    async fn test_archive_is_per_user() {
        let svc = service();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let conv = svc
            .find_or_create(NewConversation::between(&[a, b]))
            .await
            .unwrap();

        svc.set_archived(conv.id, a, true).await.unwrap();

        assert!(svc.list_for_user(a, false).await.unwrap().is_empty());
        assert_eq!(svc.list_for_user(a, true).await.unwrap().len(), 1);
        assert_eq!(svc.list_for_user(b, false).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_by_outsider_is_forbidden() {
        let svc = service();
        let conv = svc
            .find_or_create(NewConversation::between(&[Uuid::new_v4(), Uuid::new_v4()]))
            .await
            .unwrap();

        let err = svc
            .set_archived(conv.id, Uuid::new_v4(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotParticipant(_)));
    }
}
