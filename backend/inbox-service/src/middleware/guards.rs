//! Authorization guards that enforce permission checks at the type level

use crate::error::AppError;
use crate::models::Conversation;
use crate::store::ConversationStore;
use actix_middleware::UserId;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

/// Authenticated caller, extracted from the id the JWT middleware stored
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let user_id = req.extensions().get::<UserId>().map(|u| u.0);
        ready(
            user_id
                .map(|id| User { id })
                .ok_or_else(|| AppError::Unauthorized.into()),
        )
    }
}

/// A caller verified to be a participant of a conversation
#[derive(Debug, Clone)]
pub struct ConversationMember {
    pub user_id: Uuid,
    pub conversation: Conversation,
}

impl ConversationMember {
    /// Load the conversation and check membership in one store read.
    ///
    /// Missing conversation is `ConversationNotFound`, non-member is
    /// `NotParticipant`.
    pub async fn verify(
        store: &dyn ConversationStore,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        let conversation = store
            .get_conversation(conversation_id)
            .await?
            .ok_or(AppError::ConversationNotFound(conversation_id))?;

        if !conversation.is_participant(user_id) {
            tracing::warn!(
                conversation_id = %conversation_id,
                user_id = %user_id,
                "conversation access by non-participant"
            );
            return Err(AppError::NotParticipant(conversation_id));
        }

        Ok(Self {
            user_id,
            conversation,
        })
    }
}
