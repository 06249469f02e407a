use crate::{
    error::AppError,
    middleware::guards::User,
    models::{Conversation, Message, NewConversation},
    state::AppState,
};
use actix_web::{get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A conversation as seen by one participant
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationView {
    pub id: Uuid,
    pub participant_ids: Vec<Uuid>,
    pub property_id: Option<Uuid>,
    pub title: Option<String>,
    pub last_message_id: Option<Uuid>,
    pub unread_count: i64,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationView {
    pub fn for_viewer(conversation: Conversation, viewer_id: Uuid) -> Self {
        Self {
            unread_count: conversation.unread_for(viewer_id).max(0),
            is_archived: conversation.archived_for(viewer_id),
            id: conversation.id,
            participant_ids: conversation.participant_ids,
            property_id: conversation.property_id,
            title: conversation.title,
            last_message_id: conversation.last_message_id,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OpenConversationResponse {
    pub conversation: ConversationView,
    pub messages: Vec<Message>,
    pub marked_read: u64,
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub participant_ids: Vec<Uuid>,
    pub property_id: Option<Uuid>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub archived: bool,
}

/// GET /conversations/{id}
/// Opens the conversation: marks the caller's messages read and returns them in order
#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    conversation_id: web::Path<Uuid>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let conversation_id = conversation_id.into_inner();
    let opened = state
        .with_store_retry("open_conversation", || {
            state.read_state.open_conversation(conversation_id, user.id)
        })
        .await?;

    Ok(HttpResponse::Ok().json(OpenConversationResponse {
        conversation: ConversationView::for_viewer(opened.conversation, user.id),
        messages: opened.messages,
        marked_read: opened.marked_read,
    }))
}

/// GET /conversations
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    query: web::Query<ListConversationsQuery>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let include_archived = query.include_archived;
    let conversations = state
        .with_store_retry("list_conversations", || {
            state.conversations.list_for_user(user.id, include_archived)
        })
        .await?;

    let views: Vec<ConversationView> = conversations
        .into_iter()
        .map(|c| ConversationView::for_viewer(c, user.id))
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

/// POST /conversations
/// Find-or-create; the caller is always a participant
#[post("/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let mut participant_ids = body.participant_ids;
    participant_ids.push(user.id);
    let new = NewConversation {
        participant_ids,
        property_id: body.property_id,
        title: body.title,
    };

    let conversation = state
        .with_store_retry("find_or_create_conversation", || {
            state.conversations.find_or_create(new.clone())
        })
        .await?;

    Ok(HttpResponse::Ok().json(ConversationView::for_viewer(conversation, user.id)))
}

/// PUT /conversations/{id}/archive
#[put("/conversations/{id}/archive")]
pub async fn archive_conversation(
    state: web::Data<AppState>,
    conversation_id: web::Path<Uuid>,
    user: User,
    body: web::Json<ArchiveRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = conversation_id.into_inner();
    let archived = body.archived;
    let conversation = state
        .with_store_retry("set_archived", || {
            state
                .conversations
                .set_archived(conversation_id, user.id, archived)
        })
        .await?;

    Ok(HttpResponse::Ok().json(ConversationView::for_viewer(conversation, user.id)))
}
