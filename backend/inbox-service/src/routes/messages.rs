use crate::{
    error::AppError,
    middleware::guards::User,
    models::{Attachment, MarkReadOutcome, Message, NewMessage},
    services::{ArchivedPolicy, ConversationUnread, UnreadSource},
    state::AppState,
};
use actix_web::{get, post, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub recipient_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub message: Message,
    pub already_read: bool,
}

#[derive(Debug, Deserialize)]
pub struct UnreadCountQuery {
    #[serde(default)]
    pub authoritative: bool,
    pub include_archived: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
    pub source: UnreadSource,
}

#[derive(Debug, Deserialize)]
pub struct UnreadBreakdownQuery {
    pub include_archived: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadBreakdownResponse {
    pub conversations: Vec<ConversationUnread>,
}

/// POST /conversations/{id}/messages
///
/// Without a client key a server-side idempotency key is assigned so the
/// retry loop below can never insert twice.
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    conversation_id: web::Path<Uuid>,
    user: User,
    body: web::Json<CreateMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let new = NewMessage {
        conversation_id: conversation_id.into_inner(),
        sender_id: user.id,
        recipient_id: body.recipient_id,
        content: body.content,
        attachments: body.attachments,
        idempotency_key: Some(
            body.idempotency_key
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        ),
    };

    let message = state
        .with_store_retry("create_message", || {
            state.messages.create_message(new.clone())
        })
        .await?;

    Ok(HttpResponse::Created().json(message))
}

/// PUT /messages/{id}/read
#[put("/messages/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    message_id: web::Path<Uuid>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let message_id = message_id.into_inner();
    let outcome = state
        .with_store_retry("mark_read", || state.messages.mark_read(message_id, user.id))
        .await?;

    let already_read = outcome.was_already_read();
    let message = match outcome {
        MarkReadOutcome::Marked(m) | MarkReadOutcome::AlreadyRead(m) => m,
    };
    Ok(HttpResponse::Ok().json(MarkReadResponse {
        message,
        already_read,
    }))
}

/// GET /messages/unread-count
#[get("/messages/unread-count")]
pub async fn unread_count(
    state: web::Data<AppState>,
    query: web::Query<UnreadCountQuery>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let source = if query.authoritative {
        UnreadSource::Authoritative
    } else {
        UnreadSource::Cached
    };
    let policy = query.include_archived.map(ArchivedPolicy::from_include_flag);

    let total = state
        .with_store_retry("unread_count", || {
            state.unread.total_unread(user.id, source, policy)
        })
        .await?;

    Ok(HttpResponse::Ok().json(UnreadCountResponse {
        unread_count: total.total.max(0),
        source: total.source,
    }))
}

/// GET /messages/unread-count/by-conversation
///
/// Cached counters only; conversations with nothing unread are left out.
#[get("/messages/unread-count/by-conversation")]
pub async fn unread_by_conversation(
    state: web::Data<AppState>,
    query: web::Query<UnreadBreakdownQuery>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let policy = query.include_archived.map(ArchivedPolicy::from_include_flag);

    let mut conversations = state
        .with_store_retry("unread_by_conversation", || {
            state.unread.unread_by_conversation(user.id, policy)
        })
        .await?;
    conversations.retain(|c| c.unread_count > 0);

    Ok(HttpResponse::Ok().json(UnreadBreakdownResponse { conversations }))
}
