use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{ApiResponse, AuthenticatedUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub recipient_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    #[serde(default)]
    pub archived: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub archived: bool,
}

/// GET /api/v1/conversations/unread-count
#[get("/conversations/unread-count")]
pub async fn unread_count(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let count = state.conversations.unread_count(user.id()).await?;
    Ok(ApiResponse::ok(serde_json::json!({ "unread_count": count })))
}

/// GET /api/v1/conversations?archived=&limit=&offset=
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<ListConversationsQuery>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);
    let conversations = state
        .conversations
        .list(user.id(), query.archived, limit, offset)
        .await?;
    Ok(ApiResponse::ok(conversations))
}

/// POST /api/v1/conversations
///
/// Returns the pair's existing conversation (200) or a new one (201).
#[post("/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let (conversation, created) = state
        .conversations
        .get_or_create(user.id(), body.recipient_id)
        .await?;
    if created {
        Ok(ApiResponse::created(conversation))
    } else {
        Ok(ApiResponse::ok(conversation))
    }
}

#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = state.conversations.get(user.id(), path.into_inner()).await?;
    Ok(ApiResponse::ok(view))
}

#[post("/conversations/{id}/archive")]
pub async fn archive_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<ArchiveRequest>,
) -> Result<HttpResponse, AppError> {
    let participant = state
        .conversations
        .archive(user.id(), path.into_inner(), body.archived)
        .await?;
    Ok(ApiResponse::ok(participant))
}

#[post("/conversations/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let participant = state
        .conversations
        .mark_read(user.id(), path.into_inner())
        .await?;
    Ok(ApiResponse::ok(participant))
}
