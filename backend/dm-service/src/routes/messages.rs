use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{ApiResponse, AuthenticatedUser};
use crate::models::AttachmentInput;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: Uuid,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
}

#[derive(Debug, Deserialize)]
pub struct ConversationMessageRequest {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// GET /api/v1/conversations/{id}/messages?before=&limit=
#[get("/conversations/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .messages
        .list(
            user.id(),
            path.into_inner(),
            query.before,
            query.limit.unwrap_or(50),
        )
        .await?;
    Ok(ApiResponse::ok(messages))
}

#[post("/conversations/{id}/messages")]
pub async fn send_in_conversation(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<ConversationMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner();
    let message = state
        .messages
        .create(user.id(), path.into_inner(), &req.body, req.attachments)
        .await?;
    Ok(ApiResponse::created(message))
}

/// POST /api/v1/messages
///
/// First contact: the conversation is created on the first successful send.
#[post("/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner();
    let message = state
        .messages
        .send_to_user(user.id(), req.recipient_id, &req.body, req.attachments)
        .await?;
    Ok(ApiResponse::created(message))
}

#[patch("/messages/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<EditMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .edit(user.id(), path.into_inner(), &body.body)
        .await?;
    Ok(ApiResponse::ok(message))
}

#[delete("/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.messages.delete(user.id(), path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
