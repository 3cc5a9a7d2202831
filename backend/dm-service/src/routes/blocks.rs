use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::PaginationQuery;
use crate::error::AppError;
use crate::middleware::{ApiResponse, AuthenticatedUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BlockUserRequest {
    pub user_id: Uuid,
}

/// GET /api/v1/blocks
#[get("/blocks")]
pub async fn list_blocks(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, AppError> {
    let blocked = state
        .relationships
        .list_blocked(user.id(), query.limit_or(50), query.offset())
        .await?;
    Ok(ApiResponse::ok(blocked))
}

/// POST /api/v1/blocks
#[post("/blocks")]
pub async fn block_user(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<BlockUserRequest>,
) -> Result<HttpResponse, AppError> {
    let created = state.relationships.block(user.id(), body.user_id).await?;
    let data = serde_json::json!({ "user_id": body.user_id, "created": created });
    if created {
        Ok(ApiResponse::created(data))
    } else {
        Ok(ApiResponse::ok(data))
    }
}

/// DELETE /api/v1/blocks/{user_id}
#[delete("/blocks/{user_id}")]
pub async fn unblock_user(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let blocked_id = path.into_inner();
    if state.relationships.unblock(user.id(), blocked_id).await? {
        Ok(ApiResponse::ok(serde_json::json!({ "user_id": blocked_id })))
    } else {
        Err(AppError::NotFound)
    }
}
