use actix_web::{get, patch, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::PaginationQuery;
use crate::error::AppError;
use crate::middleware::{ApiResponse, AuthenticatedUser};
use crate::models::{ReportReason, ReportStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitReportRequest {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub status: Option<ReportStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReportRequest {
    pub status: ReportStatus,
    pub resolution_note: Option<String>,
}

/// POST /api/v1/reports
///
/// 201 for a new report, 200 when an open or resolved duplicate already exists.
#[post("/reports")]
pub async fn submit_report(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<SubmitReportRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner();
    let (report, created) = state
        .moderation
        .submit_report(
            user.id(),
            req.conversation_id,
            req.message_id,
            req.reason,
            req.details,
        )
        .await?;
    if created {
        Ok(ApiResponse::created(report))
    } else {
        Ok(ApiResponse::ok(report))
    }
}

#[get("/reports/mine")]
pub async fn list_my_reports(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<PaginationQuery>,
) -> Result<HttpResponse, AppError> {
    let reports = state
        .moderation
        .list_mine(user.id(), query.limit_or(50), query.offset())
        .await?;
    Ok(ApiResponse::ok(reports))
}

/// GET /api/v1/reports?status= (moderators)
#[get("/reports")]
pub async fn review_queue(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    query: web::Query<QueueQuery>,
) -> Result<HttpResponse, AppError> {
    let reports = state
        .moderation
        .review_queue(
            &user.profile,
            query.status.unwrap_or(ReportStatus::Open),
            query.limit.unwrap_or(50),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(ApiResponse::ok(reports))
}

#[patch("/reports/{id}")]
pub async fn update_report_status(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateReportRequest>,
) -> Result<HttpResponse, AppError> {
    let req = body.into_inner();
    let report = state
        .moderation
        .update_status(&user.profile, path.into_inner(), req.status, req.resolution_note)
        .await?;
    Ok(ApiResponse::ok(report))
}

/// GET /api/v1/reports/{id}/context (admins)
#[get("/reports/{id}/context")]
pub async fn report_context(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let context = state
        .moderation
        .context_fetch(&user.profile, path.into_inner())
        .await?;
    Ok(ApiResponse::ok(context))
}
