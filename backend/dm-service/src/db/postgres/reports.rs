use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::PgStore;
use crate::db::ReportRepository;
use crate::error::{AppError, AppResult};
use crate::models::{NewReport, Report, ReportReason, ReportReview, ReportStatus};

const REPORT_COLUMNS: &str = "id, conversation_id, message_id, reporter_id, reason, details, status, \
     assignee_id, resolution_note, created_at, updated_at, resolved_at";

#[derive(FromRow)]
struct ReportRow {
    id: Uuid,
    conversation_id: Uuid,
    message_id: Option<Uuid>,
    reporter_id: Uuid,
    reason: String,
    details: Option<String>,
    status: String,
    assignee_id: Option<Uuid>,
    resolution_note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReportRow> for Report {
    type Error = AppError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let reason = ReportReason::from_db(&row.reason).ok_or_else(|| {
            tracing::error!(report_id = %row.id, reason = %row.reason, "Invalid report reason in database");
            AppError::Internal
        })?;
        let status = ReportStatus::from_db(&row.status).ok_or_else(|| {
            tracing::error!(report_id = %row.id, status = %row.status, "Invalid report status in database");
            AppError::Internal
        })?;

        Ok(Report {
            id: row.id,
            conversation_id: row.conversation_id,
            message_id: row.message_id,
            reporter_id: row.reporter_id,
            reason,
            details: row.details,
            status,
            assignee_id: row.assignee_id,
            resolution_note: row.resolution_note,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        })
    }
}

fn collect(rows: Vec<ReportRow>) -> AppResult<Vec<Report>> {
    rows.into_iter().map(Report::try_from).collect()
}

#[async_trait]
impl ReportRepository for PgStore {
    async fn find(&self, id: Uuid) -> AppResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            "SELECT {REPORT_COLUMNS} FROM dm_reports WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Report::try_from).transpose()
    }

    async fn find_active_duplicate(
        &self,
        reporter_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM dm_reports
             WHERE reporter_id = $1
               AND conversation_id = $2
               AND message_id = $3
               AND status IN ('open', 'resolved')
             ORDER BY created_at
             LIMIT 1
            "#
        ))
        .bind(reporter_id)
        .bind(conversation_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Report::try_from).transpose()
    }

    async fn insert(&self, report: NewReport) -> AppResult<Report> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            INSERT INTO dm_reports
                (id, conversation_id, message_id, reporter_id, reason, details, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'open', $7, $7)
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(report.id)
        .bind(report.conversation_id)
        .bind(report.message_id)
        .bind(report.reporter_id)
        .bind(report.reason.to_db())
        .bind(&report.details)
        .bind(report.created_at)
        .fetch_one(&self.pool)
        .await?;

        Report::try_from(row)
    }

    async fn has_locking_report(&self, message_id: Uuid) -> AppResult<bool> {
        let locked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM dm_reports WHERE message_id = $1 AND status IN ('open', 'resolved'))",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(locked)
    }

    async fn list_by_status(
        &self,
        status: ReportStatus,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM dm_reports
             WHERE status = $1
             ORDER BY created_at
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(status.to_db())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn list_by_reporter(
        &self,
        reporter_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            SELECT {REPORT_COLUMNS} FROM dm_reports
             WHERE reporter_id = $1
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(reporter_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        collect(rows)
    }

    async fn apply_review(
        &self,
        id: Uuid,
        expected: ReportStatus,
        review: &ReportReview,
    ) -> AppResult<Option<Report>> {
        let row = sqlx::query_as::<_, ReportRow>(&format!(
            r#"
            UPDATE dm_reports
               SET status = $3,
                   assignee_id = $4,
                   resolution_note = COALESCE($5, resolution_note),
                   updated_at = $6,
                   resolved_at = COALESCE($7, resolved_at)
             WHERE id = $1 AND status = $2
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected.to_db())
        .bind(review.status.to_db())
        .bind(review.assignee_id)
        .bind(&review.resolution_note)
        .bind(review.reviewed_at)
        .bind(review.resolved_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(report) = &row {
            tracing::info!(
                report_id = %report.id,
                status = %report.status,
                assignee = %review.assignee_id,
                "Report reviewed"
            );
        }

        row.map(Report::try_from).transpose()
    }
}
