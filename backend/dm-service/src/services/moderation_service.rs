//! Abuse reports: submission with dedup, the privileged review queue, and the
//! admin-only conversation context used to decide a report.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::config::LimitsConfig;
use crate::db::Repositories;
use crate::error::{AppError, AppResult};
use crate::models::{
    Conversation, Message, NewReport, ProfileSummary, Report, ReportReason, ReportReview,
    ReportStatus, UserProfile,
};
use crate::services::access_control::AccessControl;
use crate::services::rate_limit::{RateLimitGuard, REPORT_SUBMIT_ROUTE};

pub const MAX_REPORT_DETAILS_CHARS: usize = 2000;
pub const MAX_RESOLUTION_NOTE_CHARS: usize = 2000;

/// Everything an admin needs to decide a report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub report: Report,
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub participants: Vec<ProfileSummary>,
}

fn normalize_text(raw: Option<String>, max_chars: usize, field: &str) -> AppResult<Option<String>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "{field} exceeds {max_chars} characters"
        )));
    }
    Ok(Some(trimmed.to_owned()))
}

#[derive(Clone)]
pub struct ModerationService {
    repos: Repositories,
    access: AccessControl,
    guard: RateLimitGuard,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    limits: LimitsConfig,
}

impl ModerationService {
    pub fn new(
        repos: Repositories,
        access: AccessControl,
        guard: RateLimitGuard,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            repos,
            access,
            guard,
            audit,
            clock,
            limits,
        }
    }

    /// Returns the report and whether it was newly created. A repeat submission
    /// while the first is open or resolved returns the existing row.
    pub async fn submit_report(
        &self,
        reporter_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
        reason: ReportReason,
        details: Option<String>,
    ) -> AppResult<(Report, bool)> {
        self.guard
            .check(
                "user",
                &reporter_id.to_string(),
                "POST",
                REPORT_SUBMIT_ROUTE,
                self.limits.report_rule(),
            )
            .await?;

        self.access
            .require_participant(reporter_id, conversation_id)
            .await?;
        let message = self
            .repos
            .messages
            .find(message_id)
            .await?
            .filter(|m| m.conversation_id == conversation_id)
            .ok_or(AppError::NotFound)?;
        let details = normalize_text(details, MAX_REPORT_DETAILS_CHARS, "details")?;

        if let Some(existing) = self
            .repos
            .reports
            .find_active_duplicate(reporter_id, conversation_id, message.id)
            .await?
        {
            tracing::debug!(report_id = %existing.id, reporter_id = %reporter_id, "Duplicate report collapsed");
            return Ok((existing, false));
        }

        let report = self
            .repos
            .reports
            .insert(NewReport {
                id: Uuid::new_v4(),
                conversation_id,
                message_id: message.id,
                reporter_id,
                reason,
                details,
                created_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            report_id = %report.id,
            conversation_id = %conversation_id,
            message_id = %message_id,
            reason = reason.to_db(),
            "Report submitted"
        );
        self.audit.record(AuditEvent::ReportSubmitted {
            report_id: report.id,
            reporter_id,
            conversation_id,
            message_id,
        });
        Ok((report, true))
    }

    fn require_moderator(actor: &UserProfile) -> AppResult<()> {
        if actor.role.is_privileged() {
            Ok(())
        } else {
            Err(AppError::Forbidden("moderator role required".into()))
        }
    }

    /// Reports in `status`, oldest first. Moderators and admins only.
    pub async fn review_queue(
        &self,
        actor: &UserProfile,
        status: ReportStatus,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Report>> {
        Self::require_moderator(actor)?;
        self.repos
            .reports
            .list_by_status(status, limit.clamp(1, 100), offset.max(0))
            .await
    }

    /// Move a report along its lifecycle and record the reviewer and note.
    pub async fn update_status(
        &self,
        actor: &UserProfile,
        report_id: Uuid,
        next: ReportStatus,
        resolution_note: Option<String>,
    ) -> AppResult<Report> {
        Self::require_moderator(actor)?;
        let current = self
            .repos
            .reports
            .find(report_id)
            .await?
            .ok_or(AppError::NotFound)?;
        if !current.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "report cannot move from {} to {}",
                current.status, next
            )));
        }

        let now = self.clock.now();
        let review = ReportReview {
            status: next,
            assignee_id: actor.id,
            resolution_note: normalize_text(
                resolution_note,
                MAX_RESOLUTION_NOTE_CHARS,
                "resolution_note",
            )?,
            reviewed_at: now,
            resolved_at: next.is_terminal().then_some(now),
        };

        let updated = self
            .repos
            .reports
            .apply_review(report_id, current.status, &review)
            .await?
            .ok_or_else(|| AppError::Conflict("report was updated concurrently".into()))?;

        tracing::info!(
            report_id = %report_id,
            moderator_id = %actor.id,
            from = %current.status,
            to = %next,
            "Report reviewed"
        );
        self.audit.record(AuditEvent::ReportReviewed {
            report_id,
            moderator_id: actor.id,
            from: current.status,
            to: next,
        });
        Ok(updated)
    }

    /// Admin only. This is the one read path that exposes a conversation to someone
    /// outside it, so every call is audited.
    pub async fn context_fetch(&self, actor: &UserProfile, report_id: Uuid) -> AppResult<ReportContext> {
        if !actor.role.is_admin() {
            return Err(AppError::Forbidden("admin role required".into()));
        }
        let report = self
            .repos
            .reports
            .find(report_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let conversation = self
            .repos
            .conversations
            .find_by_id(report.conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let messages = self.repos.messages.list_all(conversation.id).await?;

        let participant_ids: Vec<Uuid> = self
            .repos
            .conversations
            .list_participants(conversation.id)
            .await?
            .into_iter()
            .map(|p| p.user_id)
            .collect();
        let participants = self
            .repos
            .users
            .get_profiles(&participant_ids)
            .await?
            .iter()
            .map(ProfileSummary::from)
            .collect();

        self.audit.record(AuditEvent::ReportContextViewed {
            report_id,
            admin_id: actor.id,
            conversation_id: conversation.id,
        });
        Ok(ReportContext {
            report,
            conversation,
            messages,
            participants,
        })
    }

    /// Reports filed by the caller, newest first.
    pub async fn list_mine(&self, reporter_id: Uuid, limit: i64, offset: i64) -> AppResult<Vec<Report>> {
        self.repos
            .reports
            .list_by_reporter(reporter_id, limit.clamp(1, 100), offset.max(0))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_details_become_none() {
        assert_eq!(normalize_text(Some("   ".into()), 10, "details").unwrap(), None);
        assert_eq!(normalize_text(None, 10, "details").unwrap(), None);
        assert_eq!(
            normalize_text(Some(" spam link ".into()), 10, "details").unwrap(),
            Some("spam link".into())
        );
    }

    #[test]
    fn long_details_rejected() {
        let err = normalize_text(Some("x".repeat(11)), 10, "details").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
