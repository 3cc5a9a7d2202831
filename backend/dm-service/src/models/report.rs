use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Open,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "resolved" => Some(Self::Resolved),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Resolved => "resolved",
            Self::Dismissed => "dismissed",
        }
    }

    /// Open and resolved reports lock the message against deletion.
    pub fn locks_message(&self) -> bool {
        matches!(self, Self::Open | Self::Resolved)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }

    /// Allowed review transitions. `open -> open` re-assigns without closing.
    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, _) | (Self::Resolved, Self::Dismissed)
        )
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Harassment,
    Hate,
    SexualContent,
    Violence,
    Other,
}

impl ReportReason {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "spam" => Some(Self::Spam),
            "harassment" => Some(Self::Harassment),
            "hate" => Some(Self::Hate),
            "sexual_content" => Some(Self::SexualContent),
            "violence" => Some(Self::Violence),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Harassment => "harassment",
            Self::Hate => "hate",
            Self::SexualContent => "sexual_content",
            Self::Violence => "violence",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: Option<Uuid>,
    pub reporter_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub status: ReportStatus,
    pub assignee_id: Option<Uuid>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub reporter_id: Uuid,
    pub reason: ReportReason,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Moderator decision applied to a report.
#[derive(Debug, Clone)]
pub struct ReportReview {
    pub status: ReportStatus,
    pub assignee_id: Uuid,
    pub resolution_note: Option<String>,
    pub reviewed_at: DateTime<Utc>,
    /// Set only when `status` is terminal.
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_states() {
        assert!(ReportStatus::Open.locks_message());
        assert!(ReportStatus::Resolved.locks_message());
        assert!(!ReportStatus::Dismissed.locks_message());
    }

    #[test]
    fn transitions() {
        use ReportStatus::*;
        assert!(Open.can_transition_to(Open));
        assert!(Open.can_transition_to(Resolved));
        assert!(Open.can_transition_to(Dismissed));
        assert!(Resolved.can_transition_to(Dismissed));
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Resolved));
        assert!(!Dismissed.can_transition_to(Open));
        assert!(!Dismissed.can_transition_to(Dismissed));
    }
}
