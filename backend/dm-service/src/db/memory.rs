//! In-process store with the same uniqueness rules as the Postgres schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    BlockRepository, ConversationRepository, DeleteOutcome, MessageRepository, ReportRepository,
    UserDirectory,
};
use crate::error::{AppError, AppResult};
use crate::models::{
    Attachment, BlockedUser, Conversation, DmPrivacy, Message, NewMessage, NewReport,
    Participant, Report, ReportReview, ReportStatus, UserProfile,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserProfile>,
    blocks: HashMap<(Uuid, Uuid), DateTime<Utc>>,
    conversations: HashMap<Uuid, Conversation>,
    pair_keys: HashMap<String, Uuid>,
    participants: HashMap<(Uuid, Uuid), Participant>,
    messages: HashMap<Uuid, Message>,
    reports: HashMap<Uuid, Report>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| AppError::Internal)
    }

    /// Seed or replace a profile. Profiles are owned by the identity service.
    pub fn upsert_user(&self, profile: UserProfile) -> AppResult<()> {
        self.tables()?.users.insert(profile.id, profile);
        Ok(())
    }

    pub fn conversation_count(&self) -> AppResult<usize> {
        Ok(self.tables()?.conversations.len())
    }

    pub fn report_count(&self) -> AppResult<usize> {
        Ok(self.tables()?.reports.len())
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.tables()?.users.get(&user_id).cloned())
    }

    async fn get_profiles(&self, user_ids: &[Uuid]) -> AppResult<Vec<UserProfile>> {
        let tables = self.tables()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.users.get(id).cloned())
            .collect())
    }

    async fn set_dm_privacy(&self, user_id: Uuid, privacy: DmPrivacy) -> AppResult<bool> {
        let mut tables = self.tables()?;
        Ok(match tables.users.get_mut(&user_id) {
            Some(profile) => {
                profile.dm_privacy = privacy;
                true
            }
            None => false,
        })
    }
}

#[async_trait]
impl BlockRepository for MemoryStore {
    async fn insert_block(
        &self,
        blocker: Uuid,
        blocked: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables()?;
        if tables.blocks.contains_key(&(blocker, blocked)) {
            return Ok(false);
        }
        tables.blocks.insert((blocker, blocked), at);
        Ok(true)
    }

    async fn delete_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<bool> {
        Ok(self.tables()?.blocks.remove(&(blocker, blocked)).is_some())
    }

    async fn is_blocked_either_way(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let tables = self.tables()?;
        Ok(tables.blocks.contains_key(&(a, b)) || tables.blocks.contains_key(&(b, a)))
    }

    async fn list_blocked(
        &self,
        blocker: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<BlockedUser>> {
        let tables = self.tables()?;
        let mut blocked: Vec<BlockedUser> = tables
            .blocks
            .iter()
            .filter(|((from, _), _)| *from == blocker)
            .map(|((_, to), at)| BlockedUser {
                user_id: *to,
                blocked_at: *at,
            })
            .collect();
        blocked.sort_by(|a, b| b.blocked_at.cmp(&a.blocked_at));
        Ok(page(blocked, limit, offset))
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.tables()?.conversations.get(&id).cloned())
    }

    async fn find_by_pair_key(&self, pair_key: &str) -> AppResult<Option<Conversation>> {
        let tables = self.tables()?;
        Ok(tables
            .pair_keys
            .get(pair_key)
            .and_then(|id| tables.conversations.get(id))
            .cloned())
    }

    async fn create_with_participants(
        &self,
        conversation: Conversation,
        participants: [Uuid; 2],
    ) -> AppResult<(Conversation, bool)> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables
            .pair_keys
            .get(&conversation.pair_key)
            .and_then(|id| tables.conversations.get(id))
        {
            return Ok((existing.clone(), false));
        }

        for user_id in participants {
            tables
                .participants
                .entry((conversation.id, user_id))
                .or_insert_with(|| Participant {
                    conversation_id: conversation.id,
                    user_id,
                    joined_at: conversation.created_at,
                    last_read_at: None,
                    last_seen_at: None,
                    archived_at: None,
                });
        }
        tables
            .pair_keys
            .insert(conversation.pair_key.clone(), conversation.id);
        tables
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok((conversation, true))
    }

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>> {
        Ok(self
            .tables()?
            .participants
            .get(&(conversation_id, user_id))
            .cloned())
    }

    async fn list_participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        let tables = self.tables()?;
        let mut rows: Vec<Participant> = tables
            .participants
            .values()
            .filter(|p| p.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.user_id.cmp(&b.user_id)));
        Ok(rows)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        archived: bool,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<(Conversation, Participant)>> {
        let tables = self.tables()?;
        let mut rows: Vec<(Conversation, Participant)> = tables
            .participants
            .values()
            .filter(|p| p.user_id == user_id && p.archived_at.is_some() == archived)
            .filter_map(|p| {
                tables
                    .conversations
                    .get(&p.conversation_id)
                    .map(|c| (c.clone(), p.clone()))
            })
            .collect();
        rows.sort_by(|(a, _), (b, _)| b.activity_at().cmp(&a.activity_at()));
        Ok(page(rows, limit, offset))
    }

    async fn active_participations(&self, user_id: Uuid) -> AppResult<Vec<Participant>> {
        Ok(self
            .tables()?
            .participants
            .values()
            .filter(|p| p.user_id == user_id && p.is_active())
            .cloned()
            .collect())
    }

    async fn set_archived(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        archived_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let mut tables = self.tables()?;
        Ok(match tables.participants.get_mut(&(conversation_id, user_id)) {
            Some(p) => {
                p.archived_at = archived_at;
                true
            }
            None => false,
        })
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut tables = self.tables()?;
        Ok(match tables.participants.get_mut(&(conversation_id, user_id)) {
            Some(p) => {
                p.last_read_at = Some(at);
                p.last_seen_at = Some(at);
                true
            }
            None => false,
        })
    }

    async fn set_latest(
        &self,
        conversation_id: Uuid,
        latest: Option<(Uuid, DateTime<Utc>)>,
    ) -> AppResult<()> {
        let mut tables = self.tables()?;
        if let Some(c) = tables.conversations.get_mut(&conversation_id) {
            c.last_message_id = latest.map(|(id, _)| id);
            c.last_message_at = latest.map(|(_, at)| at);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert(&self, message: NewMessage) -> AppResult<Message> {
        let mut tables = self.tables()?;
        if !tables.conversations.contains_key(&message.conversation_id) {
            return Err(AppError::NotFound);
        }
        let attachments = message
            .attachments
            .into_iter()
            .map(|a| Attachment {
                id: Uuid::new_v4(),
                message_id: message.id,
                bucket: a.bucket,
                storage_path: a.storage_path,
                mime_type: a.mime_type,
                size_bytes: a.size_bytes,
                metadata: a.metadata,
                created_at: message.created_at,
            })
            .collect();
        let row = Message {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            body_html: message.body_html,
            body_text: message.body_text,
            created_at: message.created_at,
            edited_at: None,
            attachments,
        };
        tables.messages.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.tables()?.messages.get(&id).cloned())
    }

    async fn update_body(
        &self,
        id: Uuid,
        body_html: &str,
        body_text: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let mut tables = self.tables()?;
        Ok(tables.messages.get_mut(&id).map(|m| {
            m.body_html = body_html.to_owned();
            m.body_text = body_text.to_owned();
            m.edited_at = Some(edited_at);
            m.clone()
        }))
    }

    async fn delete_unlocked(&self, id: Uuid) -> AppResult<DeleteOutcome> {
        let mut tables = self.tables()?;
        if !tables.messages.contains_key(&id) {
            return Ok(DeleteOutcome::Missing);
        }
        let locked = tables
            .reports
            .values()
            .any(|r| r.message_id == Some(id) && r.status.locks_message());
        if locked {
            return Ok(DeleteOutcome::Locked);
        }
        tables.messages.remove(&id);
        // Mirrors ON DELETE SET NULL on dm_reports.message_id.
        for report in tables.reports.values_mut() {
            if report.message_id == Some(id) {
                report.message_id = None;
            }
        }
        Ok(DeleteOutcome::Deleted)
    }

    async fn latest(&self, conversation_id: Uuid) -> AppResult<Option<Message>> {
        let tables = self.tables()?;
        Ok(tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)))
            .cloned())
    }

    async fn list_page(
        &self,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        let tables = self.tables()?;
        let mut rows: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .filter(|m| before.map_or(true, |b| m.created_at < b))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page(rows, limit, 0))
    }

    async fn list_all(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let tables = self.tables()?;
        let mut rows: Vec<Message> = tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    async fn count_from_others_since(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<i64> {
        let tables = self.tables()?;
        Ok(tables
            .messages
            .values()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != user_id)
            .filter(|m| since.map_or(true, |s| m.created_at > s))
            .count() as i64)
    }
}

#[async_trait]
impl ReportRepository for MemoryStore {
    async fn find(&self, id: Uuid) -> AppResult<Option<Report>> {
        Ok(self.tables()?.reports.get(&id).cloned())
    }

    async fn find_active_duplicate(
        &self,
        reporter_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Report>> {
        let tables = self.tables()?;
        Ok(tables
            .reports
            .values()
            .filter(|r| {
                r.reporter_id == reporter_id
                    && r.conversation_id == conversation_id
                    && r.message_id == Some(message_id)
                    && r.status.locks_message()
            })
            .min_by(|a, b| a.created_at.cmp(&b.created_at))
            .cloned())
    }

    async fn insert(&self, report: NewReport) -> AppResult<Report> {
        let row = Report {
            id: report.id,
            conversation_id: report.conversation_id,
            message_id: Some(report.message_id),
            reporter_id: report.reporter_id,
            reason: report.reason,
            details: report.details,
            status: ReportStatus::Open,
            assignee_id: None,
            resolution_note: None,
            created_at: report.created_at,
            updated_at: report.created_at,
            resolved_at: None,
        };
        self.tables()?.reports.insert(row.id, row.clone());
        Ok(row)
    }

    async fn has_locking_report(&self, message_id: Uuid) -> AppResult<bool> {
        Ok(self
            .tables()?
            .reports
            .values()
            .any(|r| r.message_id == Some(message_id) && r.status.locks_message()))
    }

    async fn list_by_status(
        &self,
        status: ReportStatus,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Report>> {
        let tables = self.tables()?;
        let mut rows: Vec<Report> = tables
            .reports
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn list_by_reporter(
        &self,
        reporter_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Report>> {
        let tables = self.tables()?;
        let mut rows: Vec<Report> = tables
            .reports
            .values()
            .filter(|r| r.reporter_id == reporter_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn apply_review(
        &self,
        id: Uuid,
        expected: ReportStatus,
        review: &ReportReview,
    ) -> AppResult<Option<Report>> {
        let mut tables = self.tables()?;
        Ok(match tables.reports.get_mut(&id) {
            Some(report) if report.status == expected => {
                report.status = review.status;
                report.assignee_id = Some(review.assignee_id);
                if review.resolution_note.is_some() {
                    report.resolution_note = review.resolution_note.clone();
                }
                report.updated_at = review.reviewed_at;
                if review.resolved_at.is_some() {
                    report.resolved_at = review.resolved_at;
                }
                Some(report.clone())
            }
            _ => None,
        })
    }
}

fn page<T>(rows: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    rows.into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}
