//! Persistence seams.
//!
//! Every table the service touches sits behind an `async_trait` repository so the
//! managers can run against Postgres ([`PgStore`]) or the in-process [`MemoryStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    BlockedUser, Conversation, DmPrivacy, Message, NewMessage, NewReport, Participant, Report,
    ReportReview, ReportStatus, UserProfile,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    MIGRATOR.run(&pool).await?;
    tracing::info!(max_connections, "Database pool ready, migrations applied");
    Ok(pool)
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>>;
    async fn get_profiles(&self, user_ids: &[Uuid]) -> AppResult<Vec<UserProfile>>;
    async fn set_dm_privacy(&self, user_id: Uuid, privacy: DmPrivacy) -> AppResult<bool>;
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    /// Returns `true` when a new block row was written.
    async fn insert_block(&self, blocker: Uuid, blocked: Uuid, at: DateTime<Utc>)
        -> AppResult<bool>;
    async fn delete_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<bool>;
    async fn is_blocked_either_way(&self, a: Uuid, b: Uuid) -> AppResult<bool>;
    async fn list_blocked(&self, blocker: Uuid, limit: i64, offset: i64)
        -> AppResult<Vec<BlockedUser>>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Conversation>>;
    async fn find_by_pair_key(&self, pair_key: &str) -> AppResult<Option<Conversation>>;

    /// Upsert on the pair key and add both participants. When another request won the
    /// race the existing conversation is returned with `created = false`.
    async fn create_with_participants(
        &self,
        conversation: Conversation,
        participants: [Uuid; 2],
    ) -> AppResult<(Conversation, bool)>;

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>>;
    async fn list_participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>>;

    /// Participations of `user_id` (archived or not per `archived`), most recent activity first.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        archived: bool,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<(Conversation, Participant)>>;

    /// Non-archived participant rows of `user_id`.
    async fn active_participations(&self, user_id: Uuid) -> AppResult<Vec<Participant>>;

    async fn set_archived(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        archived_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool>;
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;
    async fn set_latest(
        &self,
        conversation_id: Uuid,
        latest: Option<(Uuid, DateTime<Utc>)>,
    ) -> AppResult<()>;
}

/// Outcome of a delete guarded by the report lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Locked,
    Missing,
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: NewMessage) -> AppResult<Message>;
    /// Message with its attachments.
    async fn find(&self, id: Uuid) -> AppResult<Option<Message>>;
    async fn update_body(
        &self,
        id: Uuid,
        body_html: &str,
        body_text: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>>;
    /// Deletes the row unless an open or resolved report references it, in one step.
    async fn delete_unlocked(&self, id: Uuid) -> AppResult<DeleteOutcome>;
    async fn latest(&self, conversation_id: Uuid) -> AppResult<Option<Message>>;
    /// Newest first, strictly older than `before` when given.
    async fn list_page(
        &self,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<Vec<Message>>;
    /// Entire history, oldest first.
    async fn list_all(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;
    /// Messages not sent by `user_id`, created after `since` (all when `None`).
    async fn count_from_others_since(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<i64>;
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn find(&self, id: Uuid) -> AppResult<Option<Report>>;
    /// Open or resolved report for the same (reporter, conversation, message).
    async fn find_active_duplicate(
        &self,
        reporter_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<Report>>;
    async fn insert(&self, report: NewReport) -> AppResult<Report>;
    async fn has_locking_report(&self, message_id: Uuid) -> AppResult<bool>;
    /// Oldest first, so the queue is worked in arrival order.
    async fn list_by_status(
        &self,
        status: ReportStatus,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Report>>;
    async fn list_by_reporter(
        &self,
        reporter_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<Report>>;
    /// Applies the review only if the report is still in `expected` status.
    async fn apply_review(
        &self,
        id: Uuid,
        expected: ReportStatus,
        review: &ReportReview,
    ) -> AppResult<Option<Report>>;
}

/// Repository handles shared by the managers.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserDirectory>,
    pub blocks: Arc<dyn BlockRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub reports: Arc<dyn ReportRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            users: store.clone(),
            blocks: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            reports: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            blocks: store.clone(),
            conversations: store.clone(),
            messages: store.clone(),
            reports: store,
        }
    }
}
