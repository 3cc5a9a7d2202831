use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::PgStore;
use crate::db::ConversationRepository;
use crate::error::AppResult;
use crate::models::{Conversation, Participant};

const CONVERSATION_COLUMNS: &str =
    "id, pair_key, created_by, created_at, last_message_id, last_message_at";
const PARTICIPANT_COLUMNS: &str =
    "conversation_id, user_id, joined_at, last_read_at, last_seen_at, archived_at";

#[derive(FromRow)]
struct ListingRow {
    id: Uuid,
    pair_key: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    last_message_id: Option<Uuid>,
    last_message_at: Option<DateTime<Utc>>,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
    last_read_at: Option<DateTime<Utc>>,
    last_seen_at: Option<DateTime<Utc>>,
    archived_at: Option<DateTime<Utc>>,
}

impl From<ListingRow> for (Conversation, Participant) {
    fn from(row: ListingRow) -> Self {
        (
            Conversation {
                id: row.id,
                pair_key: row.pair_key,
                created_by: row.created_by,
                created_at: row.created_at,
                last_message_id: row.last_message_id,
                last_message_at: row.last_message_at,
            },
            Participant {
                conversation_id: row.id,
                user_id: row.user_id,
                joined_at: row.joined_at,
                last_read_at: row.last_read_at,
                last_seen_at: row.last_seen_at,
                archived_at: row.archived_at,
            },
        )
    }
}

#[async_trait]
impl ConversationRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM dm_conversations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_pair_key(&self, pair_key: &str) -> AppResult<Option<Conversation>> {
        let row = sqlx::query_as::<_, Conversation>(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM dm_conversations WHERE pair_key = $1"
        ))
        .bind(pair_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn create_with_participants(
        &self,
        conversation: Conversation,
        participants: [Uuid; 2],
    ) -> AppResult<(Conversation, bool)> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Conversation>(&format!(
            r#"
            INSERT INTO dm_conversations (id, pair_key, created_by, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (pair_key) DO NOTHING
            RETURNING {CONVERSATION_COLUMNS}
            "#
        ))
        .bind(conversation.id)
        .bind(&conversation.pair_key)
        .bind(conversation.created_by)
        .bind(conversation.created_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(created) = inserted else {
            tx.rollback().await?;
            let existing = self
                .find_by_pair_key(&conversation.pair_key)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            return Ok((existing, false));
        };

        for user_id in participants {
            sqlx::query(
                r#"
                INSERT INTO dm_participants (conversation_id, user_id, joined_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (conversation_id, user_id) DO NOTHING
                "#,
            )
            .bind(created.id)
            .bind(user_id)
            .bind(created.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((created, true))
    }

    async fn get_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<Participant>> {
        let row = sqlx::query_as::<_, Participant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM dm_participants WHERE conversation_id = $1 AND user_id = $2"
        ))
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        let rows = sqlx::query_as::<_, Participant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM dm_participants WHERE conversation_id = $1 ORDER BY joined_at, user_id"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        archived: bool,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<(Conversation, Participant)>> {
        let rows = sqlx::query_as::<_, ListingRow>(
            r#"
            SELECT c.id, c.pair_key, c.created_by, c.created_at,
                   c.last_message_id, c.last_message_at,
                   p.user_id, p.joined_at, p.last_read_at, p.last_seen_at, p.archived_at
            FROM dm_participants p
            JOIN dm_conversations c ON c.id = p.conversation_id
            WHERE p.user_id = $1
              AND (p.archived_at IS NOT NULL) = $2
            ORDER BY COALESCE(c.last_message_at, c.created_at) DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id)
        .bind(archived)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn active_participations(&self, user_id: Uuid) -> AppResult<Vec<Participant>> {
        let rows = sqlx::query_as::<_, Participant>(&format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM dm_participants WHERE user_id = $1 AND archived_at IS NULL"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn set_archived(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        archived_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE dm_participants SET archived_at = $3 WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(archived_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE dm_participants
               SET last_read_at = $3, last_seen_at = $3
             WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_latest(
        &self,
        conversation_id: Uuid,
        latest: Option<(Uuid, DateTime<Utc>)>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE dm_conversations SET last_message_id = $2, last_message_at = $3 WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(latest.map(|(id, _)| id))
        .bind(latest.map(|(_, at)| at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
