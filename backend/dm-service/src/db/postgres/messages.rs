use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use super::PgStore;
use crate::db::{DeleteOutcome, MessageRepository};
use crate::error::AppResult;
use crate::models::{Attachment, Message, NewMessage};

const MESSAGE_COLUMNS: &str =
    "id, conversation_id, sender_id, body_html, body_text, created_at, edited_at";
const ATTACHMENT_COLUMNS: &str =
    "id, message_id, bucket, storage_path, mime_type, size_bytes, metadata, created_at";

impl PgStore {
    async fn with_attachments(&self, mut messages: Vec<Message>) -> AppResult<Vec<Message>> {
        if messages.is_empty() {
            return Ok(messages);
        }
        let ids: Vec<Uuid> = messages.iter().map(|m| m.id).collect();
        let rows = sqlx::query_as::<_, Attachment>(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM dm_attachments WHERE message_id = ANY($1) ORDER BY created_at, id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_message: HashMap<Uuid, Vec<Attachment>> = HashMap::new();
        for attachment in rows {
            by_message
                .entry(attachment.message_id)
                .or_default()
                .push(attachment);
        }
        for message in &mut messages {
            message.attachments = by_message.remove(&message.id).unwrap_or_default();
        }
        Ok(messages)
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn insert(&self, message: NewMessage) -> AppResult<Message> {
        let mut tx = self.pool.begin().await?;

        let mut row = sqlx::query_as::<_, Message>(&format!(
            r#"
            INSERT INTO dm_messages (id, conversation_id, sender_id, body_html, body_text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(&message.body_html)
        .bind(&message.body_text)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for attachment in message.attachments {
            let stored = sqlx::query_as::<_, Attachment>(&format!(
                r#"
                INSERT INTO dm_attachments
                    (id, message_id, bucket, storage_path, mime_type, size_bytes, metadata, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING {ATTACHMENT_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(row.id)
            .bind(&attachment.bucket)
            .bind(&attachment.storage_path)
            .bind(&attachment.mime_type)
            .bind(attachment.size_bytes)
            .bind(&attachment.metadata)
            .bind(row.created_at)
            .fetch_one(&mut *tx)
            .await?;
            row.attachments.push(stored);
        }

        tx.commit().await?;
        Ok(row)
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM dm_messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(message) => Ok(self.with_attachments(vec![message]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_body(
        &self,
        id: Uuid,
        body_html: &str,
        body_text: &str,
        edited_at: DateTime<Utc>,
    ) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, Message>(&format!(
            r#"
            UPDATE dm_messages
               SET body_html = $2, body_text = $3, edited_at = $4
             WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(body_html)
        .bind(body_text)
        .bind(edited_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(message) => Ok(self.with_attachments(vec![message]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn delete_unlocked(&self, id: Uuid) -> AppResult<DeleteOutcome> {
        let deleted: Option<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM dm_messages m
             WHERE m.id = $1
               AND NOT EXISTS (
                   SELECT 1 FROM dm_reports r
                    WHERE r.message_id = m.id
                      AND r.status IN ('open', 'resolved')
               )
            RETURNING m.id
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if deleted.is_some() {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM dm_messages WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(if exists {
            DeleteOutcome::Locked
        } else {
            DeleteOutcome::Missing
        })
    }

    async fn latest(&self, conversation_id: Uuid) -> AppResult<Option<Message>> {
        let row = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM dm_messages
             WHERE conversation_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT 1
            "#
        ))
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn list_page(
        &self,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS} FROM dm_messages
             WHERE conversation_id = $1
               AND ($2::timestamptz IS NULL OR created_at < $2)
             ORDER BY created_at DESC, id DESC
             LIMIT $3
            "#
        ))
        .bind(conversation_id)
        .bind(before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        self.with_attachments(rows).await
    }

    async fn list_all(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, Message>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM dm_messages WHERE conversation_id = $1 ORDER BY created_at, id"
        ))
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_attachments(rows).await
    }

    async fn count_from_others_since(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM dm_messages
             WHERE conversation_id = $1
               AND sender_id <> $2
               AND ($3::timestamptz IS NULL OR created_at > $3)
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}
