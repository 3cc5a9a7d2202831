use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PgStore;
use crate::db::BlockRepository;
use crate::error::AppResult;
use crate::models::BlockedUser;

#[async_trait]
impl BlockRepository for PgStore {
    async fn insert_block(
        &self,
        blocker: Uuid,
        blocked: Uuid,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_blocks (blocker_id, blocked_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (blocker_id, blocked_id) DO NOTHING
            "#,
        )
        .bind(blocker)
        .bind(blocked)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_block(&self, blocker: Uuid, blocked: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM user_blocks WHERE blocker_id = $1 AND blocked_id = $2")
            .bind(blocker)
            .bind(blocked)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_blocked_either_way(&self, a: Uuid, b: Uuid) -> AppResult<bool> {
        let blocked: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM user_blocks
                WHERE (blocker_id = $1 AND blocked_id = $2)
                   OR (blocker_id = $2 AND blocked_id = $1)
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;

        Ok(blocked)
    }

    async fn list_blocked(
        &self,
        blocker: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<BlockedUser>> {
        let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT blocked_id, created_at
            FROM user_blocks
            WHERE blocker_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(blocker)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(user_id, blocked_at)| BlockedUser {
                user_id,
                blocked_at,
            })
            .collect())
    }
}
