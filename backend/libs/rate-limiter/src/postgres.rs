use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::persistent::CounterStore;
use crate::window::WindowCounter;

/// `rate_limit_counters` table:
///
/// ```sql
/// CREATE TABLE rate_limit_counters (
///     key             TEXT PRIMARY KEY,
///     window_start_ms BIGINT NOT NULL,
///     count           INTEGER NOT NULL,
///     updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
#[derive(Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rows whose window started before `cutoff_ms`.
    pub async fn purge_before(&self, cutoff_ms: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_start_ms < $1")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn load(&self, key: &str) -> Result<Option<WindowCounter>, StoreError> {
        let row: Option<(i64, i32)> = sqlx::query_as(
            "SELECT window_start_ms, count FROM rate_limit_counters WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(window_start_ms, count)| WindowCounter {
            window_start_ms,
            count: count.max(0) as u32,
        }))
    }

    async fn save(&self, key: &str, counter: WindowCounter) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO rate_limit_counters (key, window_start_ms, count, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (key) DO UPDATE
               SET window_start_ms = EXCLUDED.window_start_ms,
                   count = EXCLUDED.count,
                   updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(counter.window_start_ms)
        .bind(i32::try_from(counter.count).unwrap_or(i32::MAX))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
