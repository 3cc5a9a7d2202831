use async_trait::async_trait;
use sqlx::FromRow;
use uuid::Uuid;

use super::PgStore;
use crate::db::UserDirectory;
use crate::error::{AppError, AppResult};
use crate::models::{AccountStatus, DmPrivacy, UserProfile, UserRole};

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    role: String,
    account_status: String,
    is_verified: bool,
    dm_privacy: String,
}

impl TryFrom<UserRow> for UserProfile {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = UserRole::from_db(&row.role).ok_or_else(|| {
            tracing::error!(user_id = %row.id, role = %row.role, "Invalid role in database");
            AppError::Internal
        })?;
        let account_status = AccountStatus::from_db(&row.account_status).ok_or_else(|| {
            tracing::error!(user_id = %row.id, status = %row.account_status, "Invalid account status in database");
            AppError::Internal
        })?;
        let dm_privacy = DmPrivacy::from_db(&row.dm_privacy).ok_or_else(|| {
            tracing::error!(user_id = %row.id, privacy = %row.dm_privacy, "Invalid dm privacy in database");
            AppError::Internal
        })?;

        Ok(UserProfile {
            id: row.id,
            username: row.username,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            role,
            account_status,
            is_verified: row.is_verified,
            dm_privacy,
        })
    }
}

const USER_COLUMNS: &str = "id, username, display_name, avatar_url, role, account_status, is_verified, dm_privacy";

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_profile(&self, user_id: Uuid) -> AppResult<Option<UserProfile>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserProfile::try_from).transpose()
    }

    async fn get_profiles(&self, user_ids: &[Uuid]) -> AppResult<Vec<UserProfile>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)"
        ))
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserProfile::try_from).collect()
    }

    async fn set_dm_privacy(&self, user_id: Uuid, privacy: DmPrivacy) -> AppResult<bool> {
        let result = sqlx::query("UPDATE users SET dm_privacy = $2 WHERE id = $1")
            .bind(user_id)
            .bind(privacy.to_db())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
