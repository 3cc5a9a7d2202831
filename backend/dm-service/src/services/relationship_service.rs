use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::db::Repositories;
use crate::error::{AppError, AppResult};
use crate::models::{BlockedUser, DmPrivacy};

/// Blocks and the DM privacy preference, the user-controlled inputs to the initiate check.
#[derive(Clone)]
pub struct RelationshipService {
    repos: Repositories,
    clock: Arc<dyn Clock>,
}

impl RelationshipService {
    pub fn new(repos: Repositories, clock: Arc<dyn Clock>) -> Self {
        Self { repos, clock }
    }

    /// `true` when a new block was recorded, `false` if it already existed.
    pub async fn block(&self, blocker_id: Uuid, blocked_id: Uuid) -> AppResult<bool> {
        if blocker_id == blocked_id {
            return Err(AppError::BadRequest("cannot block yourself".into()));
        }
        if self.repos.users.get_profile(blocked_id).await?.is_none() {
            return Err(AppError::NotFound);
        }
        let created = self
            .repos
            .blocks
            .insert_block(blocker_id, blocked_id, self.clock.now())
            .await?;
        tracing::info!(blocker_id = %blocker_id, blocked_id = %blocked_id, created, "User blocked");
        Ok(created)
    }

    /// `true` when a block was removed.
    pub async fn unblock(&self, blocker_id: Uuid, blocked_id: Uuid) -> AppResult<bool> {
        let removed = self.repos.blocks.delete_block(blocker_id, blocked_id).await?;
        tracing::info!(blocker_id = %blocker_id, blocked_id = %blocked_id, removed, "User unblocked");
        Ok(removed)
    }

    /// Users the caller has blocked, most recent first.
    pub async fn list_blocked(
        &self,
        blocker_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<BlockedUser>> {
        self.repos
            .blocks
            .list_blocked(blocker_id, limit.clamp(1, 100), offset.max(0))
            .await
    }

    pub async fn dm_privacy(&self, user_id: Uuid) -> AppResult<DmPrivacy> {
        self.repos
            .users
            .get_profile(user_id)
            .await?
            .map(|p| p.dm_privacy)
            .ok_or(AppError::NotFound)
    }

    /// Who may open new conversations with the caller.
    pub async fn set_dm_privacy(&self, user_id: Uuid, privacy: DmPrivacy) -> AppResult<DmPrivacy> {
        if !self.repos.users.set_dm_privacy(user_id, privacy).await? {
            return Err(AppError::NotFound);
        }
        tracing::info!(user_id = %user_id, dm_privacy = %privacy, "DM privacy updated");
        Ok(privacy)
    }
}
