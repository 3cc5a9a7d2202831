//! Who may read a conversation and who may start one.

use uuid::Uuid;

use crate::db::Repositories;
use crate::error::{AppError, AppResult};
use crate::models::{Participant, UserProfile};

/// Outcome of the initiate check, most specific reason first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitiateDecision {
    Allowed,
    SelfMessage,
    RecipientNotFound,
    SenderInactive,
    RecipientInactive,
    Blocked,
    PrivacyDenied,
}

impl InitiateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, InitiateDecision::Allowed)
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            InitiateDecision::Allowed => Ok(()),
            InitiateDecision::SelfMessage => {
                Err(AppError::BadRequest("cannot message yourself".into()))
            }
            InitiateDecision::RecipientNotFound => Err(AppError::NotFound),
            InitiateDecision::SenderInactive => {
                Err(AppError::Forbidden("your account is not active".into()))
            }
            InitiateDecision::RecipientInactive => Err(AppError::Forbidden(
                "recipient account is not active".into(),
            )),
            InitiateDecision::Blocked => Err(AppError::Forbidden(
                "messaging is blocked between these users".into(),
            )),
            InitiateDecision::PrivacyDenied => Err(AppError::Forbidden(
                "recipient does not accept direct messages from you".into(),
            )),
        }
    }
}

/// Pure part of the initiate check.
pub fn decide_initiate(
    sender: &UserProfile,
    recipient: &UserProfile,
    blocked_either_way: bool,
) -> InitiateDecision {
    if sender.id == recipient.id {
        return InitiateDecision::SelfMessage;
    }
    if !sender.account_status.is_active() {
        return InitiateDecision::SenderInactive;
    }
    if !recipient.account_status.is_active() {
        return InitiateDecision::RecipientInactive;
    }
    if blocked_either_way {
        return InitiateDecision::Blocked;
    }
    if !recipient.dm_privacy.admits(sender.is_verified) {
        return InitiateDecision::PrivacyDenied;
    }
    InitiateDecision::Allowed
}

/// Evaluated against the store on every call; nothing is cached.
#[derive(Clone)]
pub struct AccessControl {
    repos: Repositories,
}

impl AccessControl {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// True only for a non-archived participant row.
    pub async fn can_participate(&self, user_id: Uuid, conversation_id: Uuid) -> AppResult<bool> {
        Ok(self
            .membership(user_id, conversation_id)
            .await?
            .is_some_and(|p| p.is_active()))
    }

    /// Active participant row, or `NotFound` so outsiders cannot discover conversation ids.
    pub async fn require_participant(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Participant> {
        self.membership(user_id, conversation_id)
            .await?
            .filter(Participant::is_active)
            .ok_or(AppError::NotFound)
    }

    /// Participant row whether archived or not. Only unarchiving goes through this.
    pub async fn require_member(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Participant> {
        self.membership(user_id, conversation_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn membership(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<Option<Participant>> {
        self.repos
            .conversations
            .get_participant(conversation_id, user_id)
            .await
    }

    /// Loads both profiles and the block state, then applies [`decide_initiate`].
    pub async fn evaluate_initiate(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<InitiateDecision> {
        if sender_id == recipient_id {
            return Ok(InitiateDecision::SelfMessage);
        }

        let profiles = self
            .repos
            .users
            .get_profiles(&[sender_id, recipient_id])
            .await?;
        let sender = profiles.iter().find(|p| p.id == sender_id);
        let recipient = profiles.iter().find(|p| p.id == recipient_id);

        let (sender, recipient) = match (sender, recipient) {
            (Some(s), Some(r)) => (s, r),
            (None, _) => return Ok(InitiateDecision::SenderInactive),
            (_, None) => return Ok(InitiateDecision::RecipientNotFound),
        };

        let blocked = self
            .repos
            .blocks
            .is_blocked_either_way(sender_id, recipient_id)
            .await?;

        Ok(decide_initiate(sender, recipient, blocked))
    }

    pub async fn can_initiate(&self, sender_id: Uuid, recipient_id: Uuid) -> AppResult<bool> {
        Ok(self
            .evaluate_initiate(sender_id, recipient_id)
            .await?
            .is_allowed())
    }

    pub async fn require_initiate(&self, sender_id: Uuid, recipient_id: Uuid) -> AppResult<()> {
        let decision = self.evaluate_initiate(sender_id, recipient_id).await?;
        if !decision.is_allowed() {
            tracing::info!(
                sender_id = %sender_id,
                recipient_id = %recipient_id,
                decision = ?decision,
                "Direct message denied"
            );
        }
        decision.into_result()
    }
}
