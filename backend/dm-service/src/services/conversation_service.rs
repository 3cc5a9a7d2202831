use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::clock::Clock;
use crate::config::LimitsConfig;
use crate::db::Repositories;
use crate::error::{AppError, AppResult};
use crate::models::{
    pair_key, Conversation, ConversationSummary, ConversationView, Message, Participant,
    ProfileSummary,
};
use crate::services::access_control::AccessControl;
use crate::services::rate_limit::{RateLimitGuard, CONVERSATION_CREATE_ROUTE};

const PREVIEW_CHARS: usize = 140;

pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS - 1).collect();
    cut.push('…');
    cut
}

/// Conversation creation, per-participant state and the cached last-message pointer.
#[derive(Clone)]
pub struct ConversationService {
    repos: Repositories,
    access: AccessControl,
    guard: RateLimitGuard,
    clock: Arc<dyn Clock>,
    limits: LimitsConfig,
}

impl ConversationService {
    pub fn new(
        repos: Repositories,
        access: AccessControl,
        guard: RateLimitGuard,
        clock: Arc<dyn Clock>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            repos,
            access,
            guard,
            clock,
            limits,
        }
    }

    /// Existing conversation for the pair, or a new one when the sender may initiate
    /// and is under the daily creation quota. `bool` is true when created.
    pub async fn get_or_create(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<(Conversation, bool)> {
        if sender_id == recipient_id {
            return Err(AppError::BadRequest("cannot message yourself".into()));
        }

        let key = pair_key(sender_id, recipient_id);
        if let Some(existing) = self.repos.conversations.find_by_pair_key(&key).await? {
            self.reopen_for(sender_id, &existing).await?;
            return Ok((existing, false));
        }

        self.guard
            .check(
                "user",
                &sender_id.to_string(),
                "POST",
                CONVERSATION_CREATE_ROUTE,
                self.limits.conversation_rule(),
            )
            .await?;
        self.access.require_initiate(sender_id, recipient_id).await?;

        let conversation = Conversation {
            id: Uuid::new_v4(),
            pair_key: key,
            created_by: sender_id,
            created_at: self.clock.now(),
            last_message_id: None,
            last_message_at: None,
        };
        let (conversation, created) = self
            .repos
            .conversations
            .create_with_participants(conversation, [sender_id, recipient_id])
            .await?;

        if created {
            tracing::info!(
                conversation_id = %conversation.id,
                created_by = %sender_id,
                "Conversation created"
            );
        }
        Ok((conversation, created))
    }

    /// Sending to someone again brings an archived thread back for the sender.
    async fn reopen_for(&self, sender_id: Uuid, conversation: &Conversation) -> AppResult<()> {
        let archived = self
            .repos
            .conversations
            .get_participant(conversation.id, sender_id)
            .await?
            .is_some_and(|p| !p.is_active());
        if archived {
            let recipient_id = self.counterpart(conversation.id, sender_id).await?;
            self.access.require_initiate(sender_id, recipient_id).await?;
            self.repos
                .conversations
                .set_archived(conversation.id, sender_id, None)
                .await?;
            tracing::debug!(conversation_id = %conversation.id, user_id = %sender_id, "Conversation reopened by send");
        }
        Ok(())
    }

    /// Conversation with both participant rows, for an active participant.
    pub async fn get(&self, user_id: Uuid, conversation_id: Uuid) -> AppResult<ConversationView> {
        self.access
            .require_participant(user_id, conversation_id)
            .await?;
        let conversation = self
            .repos
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let participants = self
            .repos
            .conversations
            .list_participants(conversation_id)
            .await?;
        Ok(ConversationView {
            conversation,
            participants,
        })
    }

    /// The other participant's id.
    pub async fn counterpart(&self, conversation_id: Uuid, user_id: Uuid) -> AppResult<Uuid> {
        self.repos
            .conversations
            .list_participants(conversation_id)
            .await?
            .into_iter()
            .map(|p| p.user_id)
            .find(|id| *id != user_id)
            .ok_or(AppError::NotFound)
    }

    /// Set or clear the caller's archived_at. The other participant is untouched.
    /// Archiving needs an active row; unarchiving accepts an archived one.
    pub async fn archive(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        archived: bool,
    ) -> AppResult<Participant> {
        if archived {
            self.access
                .require_participant(user_id, conversation_id)
                .await?;
        } else {
            self.access.require_member(user_id, conversation_id).await?;
        }
        let archived_at = archived.then(|| self.clock.now());
        self.repos
            .conversations
            .set_archived(conversation_id, user_id, archived_at)
            .await?;

        tracing::debug!(conversation_id = %conversation_id, user_id = %user_id, archived, "Participant archive toggled");
        self.access.require_member(user_id, conversation_id).await
    }

    /// Stamp last_read_at and last_seen_at with the current time.
    pub async fn mark_read(&self, user_id: Uuid, conversation_id: Uuid) -> AppResult<Participant> {
        self.access
            .require_participant(user_id, conversation_id)
            .await?;
        self.repos
            .conversations
            .mark_read(conversation_id, user_id, self.clock.now())
            .await?;
        self.access
            .require_participant(user_id, conversation_id)
            .await
    }

    /// Recompute the cached pointer from the newest message. Safe to run redundantly.
    pub async fn refresh_latest(&self, conversation_id: Uuid) -> AppResult<Option<Message>> {
        let latest = self.repos.messages.latest(conversation_id).await?;
        self.repos
            .conversations
            .set_latest(
                conversation_id,
                latest.as_ref().map(|m| (m.id, m.created_at)),
            )
            .await?;
        Ok(latest)
    }

    async fn unread_for(&self, participant: &Participant) -> AppResult<i64> {
        self.repos
            .messages
            .count_from_others_since(
                participant.conversation_id,
                participant.user_id,
                participant.last_read_at,
            )
            .await
    }

    /// Sum over non-archived conversations. One count query per conversation.
    // TODO: keep a per-participant unread counter updated on insert/markRead once inbox sizes warrant it.
    pub async fn unread_count(&self, user_id: Uuid) -> AppResult<i64> {
        let mut total = 0;
        for participant in self
            .repos
            .conversations
            .active_participations(user_id)
            .await?
        {
            total += self.unread_for(&participant).await?;
        }
        Ok(total)
    }

    /// Caller's conversations with counterpart snapshot, preview and unread count.
    pub async fn list(
        &self,
        user_id: Uuid,
        archived: bool,
        limit: i64,
        offset: i64,
    ) -> AppResult<Vec<ConversationSummary>> {
        let rows = self
            .repos
            .conversations
            .list_for_user(user_id, archived, limit, offset)
            .await?;

        let mut counterpart_ids = Vec::with_capacity(rows.len());
        for (conversation, _) in &rows {
            match self.counterpart(conversation.id, user_id).await {
                Ok(other) => counterpart_ids.push((conversation.id, other)),
                Err(AppError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        let ids: Vec<Uuid> = counterpart_ids.iter().map(|(_, id)| *id).collect();
        let profiles: HashMap<Uuid, ProfileSummary> = self
            .repos
            .users
            .get_profiles(&ids)
            .await?
            .iter()
            .map(|p| (p.id, ProfileSummary::from(p)))
            .collect();
        let counterpart_of: HashMap<Uuid, Uuid> = counterpart_ids.into_iter().collect();

        let mut summaries = Vec::with_capacity(rows.len());
        for (conversation, participant) in rows {
            let last_message_preview = match conversation.last_message_id {
                Some(id) => self
                    .repos
                    .messages
                    .find(id)
                    .await?
                    .map(|m| preview(&m.body_text)),
                None => None,
            };
            summaries.push(ConversationSummary {
                id: conversation.id,
                counterpart: counterpart_of
                    .get(&conversation.id)
                    .and_then(|other| profiles.get(other))
                    .cloned(),
                last_message_id: conversation.last_message_id,
                last_message_at: conversation.last_message_at,
                last_message_preview,
                unread_count: self.unread_for(&participant).await?,
                archived: participant.archived_at.is_some(),
                created_at: conversation.created_at,
            });
        }
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let p = preview(&long);
        assert_eq!(p.chars().count(), PREVIEW_CHARS);
        assert!(p.ends_with('…'));
        assert_eq!(preview("short"), "short");
    }
}
