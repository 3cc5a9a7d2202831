use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::LimitsConfig;
use crate::db::{DeleteOutcome, Repositories};
use crate::error::{AppError, AppResult};
use crate::models::message::is_external_path;
use crate::models::{AttachmentInput, Message, NewAttachment, NewMessage, UploadedAttachment};
use crate::notifications::Notifier;
use crate::services::access_control::AccessControl;
use crate::services::conversation_service::{preview, ConversationService};
use crate::services::rate_limit::{RateLimitGuard, MESSAGE_SEND_ROUTE};
use crate::services::sanitize::sanitize_body;
use crate::storage::ObjectStorage;

pub const ALLOWED_ATTACHMENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/quicktime",
    "audio/mpeg",
    "audio/mp4",
    "application/pdf",
];

/// `now - created_at <= window`, inclusive at the boundary.
pub fn within_edit_window(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
) -> bool {
    now - created_at <= window
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// `{uploader}/{yyyy}/{mm}/{dd}/{unix_ms}-{random}.{ext}`
pub fn attachment_path(uploader_id: Uuid, now: DateTime<Utc>, mime_type: &str) -> String {
    format!(
        "{}/{:04}/{:02}/{:02}/{}-{}.{}",
        uploader_id,
        now.year(),
        now.month(),
        now.day(),
        now.timestamp_millis(),
        Uuid::new_v4().simple(),
        extension_for(mime_type)
    )
}

/// Create, edit, delete and upload for direct messages.
#[derive(Clone)]
pub struct MessageService {
    repos: Repositories,
    access: AccessControl,
    conversations: ConversationService,
    guard: RateLimitGuard,
    storage: Arc<dyn ObjectStorage>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    limits: LimitsConfig,
    bucket: String,
}

impl MessageService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: Repositories,
        access: AccessControl,
        conversations: ConversationService,
        guard: RateLimitGuard,
        storage: Arc<dyn ObjectStorage>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        limits: LimitsConfig,
        bucket: String,
    ) -> Self {
        Self {
            repos,
            access,
            conversations,
            guard,
            storage,
            notifier,
            clock,
            limits,
            bucket,
        }
    }

    /// First-contact path: resolve the pair's conversation, creating it if needed.
    pub async fn send_to_user(
        &self,
        sender_id: Uuid,
        recipient_id: Uuid,
        body: &str,
        attachments: Vec<AttachmentInput>,
    ) -> AppResult<Message> {
        let (conversation, _) = self
            .conversations
            .get_or_create(sender_id, recipient_id)
            .await?;
        self.create(sender_id, conversation.id, body, attachments)
            .await
    }

    /// Post into an existing conversation. The counterpart is re-checked for blocks,
    /// privacy and account status on every send.
    pub async fn create(
        &self,
        sender_id: Uuid,
        conversation_id: Uuid,
        body: &str,
        attachments: Vec<AttachmentInput>,
    ) -> AppResult<Message> {
        self.guard
            .check(
                "user",
                &sender_id.to_string(),
                "POST",
                MESSAGE_SEND_ROUTE,
                self.limits.message_rule(),
            )
            .await?;

        self.access
            .require_participant(sender_id, conversation_id)
            .await?;
        // Blocks and privacy may have changed since the conversation was opened.
        let recipient_id = self
            .conversations
            .counterpart(conversation_id, sender_id)
            .await?;
        self.access.require_initiate(sender_id, recipient_id).await?;

        let body = sanitize_body(body, self.limits.max_body_chars)?;
        let attachments = self.validate_attachments(sender_id, attachments)?;
        if body.text.is_empty() && attachments.is_empty() {
            return Err(AppError::BadRequest("message is empty".into()));
        }

        let message = self
            .repos
            .messages
            .insert(NewMessage {
                id: Uuid::new_v4(),
                conversation_id,
                sender_id,
                body_html: body.html,
                body_text: body.text,
                created_at: self.clock.now(),
                attachments,
            })
            .await?;
        self.conversations.refresh_latest(conversation_id).await?;

        tracing::info!(
            message_id = %message.id,
            conversation_id = %conversation_id,
            sender_id = %sender_id,
            attachments = message.attachments.len(),
            "Message sent"
        );

        self.notifier.dispatch(
            recipient_id,
            "direct_message",
            json!({
                "conversation_id": conversation_id,
                "message_id": message.id,
                "sender_id": sender_id,
                "preview": preview(&message.body_text),
            }),
        );

        Ok(message)
    }

    fn validate_attachments(
        &self,
        sender_id: Uuid,
        inputs: Vec<AttachmentInput>,
    ) -> AppResult<Vec<NewAttachment>> {
        if inputs.len() > self.limits.max_attachments_per_message {
            return Err(AppError::BadRequest(format!(
                "at most {} attachments per message",
                self.limits.max_attachments_per_message
            )));
        }

        let namespace = format!("{sender_id}/");
        inputs
            .into_iter()
            .map(|input| {
                let path = input.path.trim().to_owned();
                if path.is_empty() || input.bucket.trim().is_empty() {
                    return Err(AppError::BadRequest("attachment bucket and path are required".into()));
                }
                if !is_external_path(&path) && (!path.starts_with(&namespace) || path.contains("..")) {
                    return Err(AppError::BadRequest(
                        "attachment path is outside the sender's upload namespace".into(),
                    ));
                }
                if !ALLOWED_ATTACHMENT_TYPES.contains(&input.mime_type.as_str()) {
                    return Err(AppError::BadRequest(format!(
                        "unsupported attachment type: {}",
                        input.mime_type
                    )));
                }
                if input.size_bytes < 0 || input.size_bytes as usize > self.limits.max_attachment_bytes {
                    return Err(AppError::BadRequest("attachment size out of range".into()));
                }
                Ok(NewAttachment {
                    bucket: input.bucket,
                    storage_path: path,
                    mime_type: input.mime_type,
                    size_bytes: input.size_bytes,
                    metadata: input.metadata.unwrap_or_else(|| json!({})),
                })
            })
            .collect()
    }

    async fn find_visible(&self, user_id: Uuid, message_id: Uuid) -> AppResult<Message> {
        let message = self
            .repos
            .messages
            .find(message_id)
            .await?
            .ok_or(AppError::NotFound)?;
        self.access
            .require_participant(user_id, message.conversation_id)
            .await?;
        Ok(message)
    }

    /// Replace the body of the caller's own message inside the edit window.
    pub async fn edit(&self, user_id: Uuid, message_id: Uuid, body: &str) -> AppResult<Message> {
        let message = self.find_visible(user_id, message_id).await?;
        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "only the sender can edit this message".into(),
            ));
        }

        let now = self.clock.now();
        let window = Duration::minutes(self.limits.edit_window_minutes);
        if !within_edit_window(message.created_at, now, window) {
            return Err(AppError::EditWindowExpired {
                max_edit_minutes: self.limits.edit_window_minutes,
            });
        }

        let body = sanitize_body(body, self.limits.max_body_chars)?;
        if body.text.is_empty() && message.attachments.is_empty() {
            return Err(AppError::BadRequest("message is empty".into()));
        }

        let updated = self
            .repos
            .messages
            .update_body(message_id, &body.html, &body.text, now)
            .await?
            .ok_or(AppError::NotFound)?;

        tracing::info!(message_id = %message_id, "Message edited");
        Ok(updated)
    }

    /// Sender-only delete. Any open or resolved report keeps the message in place.
    ///
    /// The row goes first, through the atomic report-lock guard; attachment objects are
    /// removed only once the row is gone, so a locked message never loses its files.
    pub async fn delete(&self, user_id: Uuid, message_id: Uuid) -> AppResult<()> {
        let message = self.find_visible(user_id, message_id).await?;

        if self.repos.reports.has_locking_report(message_id).await? {
            return Err(AppError::Conflict(
                "message is under moderation review and cannot be deleted".into(),
            ));
        }
        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "only the sender can delete this message".into(),
            ));
        }

        match self.repos.messages.delete_unlocked(message_id).await? {
            DeleteOutcome::Deleted => {}
            DeleteOutcome::Locked => {
                return Err(AppError::Conflict(
                    "message is under moderation review and cannot be deleted".into(),
                ))
            }
            DeleteOutcome::Missing => return Err(AppError::NotFound),
        }

        self.conversations
            .refresh_latest(message.conversation_id)
            .await?;

        let removed_objects = self.remove_owned_objects(&message).await;
        tracing::info!(
            message_id = %message_id,
            conversation_id = %message.conversation_id,
            removed_objects,
            "Message deleted"
        );
        Ok(())
    }

    /// Best effort once the row is gone. Leftover objects are unreferenced and are
    /// logged with their paths for cleanup.
    async fn remove_owned_objects(&self, message: &Message) -> usize {
        let mut owned: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for attachment in message.attachments.iter().filter(|a| !a.is_external()) {
            owned
                .entry(attachment.bucket.as_str())
                .or_default()
                .push(attachment.storage_path.clone());
        }

        let mut removed = 0;
        for (bucket, paths) in &owned {
            match self.storage.remove(bucket, paths).await {
                Ok(()) => removed += paths.len(),
                Err(e) => tracing::error!(
                    message_id = %message.id,
                    bucket = %bucket,
                    paths = ?paths,
                    error = %e,
                    "Failed to remove attachment objects of deleted message"
                ),
            }
        }
        removed
    }

    /// Newest first; `before` pages backwards by creation time.
    pub async fn list(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        self.access
            .require_participant(user_id, conversation_id)
            .await?;
        self.repos
            .messages
            .list_page(conversation_id, before, limit.clamp(1, 100))
            .await
    }

    /// Store a file under the uploader's namespace and return its descriptor.
    pub async fn upload_attachment(
        &self,
        uploader_id: Uuid,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> AppResult<UploadedAttachment> {
        let mime_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !ALLOWED_ATTACHMENT_TYPES.contains(&mime_type.as_str()) {
            return Err(AppError::BadRequest(format!(
                "unsupported attachment type: {mime_type}"
            )));
        }
        if bytes.is_empty() {
            return Err(AppError::BadRequest("attachment is empty".into()));
        }
        if bytes.len() > self.limits.max_attachment_bytes {
            return Err(AppError::BadRequest(format!(
                "attachment exceeds {} bytes",
                self.limits.max_attachment_bytes
            )));
        }

        let size_bytes = bytes.len() as i64;
        let path = attachment_path(uploader_id, self.clock.now(), &mime_type);
        let url = self
            .storage
            .upload(&self.bucket, &path, bytes, &mime_type)
            .await?;

        tracing::info!(uploader_id = %uploader_id, path = %path, size_bytes, "Attachment uploaded");
        Ok(UploadedAttachment {
            bucket: self.bucket.clone(),
            path,
            url,
            mime_type,
            size_bytes,
        })
    }
}
