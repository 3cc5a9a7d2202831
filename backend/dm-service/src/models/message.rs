use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body_html: String,
    pub body_text: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Attachment {
    pub id: Uuid,
    pub message_id: Uuid,
    pub bucket: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    /// Externally hosted files are referenced by absolute URL and never removed here.
    pub fn is_external(&self) -> bool {
        is_external_path(&self.storage_path)
    }
}

pub fn is_external_path(path: &str) -> bool {
    let lower = path.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Attachment reference supplied when sending a message.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentInput {
    pub bucket: String,
    pub path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Validated message content ready to persist.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body_html: String,
    pub body_text: String,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<NewAttachment>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub bucket: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: serde_json::Value,
}

/// Result of a media upload, echoed back by the client when sending.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedAttachment {
    pub bucket: String,
    pub path: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_paths() {
        assert!(is_external_path("https://cdn.example.com/a.png"));
        assert!(is_external_path("HTTP://legacy.example.com/a.png"));
        assert!(!is_external_path("7d3c/2024/05/01/1714-ab.png"));
    }
}
