use async_trait::async_trait;
use redis::AsyncCommands;
use serde_json::json;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        recipient_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError>;
}

fn channel_for_user(id: Uuid) -> String {
    format!("notifications:{}", id)
}

/// Publishes to `notifications:{user_id}` for the fan-out workers.
pub struct RedisNotificationSink {
    client: redis::Client,
}

impl RedisNotificationSink {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationSink for RedisNotificationSink {
    async fn notify(
        &self,
        recipient_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError> {
        let body = serde_json::to_string(&json!({
            "type": event_type,
            "recipient_id": recipient_id,
            "payload": payload,
        }))?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish::<_, _, ()>(channel_for_user(recipient_id), body)
            .await?;
        Ok(())
    }
}

pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn notify(
        &self,
        recipient_id: Uuid,
        event_type: &str,
        _payload: serde_json::Value,
    ) -> Result<(), NotificationError> {
        tracing::debug!(recipient_id = %recipient_id, event_type, "Notification dropped (no sink)");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub recipient_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
}

#[derive(Default)]
pub struct MemoryNotificationSink {
    sent: Mutex<Vec<SentNotification>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn notify(
        &self,
        recipient_id: Uuid,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), NotificationError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentNotification {
                recipient_id,
                event_type: event_type.to_owned(),
                payload,
            });
        }
        Ok(())
    }
}

/// Spawns deliveries so the request never waits on the sink.
#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub fn dispatch(&self, recipient_id: Uuid, event_type: &'static str, payload: serde_json::Value) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.notify(recipient_id, event_type, payload).await {
                tracing::warn!(
                    recipient_id = %recipient_id,
                    event_type,
                    error = %e,
                    "Notification delivery failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    #[async_trait]
    impl NotificationSink for FailingSink {
        async fn notify(
            &self,
            _recipient_id: Uuid,
            _event_type: &str,
            _payload: serde_json::Value,
        ) -> Result<(), NotificationError> {
            Err(NotificationError::Serialize(
                serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
            ))
        }
    }

    #[test]
    fn channel_format() {
        let id = Uuid::nil();
        assert_eq!(
            channel_for_user(id),
            "notifications:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test]
    async fn failing_sink_does_not_panic_dispatch() {
        let notifier = Notifier::new(Arc::new(FailingSink));
        notifier.dispatch(Uuid::new_v4(), "direct_message", json!({}));
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn memory_sink_receives_dispatch() {
        let sink = Arc::new(MemoryNotificationSink::new());
        let notifier = Notifier::new(sink.clone());
        let recipient = Uuid::new_v4();
        notifier.dispatch(recipient, "direct_message", json!({ "preview": "hi" }));

        for _ in 0..50 {
            if !sink.sent().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        let sent = sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, recipient);
        assert_eq!(sent[0].event_type, "direct_message");
    }
}
