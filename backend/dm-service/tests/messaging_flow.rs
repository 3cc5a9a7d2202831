mod common;

use chrono::Duration;
use common::Harness;
use dm_service::config::LimitsConfig;
use dm_service::models::{pair_key, AttachmentInput, DmPrivacy, ReportReason, UserRole};
use dm_service::AppError;
use serde_json::json;

async fn settle_notifications() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_first_contact_scenario() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let state = &h.state;

    assert!(state.access.can_initiate(alice.id, bob.id).await.unwrap());

    let (conversation, created) = state
        .conversations
        .get_or_create(alice.id, bob.id)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(conversation.pair_key, pair_key(alice.id, bob.id));

    let message = state
        .messages
        .create(alice.id, conversation.id, "hello", vec![])
        .await
        .unwrap();
    assert_eq!(message.body_text, "hello");
    assert_eq!(state.conversations.unread_count(bob.id).await.unwrap(), 1);
    assert_eq!(state.conversations.unread_count(alice.id).await.unwrap(), 0);

    h.clock.advance(Duration::seconds(1));
    state.conversations.mark_read(bob.id, conversation.id).await.unwrap();
    assert_eq!(state.conversations.unread_count(bob.id).await.unwrap(), 0);

    h.clock.advance(Duration::seconds(1));
    state
        .messages
        .create(alice.id, conversation.id, "still there?", vec![])
        .await
        .unwrap();
    assert_eq!(state.conversations.unread_count(bob.id).await.unwrap(), 1);

    settle_notifications().await;
    let sent = h.notifications.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].recipient_id, bob.id);
    assert_eq!(sent[0].event_type, "direct_message");
    assert_eq!(sent[0].payload["preview"], "hello");
}

#[tokio::test]
async fn test_get_or_create_reuses_pair_from_either_side() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");

    let (first, created) = h.state.conversations.get_or_create(alice.id, bob.id).await.unwrap();
    assert!(created);
    let (second, created) = h.state.conversations.get_or_create(bob.id, alice.id).await.unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(h.store.conversation_count().unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_creation_yields_one_conversation() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");

    let mut tasks = Vec::new();
    for i in 0..8 {
        let conversations = h.state.conversations.clone();
        let (a, b) = if i % 2 == 0 { (alice.id, bob.id) } else { (bob.id, alice.id) };
        tasks.push(tokio::spawn(async move { conversations.get_or_create(a, b).await }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        let (conversation, _) = task.await.unwrap().unwrap();
        ids.push(conversation.id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(h.store.conversation_count().unwrap(), 1);
}

#[tokio::test]
async fn test_self_message_is_rejected() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let err = h.state.conversations.get_or_create(alice.id, alice.id).await.unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_block_and_privacy_deny_initiation() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let carol = h.add_user_with("carol", UserRole::User, DmPrivacy::VerifiedOnly, false);
    let dave = h.add_user_with("dave", UserRole::User, DmPrivacy::Nobody, false);

    h.state.relationships.block(bob.id, alice.id).await.unwrap();
    let err = h.state.conversations.get_or_create(alice.id, bob.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assert!(!h.state.access.can_initiate(alice.id, carol.id).await.unwrap());
    assert!(!h.state.access.can_initiate(alice.id, dave.id).await.unwrap());
    assert_eq!(h.store.conversation_count().unwrap(), 0);
}

#[tokio::test]
async fn test_block_applies_to_existing_conversation() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let message = h.state.messages.send_to_user(alice.id, bob.id, "hi", vec![]).await.unwrap();

    h.state.relationships.block(bob.id, alice.id).await.unwrap();
    let err = h
        .state
        .messages
        .create(alice.id, message.conversation_id, "hi again", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    h.state.relationships.unblock(bob.id, alice.id).await.unwrap();
    h.state
        .messages
        .create(alice.id, message.conversation_id, "sorry", vec![])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_outsider_cannot_read_or_post() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let eve = h.add_user("eve");
    let message = h.state.messages.send_to_user(alice.id, bob.id, "hi", vec![]).await.unwrap();

    let err = h.state.conversations.get(eve.id, message.conversation_id).await.unwrap_err();
    assert_eq!(err.status_code(), 404);
    let err = h
        .state
        .messages
        .create(eve.id, message.conversation_id, "let me in", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
    let err = h.state.messages.edit(eve.id, message.id, "x").await.unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_edit_window_boundary() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let message = h.state.messages.send_to_user(alice.id, bob.id, "first", vec![]).await.unwrap();

    h.clock.advance(Duration::minutes(15) - Duration::milliseconds(1));
    let edited = h.state.messages.edit(alice.id, message.id, "first!").await.unwrap();
    assert_eq!(edited.body_text, "first!");
    assert!(edited.edited_at.is_some());

    h.clock.advance(Duration::milliseconds(2));
    let err = h.state.messages.edit(alice.id, message.id, "too late").await.unwrap_err();
    assert!(matches!(err, AppError::EditWindowExpired { max_edit_minutes: 15 }));
}

#[tokio::test]
async fn test_only_sender_can_edit() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let message = h.state.messages.send_to_user(alice.id, bob.id, "mine", vec![]).await.unwrap();

    let err = h.state.messages.edit(bob.id, message.id, "yours").await.unwrap_err();
    assert_eq!(err.status_code(), 403);
}

#[tokio::test]
async fn test_body_is_sanitized_and_must_not_be_empty() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");

    let message = h
        .state
        .messages
        .send_to_user(alice.id, bob.id, "<b>hi</b><script>alert(1)</script>", vec![])
        .await
        .unwrap();
    assert_eq!(message.body_html, "<b>hi</b>");
    assert_eq!(message.body_text, "hi");

    let err = h
        .state
        .messages
        .create(alice.id, message.conversation_id, "<p> </p>", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_delete_removes_internal_attachments_and_refreshes_latest() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");

    let uploaded = h
        .state
        .messages
        .upload_attachment(alice.id, "image/png", vec![1, 2, 3])
        .await
        .unwrap();
    assert_eq!(h.storage.len(), 1);

    let first = h.state.messages.send_to_user(alice.id, bob.id, "first", vec![]).await.unwrap();
    h.clock.advance(Duration::seconds(1));
    let attachments = vec![
        AttachmentInput {
            bucket: uploaded.bucket.clone(),
            path: uploaded.path.clone(),
            mime_type: uploaded.mime_type.clone(),
            size_bytes: uploaded.size_bytes,
            metadata: None,
        },
        AttachmentInput {
            bucket: "external".into(),
            path: "https://media.example.com/cat.gif".into(),
            mime_type: "image/gif".into(),
            size_bytes: 10,
            metadata: Some(json!({ "width": 10 })),
        },
    ];
    let second = h
        .state
        .messages
        .create(alice.id, first.conversation_id, "", attachments)
        .await
        .unwrap();
    assert_eq!(second.attachments.len(), 2);

    let view = h.state.conversations.get(alice.id, first.conversation_id).await.unwrap();
    assert_eq!(view.conversation.last_message_id, Some(second.id));

    h.state.messages.delete(alice.id, second.id).await.unwrap();
    assert!(h.storage.is_empty());

    let view = h.state.conversations.get(alice.id, first.conversation_id).await.unwrap();
    assert_eq!(view.conversation.last_message_id, Some(first.id));
}

#[tokio::test]
async fn test_storage_failure_after_delete_only_orphans_objects() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let uploaded = h
        .state
        .messages
        .upload_attachment(alice.id, "application/pdf", vec![0; 16])
        .await
        .unwrap();
    let message = h
        .state
        .messages
        .send_to_user(
            alice.id,
            bob.id,
            "report attached",
            vec![AttachmentInput {
                bucket: uploaded.bucket.clone(),
                path: uploaded.path.clone(),
                mime_type: uploaded.mime_type,
                size_bytes: uploaded.size_bytes,
                metadata: None,
            }],
        )
        .await
        .unwrap();

    h.storage.set_unavailable(true);
    h.state.messages.delete(alice.id, message.id).await.unwrap();
    h.storage.set_unavailable(false);

    let history = h
        .state
        .messages
        .list(alice.id, message.conversation_id, None, 50)
        .await
        .unwrap();
    assert!(history.is_empty());
    assert!(h.storage.get(&uploaded.bucket, &uploaded.path).is_some());
}

#[tokio::test]
async fn test_locked_delete_leaves_attachments_in_storage() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let uploaded = h
        .state
        .messages
        .upload_attachment(alice.id, "image/jpeg", vec![9; 4])
        .await
        .unwrap();
    let message = h
        .state
        .messages
        .send_to_user(
            alice.id,
            bob.id,
            "evidence",
            vec![AttachmentInput {
                bucket: uploaded.bucket.clone(),
                path: uploaded.path.clone(),
                mime_type: uploaded.mime_type,
                size_bytes: uploaded.size_bytes,
                metadata: None,
            }],
        )
        .await
        .unwrap();
    h.state
        .moderation
        .submit_report(bob.id, message.conversation_id, message.id, ReportReason::Harassment, None)
        .await
        .unwrap();

    let err = h.state.messages.delete(alice.id, message.id).await.unwrap_err();
    assert_eq!(err.status_code(), 409);
    assert!(h.storage.get(&uploaded.bucket, &uploaded.path).is_some());
}

#[tokio::test]
async fn test_attachment_outside_sender_namespace_rejected() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");

    let err = h
        .state
        .messages
        .send_to_user(
            alice.id,
            bob.id,
            "look",
            vec![AttachmentInput {
                bucket: "dm-attachments".into(),
                path: format!("{}/2024/05/01/1-x.png", bob.id),
                mime_type: "image/png".into(),
                size_bytes: 3,
                metadata: None,
            }],
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_upload_validation() {
    let h = Harness::new();
    let alice = h.add_user("alice");

    let err = h
        .state
        .messages
        .upload_attachment(alice.id, "application/x-msdownload", vec![1])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let err = h
        .state
        .messages
        .upload_attachment(alice.id, "image/png", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);

    let uploaded = h
        .state
        .messages
        .upload_attachment(alice.id, "image/jpeg; charset=binary", vec![7; 32])
        .await
        .unwrap();
    assert!(uploaded.path.starts_with(&format!("{}/2024/05/01/", alice.id)));
    assert!(uploaded.path.ends_with(".jpg"));
    assert_eq!(uploaded.url, format!("memory://dm-attachments/{}", uploaded.path));
}

#[tokio::test]
async fn test_message_rate_limit() {
    let h = Harness::with_limits(LimitsConfig {
        messages_per_minute: 2,
        ..LimitsConfig::default()
    });
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");

    let first = h.state.messages.send_to_user(alice.id, bob.id, "1", vec![]).await.unwrap();
    h.state
        .messages
        .create(alice.id, first.conversation_id, "2", vec![])
        .await
        .unwrap();
    let err = h
        .state
        .messages
        .create(alice.id, first.conversation_id, "3", vec![])
        .await
        .unwrap_err();
    match err {
        AppError::RateLimited { retry_after_secs } => assert!(retry_after_secs >= 1),
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(h.audit.events().len(), 1);

    h.clock.advance(Duration::seconds(60));
    h.state
        .messages
        .create(alice.id, first.conversation_id, "4", vec![])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_conversation_creation_rate_limit() {
    let h = Harness::with_limits(LimitsConfig {
        conversations_per_day: 1,
        ..LimitsConfig::default()
    });
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let carol = h.add_user("carol");

    h.state.conversations.get_or_create(alice.id, bob.id).await.unwrap();
    // Reusing an existing pair does not count against the creation quota.
    h.state.conversations.get_or_create(alice.id, bob.id).await.unwrap();
    let err = h.state.conversations.get_or_create(alice.id, carol.id).await.unwrap_err();
    assert_eq!(err.status_code(), 429);
}

#[tokio::test]
async fn test_history_paging_and_archive() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");

    let first = h.state.messages.send_to_user(alice.id, bob.id, "m0", vec![]).await.unwrap();
    let conversation_id = first.conversation_id;
    for i in 1..5 {
        h.clock.advance(Duration::seconds(1));
        h.state
            .messages
            .create(alice.id, conversation_id, &format!("m{i}"), vec![])
            .await
            .unwrap();
    }

    let page = h.state.messages.list(bob.id, conversation_id, None, 2).await.unwrap();
    assert_eq!(
        page.iter().map(|m| m.body_text.as_str()).collect::<Vec<_>>(),
        vec!["m4", "m3"]
    );
    let older = h
        .state
        .messages
        .list(bob.id, conversation_id, Some(page[1].created_at), 10)
        .await
        .unwrap();
    assert_eq!(older.len(), 3);
    assert_eq!(older[0].body_text, "m2");

    let listed = h.state.conversations.list(bob.id, false, 20, 0).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].unread_count, 5);
    assert_eq!(listed[0].last_message_preview.as_deref(), Some("m4"));
    assert_eq!(listed[0].counterpart.as_ref().map(|p| p.id), Some(alice.id));

    h.state.conversations.archive(bob.id, conversation_id, true).await.unwrap();
    assert!(h.state.conversations.list(bob.id, false, 20, 0).await.unwrap().is_empty());
    assert_eq!(h.state.conversations.list(bob.id, true, 20, 0).await.unwrap().len(), 1);
    assert_eq!(h.state.conversations.unread_count(bob.id).await.unwrap(), 0);

}

#[tokio::test]
async fn test_archived_participant_must_unarchive_to_read() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let first = h.state.messages.send_to_user(alice.id, bob.id, "hi", vec![]).await.unwrap();
    let conversation_id = first.conversation_id;

    h.state.conversations.archive(bob.id, conversation_id, true).await.unwrap();
    assert!(!h.state.access.can_participate(bob.id, conversation_id).await.unwrap());
    assert!(h.state.access.can_participate(alice.id, conversation_id).await.unwrap());

    for err in [
        h.state.messages.list(bob.id, conversation_id, None, 10).await.unwrap_err(),
        h.state.messages.create(bob.id, conversation_id, "back", vec![]).await.unwrap_err(),
        h.state.conversations.mark_read(bob.id, conversation_id).await.map(|_| ()).unwrap_err(),
        h.state.conversations.get(bob.id, conversation_id).await.map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(err, AppError::NotFound), "{err:?}");
    }

    // The other side keeps posting into the thread.
    h.state.messages.create(alice.id, conversation_id, "still here?", vec![]).await.unwrap();

    let participant = h.state.conversations.archive(bob.id, conversation_id, false).await.unwrap();
    assert!(participant.archived_at.is_none());
    assert_eq!(h.state.messages.list(bob.id, conversation_id, None, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_sending_again_reopens_archived_thread_for_sender() {
    let h = Harness::new();
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let first = h.state.messages.send_to_user(alice.id, bob.id, "hi", vec![]).await.unwrap();

    h.state.conversations.archive(alice.id, first.conversation_id, true).await.unwrap();
    h.state.conversations.archive(bob.id, first.conversation_id, true).await.unwrap();

    let again = h.state.messages.send_to_user(alice.id, bob.id, "me again", vec![]).await.unwrap();
    assert_eq!(again.conversation_id, first.conversation_id);
    assert!(h.state.access.can_participate(alice.id, first.conversation_id).await.unwrap());
    assert!(!h.state.access.can_participate(bob.id, first.conversation_id).await.unwrap());
}
