mod common;

use common::Harness;
use dm_service::audit::AuditEvent;
use dm_service::config::LimitsConfig;
use dm_service::models::{DmPrivacy, Message, ReportReason, ReportStatus, UserProfile, UserRole};
use dm_service::AppError;

struct Setup {
    h: Harness,
    alice: UserProfile,
    bob: UserProfile,
    moderator: UserProfile,
    admin: UserProfile,
    message: Message,
}

async fn setup_with(limits: LimitsConfig) -> Setup {
    let h = Harness::with_limits(limits);
    let alice = h.add_user("alice");
    let bob = h.add_user("bob");
    let moderator = h.add_user_with("mod", UserRole::Moderator, DmPrivacy::Everyone, true);
    let admin = h.add_user_with("admin", UserRole::Admin, DmPrivacy::Everyone, true);
    let message = h
        .state
        .messages
        .send_to_user(alice.id, bob.id, "something rude", vec![])
        .await
        .unwrap();
    Setup {
        h,
        alice,
        bob,
        moderator,
        admin,
        message,
    }
}

async fn setup() -> Setup {
    setup_with(LimitsConfig::default()).await
}

#[tokio::test]
async fn test_report_dedup_returns_same_report() {
    let s = setup().await;
    let moderation = &s.h.state.moderation;

    let (first, created) = moderation
        .submit_report(s.bob.id, s.message.conversation_id, s.message.id, ReportReason::Harassment, None)
        .await
        .unwrap();
    assert!(created);
    let (second, created) = moderation
        .submit_report(
            s.bob.id,
            s.message.conversation_id,
            s.message.id,
            ReportReason::Spam,
            Some("again".into()),
        )
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(first.id, second.id);
    assert_eq!(s.h.store.report_count().unwrap(), 1);
}

#[tokio::test]
async fn test_report_requires_participant_and_matching_message() {
    let s = setup().await;
    let eve = s.h.add_user("eve");
    let moderation = &s.h.state.moderation;

    let err = moderation
        .submit_report(eve.id, s.message.conversation_id, s.message.id, ReportReason::Spam, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);

    let other = s
        .h
        .state
        .messages
        .send_to_user(s.bob.id, eve.id, "unrelated", vec![])
        .await
        .unwrap();
    let err = moderation
        .submit_report(s.bob.id, s.message.conversation_id, other.id, ReportReason::Spam, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_delete_lock_holds_until_dismissed() {
    let s = setup().await;
    let state = &s.h.state;

    let (report, _) = state
        .moderation
        .submit_report(s.bob.id, s.message.conversation_id, s.message.id, ReportReason::Hate, None)
        .await
        .unwrap();

    let err = state.messages.delete(s.alice.id, s.message.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    // The lock applies to anyone, before the sender check.
    let err = state.messages.delete(s.bob.id, s.message.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let resolved = state
        .moderation
        .update_status(&s.moderator, report.id, ReportStatus::Resolved, Some("warned".into()))
        .await
        .unwrap();
    assert!(resolved.resolved_at.is_some());
    assert_eq!(resolved.assignee_id, Some(s.moderator.id));
    let err = state.messages.delete(s.alice.id, s.message.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    state
        .moderation
        .update_status(&s.moderator, report.id, ReportStatus::Dismissed, None)
        .await
        .unwrap();
    let err = state.messages.delete(s.bob.id, s.message.id).await.unwrap_err();
    assert_eq!(err.status_code(), 403);
    state.messages.delete(s.alice.id, s.message.id).await.unwrap();

    let kept = state.moderation.list_mine(s.bob.id, 10, 0).await.unwrap();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].message_id, None);
}

#[tokio::test]
async fn test_status_transitions() {
    let s = setup().await;
    let moderation = &s.h.state.moderation;
    let (report, _) = moderation
        .submit_report(s.bob.id, s.message.conversation_id, s.message.id, ReportReason::Other, None)
        .await
        .unwrap();

    let assigned = moderation
        .update_status(&s.moderator, report.id, ReportStatus::Open, Some("looking".into()))
        .await
        .unwrap();
    assert_eq!(assigned.status, ReportStatus::Open);
    assert_eq!(assigned.resolved_at, None);
    assert_eq!(assigned.resolution_note.as_deref(), Some("looking"));

    moderation
        .update_status(&s.moderator, report.id, ReportStatus::Dismissed, None)
        .await
        .unwrap();
    let err = moderation
        .update_status(&s.moderator, report.id, ReportStatus::Resolved, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 409);

    let reviewed: Vec<_> = s
        .h
        .audit
        .events()
        .into_iter()
        .filter(|e| matches!(e, AuditEvent::ReportReviewed { .. }))
        .collect();
    assert_eq!(reviewed.len(), 2);
}

#[tokio::test]
async fn test_review_requires_privilege() {
    let s = setup().await;
    let moderation = &s.h.state.moderation;
    let (report, _) = moderation
        .submit_report(s.bob.id, s.message.conversation_id, s.message.id, ReportReason::Spam, None)
        .await
        .unwrap();

    let err = moderation
        .review_queue(&s.alice, ReportStatus::Open, 50, 0)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);
    let err = moderation
        .update_status(&s.bob, report.id, ReportStatus::Dismissed, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 403);

    let queue = moderation
        .review_queue(&s.moderator, ReportStatus::Open, 50, 0)
        .await
        .unwrap();
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_context_fetch_is_admin_only_and_audited() {
    let s = setup().await;
    let moderation = &s.h.state.moderation;
    let (report, _) = moderation
        .submit_report(s.bob.id, s.message.conversation_id, s.message.id, ReportReason::Violence, None)
        .await
        .unwrap();

    let err = moderation.context_fetch(&s.moderator, report.id).await.unwrap_err();
    assert_eq!(err.status_code(), 403);

    let context = moderation.context_fetch(&s.admin, report.id).await.unwrap();
    assert_eq!(context.conversation.id, s.message.conversation_id);
    assert_eq!(context.messages.len(), 1);
    assert_eq!(context.participants.len(), 2);

    assert!(s.h.audit.events().iter().any(|e| matches!(
        e,
        AuditEvent::ReportContextViewed { admin_id, .. } if *admin_id == s.admin.id
    )));
}

#[tokio::test]
async fn test_report_rate_limit() {
    let s = setup_with(LimitsConfig {
        reports_per_hour: 1,
        ..LimitsConfig::default()
    })
    .await;
    let moderation = &s.h.state.moderation;

    moderation
        .submit_report(s.bob.id, s.message.conversation_id, s.message.id, ReportReason::Spam, None)
        .await
        .unwrap();
    let err = moderation
        .submit_report(s.bob.id, s.message.conversation_id, s.message.id, ReportReason::Spam, None)
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 429);
}
