#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use dm_service::audit::MemoryAuditSink;
use dm_service::clock::ManualClock;
use dm_service::config::{Config, LimitsConfig};
use dm_service::db::{MemoryStore, Repositories};
use dm_service::middleware::auth::Claims;
use dm_service::models::{AccountStatus, DmPrivacy, UserProfile, UserRole};
use dm_service::notifications::MemoryNotificationSink;
use dm_service::storage::MemoryObjectStorage;
use dm_service::{AppState, Collaborators};
use jsonwebtoken::{encode, EncodingKey, Header};
use rate_limiter::{EdgeLimiter, MemoryCounterStore, PersistentLimiter};
use std::sync::Arc;
use uuid::Uuid;

/// Service graph over in-memory collaborators with a manual clock.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub storage: Arc<MemoryObjectStorage>,
    pub notifications: Arc<MemoryNotificationSink>,
    pub audit: Arc<MemoryAuditSink>,
    pub clock: Arc<ManualClock>,
    pub edge_limiter: Arc<EdgeLimiter>,
    pub state: AppState,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limits(LimitsConfig::default())
    }

    pub fn with_limits(limits: LimitsConfig) -> Self {
        Self::with_collaborators(limits, |_| {})
    }

    /// Like [`Harness::with_limits`], with a hook to swap collaborators before the
    /// services are built. The public handles still point at the in-memory originals.
    pub fn with_collaborators(limits: LimitsConfig, tweak: impl FnOnce(&mut Collaborators)) -> Self {
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let notifications = Arc::new(MemoryNotificationSink::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ));
        let edge_limiter = Arc::new(EdgeLimiter::new());

        let config = Config {
            limits,
            ..Config::for_tests()
        };
        let mut deps = Collaborators {
            repos: Repositories::memory(store.clone()),
            persistent_limiter: Arc::new(PersistentLimiter::new(MemoryCounterStore::new())),
            edge_limiter: edge_limiter.clone(),
            storage: storage.clone(),
            notifications: notifications.clone(),
            audit: audit.clone(),
            clock: clock.clone(),
        };
        tweak(&mut deps);
        let state = AppState::new(config, deps);

        Self {
            store,
            storage,
            notifications,
            audit,
            clock,
            edge_limiter,
            state,
        }
    }

    pub fn add_user(&self, name: &str) -> UserProfile {
        self.add_user_with(name, UserRole::User, DmPrivacy::Everyone, false)
    }

    pub fn add_user_with(
        &self,
        name: &str,
        role: UserRole,
        dm_privacy: DmPrivacy,
        is_verified: bool,
    ) -> UserProfile {
        let profile = UserProfile {
            id: Uuid::new_v4(),
            username: name.to_string(),
            display_name: None,
            avatar_url: None,
            role,
            account_status: AccountStatus::Active,
            is_verified,
            dm_privacy,
        };
        self.store.upsert_user(profile.clone()).unwrap();
        profile
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.state.config.jwt_secret.as_bytes()),
        )
        .unwrap()
    }
}
