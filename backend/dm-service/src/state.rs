use rate_limiter::{EdgeLimiter, RateLimiter};
use std::sync::Arc;

use crate::audit::AuditSink;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::Repositories;
use crate::middleware::auth::{JwtSessionResolver, SessionResolver};
use crate::middleware::EdgeRateLimit;
use crate::notifications::{NotificationSink, Notifier};
use crate::services::{
    AccessControl, ConversationService, MessageService, ModerationService, RateLimitGuard,
    RelationshipService,
};
use crate::storage::ObjectStorage;

/// External handles the managers are built from. Production wires Postgres, S3 and
/// Redis; tests wire the in-memory variants.
#[derive(Clone)]
pub struct Collaborators {
    pub repos: Repositories,
    pub persistent_limiter: Arc<dyn RateLimiter>,
    pub edge_limiter: Arc<EdgeLimiter>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifications: Arc<dyn NotificationSink>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub sessions: Arc<dyn SessionResolver>,
    pub access: AccessControl,
    pub conversations: ConversationService,
    pub messages: MessageService,
    pub moderation: ModerationService,
    pub relationships: RelationshipService,
    pub edge_limiter: Arc<EdgeLimiter>,
    pub audit: Arc<dyn AuditSink>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config, deps: Collaborators) -> Self {
        let limits = config.limits.clone();
        let access = AccessControl::new(deps.repos.clone());
        let guard = RateLimitGuard::new(
            deps.persistent_limiter.clone(),
            deps.audit.clone(),
            deps.clock.clone(),
        );
        let conversations = ConversationService::new(
            deps.repos.clone(),
            access.clone(),
            guard.clone(),
            deps.clock.clone(),
            limits.clone(),
        );
        let messages = MessageService::new(
            deps.repos.clone(),
            access.clone(),
            conversations.clone(),
            guard.clone(),
            deps.storage.clone(),
            Notifier::new(deps.notifications.clone()),
            deps.clock.clone(),
            limits.clone(),
            config.s3.bucket.clone(),
        );
        let moderation = ModerationService::new(
            deps.repos.clone(),
            access.clone(),
            guard,
            deps.audit.clone(),
            deps.clock.clone(),
            limits,
        );
        let relationships = RelationshipService::new(deps.repos.clone(), deps.clock.clone());

        Self {
            sessions: Arc::new(JwtSessionResolver::new(&config.jwt_secret)),
            config: Arc::new(config),
            repos: deps.repos,
            access,
            conversations,
            messages,
            moderation,
            relationships,
            edge_limiter: deps.edge_limiter,
            audit: deps.audit,
            clock: deps.clock,
        }
    }

    pub fn edge_rate_limit(&self) -> EdgeRateLimit {
        EdgeRateLimit::new(
            self.edge_limiter.clone(),
            self.sessions.clone(),
            self.audit.clone(),
            self.clock.clone(),
            self.config.limits.edge_rule(),
        )
    }
}
