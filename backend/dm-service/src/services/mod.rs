pub mod access_control;
pub mod conversation_service;
pub mod message_service;
pub mod moderation_service;
pub mod rate_limit;
pub mod relationship_service;
pub mod sanitize;

pub use access_control::{AccessControl, InitiateDecision};
pub use conversation_service::ConversationService;
pub use message_service::MessageService;
pub use moderation_service::{ModerationService, ReportContext};
pub use rate_limit::RateLimitGuard;
pub use relationship_service::RelationshipService;
