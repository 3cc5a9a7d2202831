use rate_limiter::{RateLimitRule, RateLimiter};
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::error::{AppError, AppResult};

pub const MESSAGE_SEND_ROUTE: &str = "/api/v1/messages";
pub const CONVERSATION_CREATE_ROUTE: &str = "/api/v1/conversations";
pub const REPORT_SUBMIT_ROUTE: &str = "/api/v1/reports";

/// Persistent per-user limits in front of mutating operations.
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<dyn RateLimiter>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

pub fn limit_key(scope: &str, identifier: &str, method: &str, endpoint: &str) -> String {
    format!("{scope}:{identifier}:{method}:{endpoint}")
}

impl RateLimitGuard {
    pub fn new(
        limiter: Arc<dyn RateLimiter>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            audit,
            clock,
        }
    }

    pub async fn check(
        &self,
        scope: &str,
        identifier: &str,
        method: &str,
        endpoint: &str,
        rule: RateLimitRule,
    ) -> AppResult<()> {
        let key = limit_key(scope, identifier, method, endpoint);
        let decision = self
            .limiter
            .consume_rule(&key, rule, self.clock.now_ms())
            .await;

        if decision.allowed {
            return Ok(());
        }

        self.audit.record(AuditEvent::RateLimited {
            scope: scope.to_owned(),
            identifier: identifier.to_owned(),
            endpoint: endpoint.to_owned(),
            method: method.to_owned(),
            retry_after: decision.retry_after_seconds,
        });
        Err(AppError::RateLimited {
            retry_after_secs: decision.retry_after_seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use rate_limiter::EdgeLimiter;

    #[tokio::test]
    async fn denial_is_audited_and_mapped() {
        let audit = Arc::new(MemoryAuditSink::new());
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let guard = RateLimitGuard::new(Arc::new(EdgeLimiter::new()), audit.clone(), clock);
        let rule = RateLimitRule::per_minute(1);

        guard
            .check("user", "u1", "POST", MESSAGE_SEND_ROUTE, rule)
            .await
            .unwrap();
        let err = guard
            .check("user", "u1", "POST", MESSAGE_SEND_ROUTE, rule)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimited { retry_after_secs: 60 }));
        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            AuditEvent::RateLimited {
                scope: "user".into(),
                identifier: "u1".into(),
                endpoint: MESSAGE_SEND_ROUTE.into(),
                method: "POST".into(),
                retry_after: 60,
            }
        );
    }

    #[test]
    fn key_layout() {
        assert_eq!(
            limit_key("user", "abc", "POST", "/api/v1/messages"),
            "user:abc:POST:/api/v1/messages"
        );
    }
}
