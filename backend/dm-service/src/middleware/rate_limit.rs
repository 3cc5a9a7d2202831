//! Edge rate limiting in front of every route.
//!
//! Counts live in the process-local [`EdgeLimiter`], keyed by caller and route
//! pattern. Denials short-circuit with the standard 429 envelope.

use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use rate_limiter::{EdgeLimiter, RateLimitRule};
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditSink};
use crate::clock::Clock;
use crate::error::AppError;
use crate::middleware::auth::{bearer_token, SessionResolver};
use crate::middleware::error_handling;
use crate::services::rate_limit::limit_key;

#[derive(Clone)]
pub struct EdgeRateLimit {
    limiter: Arc<EdgeLimiter>,
    sessions: Arc<dyn SessionResolver>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    rule: RateLimitRule,
}

impl EdgeRateLimit {
    pub fn new(
        limiter: Arc<EdgeLimiter>,
        sessions: Arc<dyn SessionResolver>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
        rule: RateLimitRule,
    ) -> Self {
        Self {
            limiter,
            sessions,
            audit,
            clock,
            rule,
        }
    }
}

/// `("user", id)` when the bearer token resolves, else `("ip", addr)`.
pub fn caller_identity(req: &ServiceRequest, sessions: &dyn SessionResolver) -> (&'static str, String) {
    if let Some(user_id) = bearer_token(req.request()).and_then(|t| sessions.resolve(t)) {
        return ("user", user_id.to_string());
    }
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned);
    let ip = forwarded
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string());
    ("ip", ip)
}

impl<S, B> Transform<S, ServiceRequest> for EdgeRateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = EdgeRateLimitService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(EdgeRateLimitService {
            service: Rc::new(service),
            inner: self.clone(),
        }))
    }
}

pub struct EdgeRateLimitService<S> {
    service: Rc<S>,
    inner: EdgeRateLimit,
}

impl<S, B> Service<ServiceRequest> for EdgeRateLimitService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let cfg = &self.inner;

        let (scope, identifier) = caller_identity(&req, cfg.sessions.as_ref());
        let method = req.method().as_str().to_owned();
        let endpoint = req
            .match_pattern()
            .unwrap_or_else(|| req.path().to_owned());
        let key = format!("edge:{}", limit_key(scope, &identifier, &method, &endpoint));

        let decision = cfg.limiter.check(
            &key,
            cfg.rule.limit,
            cfg.rule.window_ms,
            cfg.clock.now_ms(),
        );

        if !decision.allowed {
            cfg.audit.record(AuditEvent::RateLimited {
                scope: format!("edge:{scope}"),
                identifier,
                endpoint,
                method,
                retry_after: decision.retry_after_seconds,
            });
            let response = error_handling::into_response(&AppError::RateLimited {
                retry_after_secs: decision.retry_after_seconds,
            });
            return Box::pin(ready(Ok(req.into_response(response).map_into_right_body())));
        }

        Box::pin(async move {
            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}
