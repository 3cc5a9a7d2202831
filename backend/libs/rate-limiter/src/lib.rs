//! Fixed-window request counters.
//!
//! Two backends share one algorithm ([`window::evaluate`]) and one interface
//! ([`RateLimiter::consume`]):
//!
//! - [`EdgeLimiter`]: process-local map. Best effort, reset on restart and scoped to
//!   a single instance.
//! - [`PersistentLimiter`]: read-evaluate-upsert against a [`CounterStore`]. Not
//!   atomic under concurrent requests for one key, and fails open when the store is
//!   unreachable or slow.

pub mod edge;
pub mod error;
pub mod persistent;
pub mod postgres;
pub mod window;

use async_trait::async_trait;

pub use edge::EdgeLimiter;
pub use error::StoreError;
pub use persistent::{CounterStore, MemoryCounterStore, PersistentLimiter};
pub use postgres::PgCounterStore;
pub use window::{evaluate, RateDecision, RateLimitRule, WindowCounter};

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request against `key` and report whether it may proceed.
    async fn consume(&self, key: &str, limit: u32, window_ms: i64, now_ms: i64) -> RateDecision;

    async fn consume_rule(&self, key: &str, rule: RateLimitRule, now_ms: i64) -> RateDecision {
        self.consume(key, rule.limit, rule.window_ms, now_ms).await
    }
}
