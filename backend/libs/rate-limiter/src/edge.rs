use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::window::{evaluate, RateDecision, WindowCounter};
use crate::RateLimiter;

/// In-process counters for the edge tier.
///
/// Each instance only sees its own traffic, so a fleet of N workers admits up to
/// N times the configured limit.
#[derive(Debug, Default)]
pub struct EdgeLimiter {
    counters: DashMap<String, WindowCounter>,
}

impl EdgeLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous core of [`RateLimiter::consume`]; the shard lock makes it atomic per key.
    pub fn check(&self, key: &str, limit: u32, window_ms: i64, now_ms: i64) -> RateDecision {
        match self.counters.entry(key.to_owned()) {
            Entry::Occupied(mut slot) => {
                let (decision, next) = evaluate(Some(*slot.get()), limit, window_ms, now_ms);
                if let Some(next) = next {
                    *slot.get_mut() = next;
                }
                decision
            }
            Entry::Vacant(slot) => {
                let (decision, next) = evaluate(None, limit, window_ms, now_ms);
                if let Some(next) = next {
                    slot.insert(next);
                }
                decision
            }
        }
    }

    /// Drop counters whose window started more than `max_window_ms` ago.
    pub fn sweep(&self, max_window_ms: i64, now_ms: i64) -> usize {
        let before = self.counters.len();
        self.counters
            .retain(|_, counter| now_ms - counter.window_start_ms < max_window_ms);
        let removed = before.saturating_sub(self.counters.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.counters.len(), "Edge limiter sweep");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl RateLimiter for EdgeLimiter {
    async fn consume(&self, key: &str, limit: u32, window_ms: i64, now_ms: i64) -> RateDecision {
        self.check(key, limit, window_ms, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn keys_are_independent() {
        let limiter = EdgeLimiter::new();
        assert!(limiter.check("a", 1, 1_000, 0).allowed);
        assert!(!limiter.check("a", 1, 1_000, 1).allowed);
        assert!(limiter.check("b", 1, 1_000, 1).allowed);
    }

    #[test]
    fn sweep_removes_stale_windows() {
        let limiter = EdgeLimiter::new();
        limiter.check("old", 5, 1_000, 0);
        limiter.check("fresh", 5, 1_000, 5_000);
        assert_eq!(limiter.sweep(1_000, 5_500), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[test]
    fn concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(EdgeLimiter::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|_| limiter.check("burst", 100, 60_000, 0).allowed)
                        .count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }
}
