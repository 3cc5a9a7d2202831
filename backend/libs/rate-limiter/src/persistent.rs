use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::StoreError;
use crate::window::{evaluate, RateDecision, WindowCounter};
use crate::RateLimiter;

/// Durable storage for window counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<WindowCounter>, StoreError>;
    async fn save(&self, key: &str, counter: WindowCounter) -> Result<(), StoreError>;
}

/// Row-backed limiter. Reads the counter, evaluates, then upserts.
pub struct PersistentLimiter<S> {
    store: S,
    store_timeout: Duration,
}

impl<S: CounterStore> PersistentLimiter<S> {
    pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(250);

    pub fn new(store: S) -> Self {
        Self {
            store,
            store_timeout: Self::DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_timeout(store: S, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[async_trait]
impl<S: CounterStore> RateLimiter for PersistentLimiter<S> {
    async fn consume(&self, key: &str, limit: u32, window_ms: i64, now_ms: i64) -> RateDecision {
        let current = match timeout(self.store_timeout, self.store.load(key)).await {
            Ok(Ok(current)) => current,
            Ok(Err(e)) => {
                tracing::warn!(key, error = %e, "Rate limit store read failed (allowing request)");
                return RateDecision::allow();
            }
            Err(_) => {
                tracing::warn!(
                    key,
                    timeout_ms = self.store_timeout.as_millis() as u64,
                    "Rate limit store read timed out (allowing request)"
                );
                return RateDecision::allow();
            }
        };

        let (decision, next) = evaluate(current, limit, window_ms, now_ms);

        if let Some(next) = next {
            match timeout(self.store_timeout, self.store.save(key, next)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(key, error = %e, "Rate limit store write failed");
                }
                Err(_) => {
                    tracing::warn!(key, "Rate limit store write timed out");
                }
            }
        }

        decision
    }
}

/// Counter store kept in process memory. Used for tests and single-node development.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    rows: Mutex<HashMap<String, WindowCounter>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn load(&self, key: &str) -> Result<Option<WindowCounter>, StoreError> {
        let rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Unavailable("counter map poisoned".into()))?;
        Ok(rows.get(key).copied())
    }

    async fn save(&self, key: &str, counter: WindowCounter) -> Result<(), StoreError> {
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StoreError::Unavailable("counter map poisoned".into()))?;
        rows.insert(key.to_owned(), counter);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnreachableStore;

    #[async_trait]
    impl CounterStore for UnreachableStore {
        async fn load(&self, _key: &str) -> Result<Option<WindowCounter>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn save(&self, _key: &str, _counter: WindowCounter) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl CounterStore for SlowStore {
        async fn load(&self, _key: &str) -> Result<Option<WindowCounter>, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some(WindowCounter {
                window_start_ms: 0,
                count: u32::MAX,
            }))
        }

        async fn save(&self, _key: &str, _counter: WindowCounter) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn fails_open_when_store_is_unreachable() {
        let limiter = PersistentLimiter::new(UnreachableStore);
        for _ in 0..5 {
            assert!(limiter.consume("k", 1, 60_000, 0).await.allowed);
        }
    }

    #[tokio::test]
    async fn fails_open_when_store_is_slow() {
        let limiter = PersistentLimiter::with_timeout(SlowStore, Duration::from_millis(10));
        assert!(limiter.consume("k", 1, 60_000, 0).await.allowed);
    }

    #[tokio::test]
    async fn denial_does_not_rewrite_counter() {
        let limiter = PersistentLimiter::new(MemoryCounterStore::new());
        limiter.consume("k", 1, 60_000, 0).await;
        let denied = limiter.consume("k", 1, 60_000, 30_000).await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_seconds, 30);

        let stored = limiter.store().load("k").await.unwrap();
        assert_eq!(
            stored,
            Some(WindowCounter {
                window_start_ms: 0,
                count: 1
            })
        );
    }
}
