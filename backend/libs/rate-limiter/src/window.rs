use serde::{Deserialize, Serialize};

/// Result of a single `consume` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateDecision {
    pub allowed: bool,
    /// Seconds until the current window closes. Zero when allowed.
    pub retry_after_seconds: u64,
}

impl RateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            retry_after_seconds: 0,
        }
    }

    pub fn deny(retry_after_seconds: u64) -> Self {
        Self {
            allowed: false,
            retry_after_seconds: retry_after_seconds.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounter {
    pub window_start_ms: i64,
    pub count: u32,
}

/// A limit expressed as `limit` requests per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitRule {
    pub limit: u32,
    pub window_ms: i64,
}

impl RateLimitRule {
    pub const MINUTE_MS: i64 = 60_000;
    pub const HOUR_MS: i64 = 60 * Self::MINUTE_MS;
    pub const DAY_MS: i64 = 24 * Self::HOUR_MS;

    pub fn per_minute(limit: u32) -> Self {
        Self {
            limit,
            window_ms: Self::MINUTE_MS,
        }
    }

    pub fn per_hour(limit: u32) -> Self {
        Self {
            limit,
            window_ms: Self::HOUR_MS,
        }
    }

    pub fn per_day(limit: u32) -> Self {
        Self {
            limit,
            window_ms: Self::DAY_MS,
        }
    }
}

/// Fixed-window evaluation.
///
/// Returns the decision plus the counter to write back. A denial leaves the stored
/// counter untouched, so the second element is `None`.
pub fn evaluate(
    current: Option<WindowCounter>,
    limit: u32,
    window_ms: i64,
    now_ms: i64,
) -> (RateDecision, Option<WindowCounter>) {
    match current {
        Some(counter) if now_ms - counter.window_start_ms < window_ms => {
            if counter.count < limit {
                let next = WindowCounter {
                    count: counter.count + 1,
                    ..counter
                };
                (RateDecision::allow(), Some(next))
            } else {
                let remaining_ms = counter.window_start_ms + window_ms - now_ms;
                (RateDecision::deny(ceil_seconds(remaining_ms)), None)
            }
        }
        _ => (
            RateDecision::allow(),
            Some(WindowCounter {
                window_start_ms: now_ms,
                count: 1,
            }),
        ),
    }
}

fn ceil_seconds(ms: i64) -> u64 {
    if ms <= 0 {
        return 1;
    }
    ((ms + 999) / 1000) as u64
}
