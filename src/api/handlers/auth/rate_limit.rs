//! Per-client rate control.
//!
//! Two fixed windows guard the service: a wide global window over all
//! routes and a narrow window over credential endpoints. A third counter
//! drives progressive slowdown, adding a growing delay once a client
//! passes a threshold instead of rejecting outright.

use std::{
    collections::HashMap,
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::Mutex,
    time::{Duration, Instant},
};

const SHARD_COUNT: usize = 16;

/// Counter shards grow with distinct clients; purge stale windows past
/// this size.
const PURGE_THRESHOLD: usize = 4096;

/// Which window a request counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    /// Every request against the service.
    Global,
    /// Credential endpoints only.
    Auth,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited { retry_after_seconds: u64 },
}

/// Admission control seam for the HTTP layer.
pub trait RateLimiter: Send + Sync {
    /// Count a request against a scope and decide whether to admit it.
    fn check(&self, client: Option<&str>, scope: RateLimitScope) -> RateLimitDecision;

    /// Progressive slowdown delay to apply before handling the request.
    fn throttle_delay(&self, client: Option<&str>) -> Duration;
}

/// Limiter that admits everything. Used in tests.
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _client: Option<&str>, _scope: RateLimitScope) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn throttle_delay(&self, _client: Option<&str>) -> Duration {
        Duration::ZERO
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub global_window: Duration,
    pub global_max: u32,
    pub auth_window: Duration,
    pub auth_max: u32,
    /// Requests in the global window before slowdown starts.
    pub throttle_after: u32,
    /// Added delay per request past the threshold.
    pub throttle_step: Duration,
    /// Upper bound on the slowdown delay.
    pub throttle_cap: Duration,
}

struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window counters keyed by client, sharded to spread lock
/// contention.
struct ShardedCounters {
    shards: Vec<Mutex<HashMap<String, Window>>>,
}

impl ShardedCounters {
    fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT)
                .map(|_| Mutex::new(HashMap::new()))
                .collect(),
        }
    }

    /// Count a hit for `key`, returning the hit count within the current
    /// window and the time until the window resets.
    fn hit(&self, key: &str, window: Duration, now: Instant) -> (u32, Duration) {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % SHARD_COUNT;

        // A poisoned shard only loses counters for its keys; recover the
        // map rather than failing admission for everyone.
        let mut shard = match self.shards[index].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if shard.len() > PURGE_THRESHOLD {
            shard.retain(|_, entry| now.duration_since(entry.started) < window);
        }

        let entry = shard.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let elapsed = now.duration_since(entry.started);
        if elapsed >= window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);
        let remaining = window.saturating_sub(now.duration_since(entry.started));
        (entry.count, remaining)
    }
}

/// In-process limiter with fixed windows per client.
pub struct WindowedLimiter {
    settings: RateLimitSettings,
    global: ShardedCounters,
    auth: ShardedCounters,
    throttle: ShardedCounters,
}

impl WindowedLimiter {
    #[must_use]
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            settings,
            global: ShardedCounters::new(),
            auth: ShardedCounters::new(),
            throttle: ShardedCounters::new(),
        }
    }

    fn check_at(
        &self,
        client: Option<&str>,
        scope: RateLimitScope,
        now: Instant,
    ) -> RateLimitDecision {
        // Requests without a client identity cannot be counted fairly.
        let Some(client) = client else {
            return RateLimitDecision::Allowed;
        };
        let (counters, window, max) = match scope {
            RateLimitScope::Global => (
                &self.global,
                self.settings.global_window,
                self.settings.global_max,
            ),
            RateLimitScope::Auth => (
                &self.auth,
                self.settings.auth_window,
                self.settings.auth_max,
            ),
        };
        let (count, remaining) = counters.hit(client, window, now);
        if count > max {
            RateLimitDecision::Limited {
                retry_after_seconds: remaining.as_secs().max(1),
            }
        } else {
            RateLimitDecision::Allowed
        }
    }

    fn throttle_delay_at(&self, client: Option<&str>, now: Instant) -> Duration {
        let Some(client) = client else {
            return Duration::ZERO;
        };
        let (count, _) = self
            .throttle
            .hit(client, self.settings.global_window, now);
        let excess = count.saturating_sub(self.settings.throttle_after);
        if excess == 0 {
            return Duration::ZERO;
        }
        self.settings
            .throttle_step
            .saturating_mul(excess)
            .min(self.settings.throttle_cap)
    }
}

impl RateLimiter for WindowedLimiter {
    fn check(&self, client: Option<&str>, scope: RateLimitScope) -> RateLimitDecision {
        self.check_at(client, scope, Instant::now())
    }

    fn throttle_delay(&self, client: Option<&str>) -> Duration {
        self.throttle_delay_at(client, Instant::now())
    }
}
