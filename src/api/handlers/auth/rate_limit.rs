//! Fixed-window rate limiting keyed by `<action>:<client>`.
//!
//! Counters live behind the [`CounterStore`] trait. The Redis store is the
//! correct backend once more than one instance serves traffic; the in-process
//! store is a documented, weaker fallback (an attacker spread across
//! instances sees `limit * instances`).

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Per-action budget; different actions have independent budgets for the
/// same client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateBudget {
    pub limit: u64,
    pub window_seconds: u64,
}

#[derive(Clone, Copy, Debug)]
pub enum RateLimitAction {
    Login,
    PasswordEmail,
    PasswordChange,
}

impl RateLimitAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::PasswordEmail => "password_email",
            Self::PasswordChange => "password_change",
        }
    }

    pub(super) fn key(self, client: &str) -> String {
        format!("{}:{client}", self.as_str())
    }
}

/// Atomic increment-with-expiry counter.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return the post-increment count. The first
    /// increment of a window starts the expiry clock.
    async fn increment(&self, key: &str, window_seconds: u64) -> Result<u64>;
}

struct WindowEntry {
    count: u64,
    window_start: Instant,
    window_seconds: u64,
}

/// Expired keys are swept roughly once per this many increments so the
/// table does not grow without bound under distinct-client traffic.
const SWEEP_INTERVAL: u64 = 100;

/// Process-local fixed-window counters.
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, WindowEntry>>,
    ops: AtomicU64,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ops: AtomicU64::new(0),
        }
    }

    /// Increment relative to an explicit `now`, so window behavior is
    /// testable without sleeping.
    pub(super) async fn increment_at(&self, key: &str, window_seconds: u64, now: Instant) -> u64 {
        let mut entries = self.entries.lock().await;

        if self.ops.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == 0 {
            entries.retain(|_, entry| {
                now.duration_since(entry.window_start) < Duration::from_secs(entry.window_seconds)
            });
        }

        let entry = entries.entry(key.to_string()).or_insert(WindowEntry {
            count: 0,
            window_start: now,
            window_seconds,
        });
        if now.duration_since(entry.window_start) >= Duration::from_secs(window_seconds) {
            entry.count = 1;
            entry.window_start = now;
        } else {
            entry.count += 1;
        }
        entry.window_seconds = window_seconds;
        entry.count
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str, window_seconds: u64) -> Result<u64> {
        Ok(self.increment_at(key, window_seconds, Instant::now()).await)
    }
}

/// `INCR` and `EXPIRE` must be one atomic step, otherwise a failure between
/// the two leaves a key that never expires.
const INCREMENT_SCRIPT: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Shared counter store, reachable by all server instances.
pub struct RedisCounterStore {
    client: redis::Client,
}

impl RedisCounterStore {
    /// # Errors
    /// Returns an error if the URL is not a valid redis URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("failed to create redis client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str, window_seconds: u64) -> Result<u64> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to redis")?;

        let expire_seconds = i64::try_from(window_seconds).unwrap_or(i64::MAX);
        let count: u64 = redis::Script::new(INCREMENT_SCRIPT)
            .key(key)
            .arg(expire_seconds)
            .invoke_async(&mut conn)
            .await
            .context("failed to run rate-limit script")?;
        Ok(count)
    }
}

/// Fixed-window limiter over an injected counter store.
pub struct RateLimiter {
    shared: Option<Arc<dyn CounterStore>>,
    local: MemoryCounterStore,
}

impl RateLimiter {
    /// Per-instance counters only.
    #[must_use]
    pub fn in_process() -> Self {
        Self {
            shared: None,
            local: MemoryCounterStore::new(),
        }
    }

    /// Shared counters with in-process fallback.
    #[must_use]
    pub fn with_shared(store: Arc<dyn CounterStore>) -> Self {
        Self {
            shared: Some(store),
            local: MemoryCounterStore::new(),
        }
    }

    /// Increment the counter for `key` and return `true` while the
    /// post-increment count is within `limit`.
    pub async fn check_and_increment(&self, key: &str, limit: u64, window_seconds: u64) -> bool {
        if let Some(shared) = &self.shared {
            match shared.increment(key, window_seconds).await {
                Ok(count) => return count <= limit,
                Err(err) => {
                    // Per-instance limits are weaker but better than failing
                    // closed for every legitimate client.
                    warn!("Shared counter store unavailable, using in-process limits: {err}");
                }
            }
        }
        self.local
            .increment_at(key, window_seconds, Instant::now())
            .await
            <= limit
    }
}
