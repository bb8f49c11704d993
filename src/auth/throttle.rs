//! Login throttling
//!
//! Counts login attempts per client key inside a sliding window. Once a key has
//! used up its attempts it stays blocked until `window` has passed since its last
//! counted attempt, after which it starts fresh.
//!
//! State lives behind [`AttemptStore`] so the in-memory map can be swapped for a
//! shared store when several instances sit behind one load balancer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Limits applied by the throttle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(15 * 60),
        }
    }
}

/// Outcome of registering an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed { remaining: u32 },
    Blocked { retry_after: Duration },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed { .. })
    }
}

/// Observable state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
    Fresh,
    Counting { count: u32 },
    Blocked { retry_after: Duration },
}

/// Attempt counter for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub last_attempt: Instant,
}

impl RateLimitEntry {
    /// Whether the window has fully elapsed since the last counted attempt
    pub fn is_stale(&self, window: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_attempt) > window
    }

    fn retry_after(&self, window: Duration, now: Instant) -> Duration {
        window.saturating_sub(now.saturating_duration_since(self.last_attempt))
    }

    /// Apply one attempt at `now` to `entry`
    ///
    /// Pure transition shared by every store. A blocked attempt leaves the entry
    /// untouched so the block lifts `window` after the last allowed attempt.
    pub fn register(
        entry: Option<RateLimitEntry>,
        policy: &ThrottlePolicy,
        now: Instant,
    ) -> (RateLimitEntry, ThrottleDecision) {
        match entry {
            Some(entry) if !entry.is_stale(policy.window, now) => {
                if entry.count >= policy.max_attempts {
                    let retry_after = entry.retry_after(policy.window, now);
                    (entry, ThrottleDecision::Blocked { retry_after })
                } else {
                    let next = RateLimitEntry {
                        count: entry.count + 1,
                        last_attempt: now,
                    };
                    let remaining = policy.max_attempts - next.count;
                    (next, ThrottleDecision::Allowed { remaining })
                }
            }
            _ => {
                let next = RateLimitEntry {
                    count: 1,
                    last_attempt: now,
                };
                let remaining = policy.max_attempts.saturating_sub(1);
                (next, ThrottleDecision::Allowed { remaining })
            }
        }
    }

    fn state(&self, policy: &ThrottlePolicy, now: Instant) -> ThrottleState {
        if self.is_stale(policy.window, now) {
            ThrottleState::Fresh
        } else if self.count >= policy.max_attempts {
            ThrottleState::Blocked {
                retry_after: self.retry_after(policy.window, now),
            }
        } else {
            ThrottleState::Counting { count: self.count }
        }
    }
}

/// Backing store for attempt counters
#[async_trait]
pub trait AttemptStore: Send + Sync {
    /// Register an attempt for `key`; the read-modify-write must be atomic
    async fn register(&self, key: &str, policy: &ThrottlePolicy, now: Instant)
        -> ThrottleDecision;

    async fn get(&self, key: &str) -> Option<RateLimitEntry>;

    async fn clear(&self, key: &str);

    /// Drop entries whose window has elapsed, returning how many were removed
    async fn sweep(&self, window: Duration, now: Instant) -> usize;

    async fn len(&self) -> usize;
}

/// Process-local attempt store
#[derive(Default)]
pub struct InMemoryAttemptStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn register(
        &self,
        key: &str,
        policy: &ThrottlePolicy,
        now: Instant,
    ) -> ThrottleDecision {
        let mut entries = self.entries.lock().await;
        let (entry, decision) = RateLimitEntry::register(entries.get(key).copied(), policy, now);
        entries.insert(key.to_string(), entry);
        decision
    }

    async fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.lock().await.get(key).copied()
    }

    async fn clear(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    async fn sweep(&self, window: Duration, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(window, now));
        before - entries.len()
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

/// Login throttle keyed by client identifier
#[derive(Clone)]
pub struct LoginThrottle {
    store: Arc<dyn AttemptStore>,
    policy: ThrottlePolicy,
}

impl LoginThrottle {
    /// Create a throttle backed by an in-memory store
    pub fn new(policy: ThrottlePolicy) -> Self {
        Self::with_store(Arc::new(InMemoryAttemptStore::new()), policy)
    }

    pub fn with_store(store: Arc<dyn AttemptStore>, policy: ThrottlePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    /// Register an attempt for `key`
    pub async fn check(&self, key: &str) -> ThrottleDecision {
        let decision = self.store.register(key, &self.policy, Instant::now()).await;
        match decision {
            ThrottleDecision::Allowed { remaining } => {
                debug!("Login attempt from {} allowed, {} left", key, remaining)
            }
            ThrottleDecision::Blocked { retry_after } => warn!(
                "Login attempts from {} throttled for {}s",
                key,
                retry_after.as_secs()
            ),
        }
        decision
    }

    /// Register an attempt and report whether it may proceed
    pub async fn check_rate_limit(&self, key: &str) -> bool {
        self.check(key).await.is_allowed()
    }

    /// Forgive earlier attempts, e.g. after a successful login
    pub async fn clear_rate_limit(&self, key: &str) {
        self.store.clear(key).await;
    }

    pub async fn state(&self, key: &str) -> ThrottleState {
        match self.store.get(key).await {
            Some(entry) => entry.state(&self.policy, Instant::now()),
            None => ThrottleState::Fresh,
        }
    }

    /// Remove entries whose window has elapsed
    pub async fn sweep(&self) -> usize {
        self.store.sweep(self.policy.window, Instant::now()).await
    }

    pub async fn tracked_keys(&self) -> usize {
        self.store.len().await
    }
}

impl Default for LoginThrottle {
    fn default() -> Self {
        Self::new(ThrottlePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ThrottlePolicy {
        ThrottlePolicy {
            max_attempts: 3,
            window: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_register_counts_then_blocks() {
        let policy = policy();
        let now = Instant::now();

        let (entry, first) = RateLimitEntry::register(None, &policy, now);
        assert_eq!(first, ThrottleDecision::Allowed { remaining: 2 });

        let (entry, _) = RateLimitEntry::register(Some(entry), &policy, now);
        let (entry, third) = RateLimitEntry::register(Some(entry), &policy, now);
        assert_eq!(third, ThrottleDecision::Allowed { remaining: 0 });

        let (blocked_entry, fourth) = RateLimitEntry::register(Some(entry), &policy, now);
        assert!(!fourth.is_allowed());
        assert_eq!(blocked_entry, entry);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_lifts_after_window() {
        let throttle = LoginThrottle::new(policy());
        for _ in 0..3 {
            assert!(throttle.check_rate_limit("10.0.0.1").await);
        }
        assert!(!throttle.check_rate_limit("10.0.0.1").await);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(
            throttle.check("10.0.0.1").await,
            ThrottleDecision::Blocked { retry_after } if retry_after == Duration::from_secs(30)
        ));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(throttle.state("10.0.0.1").await, ThrottleState::Fresh);
        assert!(throttle.check_rate_limit("10.0.0.1").await);
        assert_eq!(
            throttle.state("10.0.0.1").await,
            ThrottleState::Counting { count: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_stale_entries() {
        let throttle = LoginThrottle::new(policy());
        throttle.check("a").await;
        tokio::time::advance(Duration::from_secs(45)).await;
        throttle.check("b").await;
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(throttle.sweep().await, 1);
        assert_eq!(throttle.tracked_keys().await, 1);
        assert_eq!(throttle.state("b").await, ThrottleState::Counting { count: 1 });
    }
}
