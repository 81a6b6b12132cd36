//! Flood protection for "Access denied" replies.
//!
//! Unauthorized users get at most one denial per cooldown window; further
//! attempts are counted and logged with throttling.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Last denial time per user, with automatic expiry
#[derive(Clone)]
pub struct UnauthorizedCache {
    notified: Cache<i64, Instant>,
    cooldown: Duration,
    silenced_count: Arc<AtomicU64>,
}

impl UnauthorizedCache {
    /// Creates a cache with the given cooldown, entry TTL and capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use postpilot_transport_telegram::bot::UnauthorizedCache;
    ///
    /// let cache = UnauthorizedCache::new(1200, 7200, 10_000);
    /// assert_eq!(cache.cooldown().as_secs(), 1200);
    /// ```
    #[must_use]
    pub fn new(cooldown_secs: u64, ttl_secs: u64, max_capacity: u64) -> Self {
        let notified = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs.max(cooldown_secs)))
            .build();

        Self {
            notified,
            cooldown: Duration::from_secs(cooldown_secs),
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// True when `user_id` has not been denied within the cooldown window
    pub async fn should_send(&self, user_id: i64, user_name: &str) -> bool {
        match self.notified.get(&user_id).await {
            Some(sent_at) if sent_at.elapsed() < self.cooldown => {}
            _ => return true,
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        // Only every 100th silenced attempt is logged.
        if count.is_multiple_of(100) {
            debug!(
                silenced = count,
                user_id, user_name, "Silenced unauthorized attempts"
            );
        }
        false
    }

    /// Start the cooldown for `user_id` after a denial was delivered
    pub async fn mark_sent(&self, user_id: i64) {
        self.notified.insert(user_id, Instant::now()).await;
    }

    /// Users currently tracked
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.notified.entry_count()
    }

    /// Denials suppressed so far
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }

    /// Configured cooldown
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
