//! Unauthorized access flood protection
//!
//! Users outside the allow-list get one "Access Denied" message per
//! cooldown window; further attempts are silenced to keep the bot clear of
//! Telegram rate limits.

use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tracks when each unauthorized user was last told "Access Denied".
#[derive(Clone)]
pub struct UnauthorizedCache {
    /// user_id -> time of last denial notice, evicted after the TTL
    cache: Cache<i64, Instant>,
    cooldown: Duration,
    silenced_count: Arc<AtomicU64>,
}

impl UnauthorizedCache {
    /// Creates a new `UnauthorizedCache`.
    ///
    /// * `cooldown_secs` - Seconds between denial messages to the same user
    /// * `ttl_secs` - Lifetime of an entry before eviction
    /// * `max_capacity` - Maximum number of tracked users
    #[must_use]
    pub fn new(cooldown_secs: u64, ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            cache,
            cooldown: Duration::from_secs(cooldown_secs),
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether a denial message should be sent to `user_id` now.
    ///
    /// Only every 100th silenced attempt is logged.
    pub async fn should_send(&self, user_id: i64, user_name: &str) -> bool {
        match self.cache.get(&user_id).await {
            Some(last) if last.elapsed() < self.cooldown => {}
            _ => return true,
        }

        let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
        if count.is_multiple_of(100) {
            debug!(
                "⛔️ Silenced {} unauthorized attempts (recent: user {} - {})",
                count, user_id, user_name
            );
        }

        false
    }

    /// Record that a denial message was delivered, starting the cooldown.
    pub async fn mark_sent(&self, user_id: i64) {
        self.cache.insert(user_id, Instant::now()).await;
    }

    /// Total number of silenced attempts.
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }
}
