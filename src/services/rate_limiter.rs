//! Sliding-window rate limiter for login attempts
//!
//! Two independent windows: failed attempts per username (5 per 15 minutes)
//! and requests per client IP (10 per minute).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Allow at most `limit` events inside `window`
#[derive(Debug, Clone, Copy)]
pub struct RateWindow {
    pub limit: usize,
    pub window: Duration,
}

impl RateWindow {
    pub const fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Event timestamps per key, pruned lazily on access
struct SlidingLog<K> {
    rule: RateWindow,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingLog<K> {
    fn new(rule: RateWindow) -> Self {
        Self {
            rule,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: K) -> bool {
        let cutoff = Utc::now() - self.rule.window;
        let mut events = self.events.write().await;
        let log = events.entry(key).or_default();
        log.retain(|time| *time > cutoff);
        log.len() >= self.rule.limit
    }

    async fn record(&self, key: K) {
        self.events.write().await.entry(key).or_default().push(Utc::now());
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self) {
        let cutoff = Utc::now() - self.rule.window;
        self.events.write().await.retain(|_, log| {
            log.retain(|time| *time > cutoff);
            !log.is_empty()
        });
    }
}

pub struct LoginRateLimiter {
    usernames: SlidingLog<String>,
    ips: SlidingLog<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_windows(
            RateWindow::new(5, Duration::minutes(15)),
            RateWindow::new(10, Duration::minutes(1)),
        )
    }

    pub fn with_windows(per_username: RateWindow, per_ip: RateWindow) -> Self {
        Self {
            usernames: SlidingLog::new(per_username),
            ips: SlidingLog::new(per_ip),
        }
    }

    /// Usernames are compared case-insensitively
    pub async fn is_username_limited(&self, username: &str) -> bool {
        self.usernames.is_limited(username.to_lowercase()).await
    }

    pub async fn record_failed_attempt(&self, username: &str) {
        self.usernames.record(username.to_lowercase()).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_username_attempts(&self, username: &str) {
        self.usernames.clear(&username.to_lowercase()).await;
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(ip).await
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip).await;
    }

    /// Drop expired entries from both windows
    pub async fn cleanup(&self) {
        self.usernames.prune().await;
        self.ips.prune().await;
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
