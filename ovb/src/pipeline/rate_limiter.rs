//! Per-scope cooldowns for incoming commands.
//!
//! Each scope key (a channel or a user, depending on configuration) owns a
//! fixed window. The first admission opens the window; up to
//! `max_admissions` commands are admitted inside it and the rest are told how
//! long to wait until it closes.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::{AppConfig, CooldownScope};
use crate::domain::Requester;

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub window: Duration,
    /// Commands admitted per window.
    pub max_admissions: u32,
    pub scope: CooldownScope,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(5),
            max_admissions: 1,
            scope: CooldownScope::Channel,
        }
    }
}

impl From<&AppConfig> for RateLimiterConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            window: config.cooldown(),
            max_admissions: 1,
            scope: config.cooldown_scope,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Throttled { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

#[derive(Debug)]
struct Window {
    opened_at: Instant,
    used: u32,
}

/// Shared cooldown state for every scope key.
#[derive(Debug, Clone)]
pub struct RateLimiterManager {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    config: RateLimiterConfig,
}

impl RateLimiterManager {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            windows: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// The bucket a requester's commands count against.
    pub fn key_for(&self, requester: &Requester) -> String {
        match self.config.scope {
            CooldownScope::Channel => format!("channel:{}", requester.channel_id),
            CooldownScope::User => format!("user:{}", requester.user_id),
        }
    }

    pub fn admit(&self, requester: &Requester) -> Admission {
        self.admit_at(&self.key_for(requester), Instant::now())
    }

    /// Check and record an admission for `key` at `now`.
    ///
    /// The lock is held only for the map update, never across an await.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        if self.config.window.is_zero() {
            return Admission::Admitted;
        }

        let mut windows = self.windows.lock();
        let window = match windows.entry(key.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                trace!(key, "Opening cooldown window");
                entry.insert(Window {
                    opened_at: now,
                    used: 0,
                })
            }
        };

        let elapsed = now.saturating_duration_since(window.opened_at);
        if elapsed >= self.config.window {
            window.opened_at = now;
            window.used = 0;
        }

        if window.used < self.config.max_admissions {
            window.used += 1;
            return Admission::Admitted;
        }

        let retry_after = self
            .config
            .window
            .saturating_sub(now.saturating_duration_since(window.opened_at));
        debug!(key, retry_after = ?retry_after, "Command throttled");
        Admission::Throttled { retry_after }
    }

    /// Drop windows that have closed. Returns how many were removed.
    pub fn prune_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.saturating_duration_since(w.opened_at) < window);
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }
}

impl Default for RateLimiterManager {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(window_secs: u64) -> RateLimiterManager {
        RateLimiterManager::new(RateLimiterConfig {
            window: Duration::from_secs(window_secs),
            ..RateLimiterConfig::default()
        })
    }

    #[test]
    fn test_second_command_inside_window_is_throttled() {
        let limiter = manager(5);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("channel:1", t0), Admission::Admitted);
        let second = limiter.admit_at("channel:1", t0 + Duration::from_secs(2));
        assert_eq!(
            second,
            Admission::Throttled {
                retry_after: Duration::from_secs(3)
            }
        );
    }

    #[test]
    fn test_window_reopens_after_cooldown() {
        let limiter = manager(5);
        let t0 = Instant::now();

        assert!(limiter.admit_at("channel:1", t0).is_admitted());
        assert!(
            limiter
                .admit_at("channel:1", t0 + Duration::from_secs(5))
                .is_admitted()
        );
        assert!(
            !limiter
                .admit_at("channel:1", t0 + Duration::from_secs(6))
                .is_admitted()
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = manager(5);
        let t0 = Instant::now();

        assert!(limiter.admit_at("channel:1", t0).is_admitted());
        assert!(limiter.admit_at("channel:2", t0).is_admitted());
        assert!(!limiter.admit_at("channel:1", t0).is_admitted());
    }

    #[test]
    fn test_zero_window_always_admits() {
        let limiter = manager(0);
        let t0 = Instant::now();
        for _ in 0..5 {
            assert!(limiter.admit_at("channel:1", t0).is_admitted());
        }
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_scope_key() {
        let requester = Requester::new("u1", "c1", "<@u1>");
        assert_eq!(manager(5).key_for(&requester), "channel:c1");

        let by_user = RateLimiterManager::new(RateLimiterConfig {
            scope: CooldownScope::User,
            ..RateLimiterConfig::default()
        });
        assert_eq!(by_user.key_for(&requester), "user:u1");
    }

    #[test]
    fn test_prune_drops_closed_windows() {
        let limiter = manager(5);
        let t0 = Instant::now();
        limiter.admit_at("a", t0);
        limiter.admit_at("b", t0 + Duration::from_secs(4));

        assert_eq!(limiter.prune_at(t0 + Duration::from_secs(6)), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
