//! Recent-reauthentication tracking.
//!
//! A process-local TTL map of users who recently passed a verification
//! step. Entries are advisory: they may vanish on restart, and a
//! multi-instance deployment should inject a distributed implementation
//! at the same seam instead.

use moka::sync::Cache;
use std::time::Duration;

/// Default freshness window.
pub const DEFAULT_REAUTH_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Tracks which users have reauthenticated within the freshness window.
#[derive(Clone)]
pub struct ReauthCache {
    entries: Cache<String, ()>,
}

impl ReauthCache {
    /// Create a cache whose entries expire after `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Cache::builder().time_to_live(window).build(),
        }
    }

    /// Record that a user just passed verification.
    pub fn mark(&self, user_id: &str) {
        self.entries.insert(user_id.to_string(), ());
    }

    /// Whether the user verified within the freshness window.
    pub fn is_fresh(&self, user_id: &str) -> bool {
        self.entries.get(user_id).is_some()
    }

    /// Drop a user's marker (e.g. on logout or disable).
    pub fn clear(&self, user_id: &str) {
        self.entries.invalidate(user_id);
    }
}

impl Default for ReauthCache {
    fn default() -> Self {
        Self::new(DEFAULT_REAUTH_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_check() {
        let cache = ReauthCache::default();
        assert!(!cache.is_fresh("user-1"));

        cache.mark("user-1");
        assert!(cache.is_fresh("user-1"));
        assert!(!cache.is_fresh("user-2"));

        cache.clear("user-1");
        assert!(!cache.is_fresh("user-1"));
    }

    #[test]
    fn test_entries_expire() {
        let cache = ReauthCache::new(Duration::from_millis(50));
        cache.mark("user-1");
        assert!(cache.is_fresh("user-1"));

        std::thread::sleep(Duration::from_millis(80));
        assert!(!cache.is_fresh("user-1"));
    }
}
