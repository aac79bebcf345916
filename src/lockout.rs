//! Account lockout against brute-force login attempts.
//!
//! Tracks failed attempts per normalized email and enforces a temporary
//! lockout once the threshold is reached. The lockout check gates login
//! only, so it fails OPEN when storage is unavailable; the mutating paths
//! propagate storage errors as usual.

use crate::audit::{AuditEvent, AuditSink};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Default maximum failed attempts before lockout.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lockout duration (15 minutes).
const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(15 * 60);

/// Lockout policy configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failed attempts allowed before the account locks.
    pub max_attempts: u32,
    /// How long the account stays locked.
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    #[must_use]
    pub fn lockout_duration(mut self, duration: Duration) -> Self {
        self.lockout_duration = duration;
        self
    }
}

/// Result of a lockout check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutStatus {
    pub is_locked: bool,
    /// When the lockout lifts, if locked.
    pub unlock_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub remaining_attempts: u32,
}

impl LockoutStatus {
    fn clear(max_attempts: u32) -> Self {
        Self {
            is_locked: false,
            unlock_at: None,
            failed_attempts: 0,
            remaining_attempts: max_attempts,
        }
    }
}

/// Persisted lockout state for one normalized email.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockoutRecord {
    pub email: String,
    pub failed_attempts: u32,
    pub unlock_at: Option<DateTime<Utc>>,
}

/// Trait for lockout storage operations. Keys are normalized emails.
#[async_trait]
pub trait LockoutStore: Send + Sync {
    /// Fetch the row for an email (None if no failures recorded).
    async fn get(&self, email: &str) -> Result<Option<LockoutRecord>>;

    /// Increment the failed-attempt count, creating the row if needed.
    /// Returns the new count.
    async fn increment_failed(&self, email: &str) -> Result<u32>;

    /// Set the unlock time on an existing row.
    async fn set_unlock_at(&self, email: &str, unlock_at: DateTime<Utc>) -> Result<()>;

    /// Delete the row entirely (successful login or admin unlock).
    /// Returns whether a row existed.
    async fn clear(&self, email: &str) -> Result<bool>;
}

/// Manager for account lockout.
pub struct LockoutManager<S: LockoutStore> {
    store: S,
    policy: LockoutPolicy,
    audit: Arc<dyn AuditSink>,
}

impl<S: LockoutStore> LockoutManager<S> {
    pub fn new(store: S, policy: LockoutPolicy, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            policy,
            audit,
        }
    }

    /// Check whether login attempts for this email are currently blocked.
    ///
    /// Fails open: a storage error reports not-locked with a full
    /// allowance, because this check gates login availability rather than
    /// a sensitive mutation.
    pub async fn check_lockout(&self, email: &str) -> LockoutStatus {
        let email = normalize_email(email);

        let record = match self.store.get(&email).await {
            Ok(record) => record,
            Err(e) => {
                tracing::error!(
                    target: "auth.lockout.check_failed",
                    email = %email,
                    error = %e,
                    "Lockout check failed; failing open"
                );
                return LockoutStatus::clear(self.policy.max_attempts);
            }
        };

        let Some(record) = record else {
            return LockoutStatus::clear(self.policy.max_attempts);
        };

        if let Some(unlock_at) = record.unlock_at {
            if unlock_at > Utc::now() {
                return LockoutStatus {
                    is_locked: true,
                    unlock_at: Some(unlock_at),
                    failed_attempts: record.failed_attempts,
                    remaining_attempts: 0,
                };
            }
        }

        LockoutStatus {
            is_locked: false,
            unlock_at: None,
            failed_attempts: record.failed_attempts,
            remaining_attempts: self
                .policy
                .max_attempts
                .saturating_sub(record.failed_attempts),
        }
    }

    /// Record the outcome of a login attempt.
    ///
    /// Success deletes the row outright (full reset, not a decrement).
    /// Failure increments the count; crossing the threshold sets the
    /// unlock time and emits an `AccountLocked` audit event.
    pub async fn record_attempt(&self, email: &str, ip: Option<&str>, success: bool) -> Result<()> {
        let email = normalize_email(email);

        if success {
            self.store.clear(&email).await?;
            tracing::debug!(
                target: "auth.lockout.cleared",
                email = %email,
                "Lockout state cleared on successful login"
            );
            return Ok(());
        }

        let count = self.store.increment_failed(&email).await?;
        if count >= self.policy.max_attempts {
            let unlock_at = Utc::now()
                + ChronoDuration::from_std(self.policy.lockout_duration)
                    .unwrap_or_else(|_| ChronoDuration::minutes(15));
            self.store.set_unlock_at(&email, unlock_at).await?;

            tracing::warn!(
                target: "auth.lockout.account_locked",
                email = %email,
                attempts = count,
                unlock_at = %unlock_at,
                "Account locked due to failed attempts"
            );
            self.audit
                .record(AuditEvent::AccountLocked {
                    email: email.clone(),
                    ip: ip.map(str::to_string),
                    unlock_at,
                })
                .await;
        }

        Ok(())
    }

    /// Administrative override: unconditionally delete the lockout row.
    /// Returns whether a row existed.
    pub async fn unlock_account(&self, email: &str) -> Result<bool> {
        let email = normalize_email(email);
        let existed = self.store.clear(&email).await?;

        tracing::warn!(
            target: "auth.lockout.admin_unlock",
            email = %email,
            had_lockout = existed,
            "Account unlocked by admin"
        );
        if existed {
            self.audit
                .record(AuditEvent::AccountUnlocked { email })
                .await;
        }

        Ok(existed)
    }

    #[must_use]
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }
}

/// Normalize an email for use as a lockout key: trim and lowercase.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Humanize the remaining lockout time for user-facing messaging.
pub fn lockout_message(unlock_at: DateTime<Utc>) -> String {
    let remaining = unlock_at - Utc::now();
    let seconds = remaining.num_seconds();

    if seconds <= 0 {
        return "now unlocked".to_string();
    }
    if seconds < 60 {
        return "less than a minute".to_string();
    }

    // Ceiling at both granularities so the message never under-promises.
    let minutes = (seconds + 59) / 60;
    if minutes < 60 {
        return format!("{} minutes", minutes);
    }

    let hours = (minutes + 59) / 60;
    if hours == 1 {
        "1 hour".to_string()
    } else {
        format!("{} hours", hours)
    }
}

/// In-memory lockout store.
///
/// Suitable for development and testing, not for production (state is
/// lost on restart and not shared across instances).
#[derive(Clone, Default)]
pub struct InMemoryLockoutStore {
    rows: Arc<RwLock<HashMap<String, LockoutRecord>>>,
}

impl InMemoryLockoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockoutStore for InMemoryLockoutStore {
    async fn get(&self, email: &str) -> Result<Option<LockoutRecord>> {
        Ok(self.rows.read().await.get(email).cloned())
    }

    async fn increment_failed(&self, email: &str) -> Result<u32> {
        let mut rows = self.rows.write().await;
        let record = rows.entry(email.to_string()).or_insert_with(|| LockoutRecord {
            email: email.to_string(),
            failed_attempts: 0,
            unlock_at: None,
        });
        record.failed_attempts += 1;
        Ok(record.failed_attempts)
    }

    async fn set_unlock_at(&self, email: &str, unlock_at: DateTime<Utc>) -> Result<()> {
        if let Some(record) = self.rows.write().await.get_mut(email) {
            record.unlock_at = Some(unlock_at);
        }
        Ok(())
    }

    async fn clear(&self, email: &str) -> Result<bool> {
        Ok(self.rows.write().await.remove(email).is_some())
    }
}
