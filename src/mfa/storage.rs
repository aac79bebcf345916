//! MFA record storage.
//!
//! One record per user. Implement [`MfaStore`] for your database layer;
//! [`InMemoryMfaStore`] ships for development and testing.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The persisted MFA state for one user.
///
/// `secret` is always the format-tagged ciphertext of the Base32 TOTP
/// seed; the plaintext never touches storage. `backup_code_hashes` holds
/// one-way hashes of the codes that have not been used yet; consumed codes
/// are removed, not flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaRecord {
    pub user_id: String,
    pub secret: String,
    pub backup_code_hashes: Vec<String>,
    pub enabled: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MfaRecord {
    /// A fresh, pending record: setup has started but the first code has
    /// not been verified yet.
    pub fn pending(user_id: impl Into<String>, secret: String, backup_code_hashes: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            secret,
            backup_code_hashes,
            enabled: false,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Trait for storing MFA records.
///
/// Implement this for your database layer.
#[async_trait]
pub trait MfaStore: Send + Sync {
    /// Fetch the record for a user (None if MFA was never set up).
    async fn get(&self, user_id: &str) -> Result<Option<MfaRecord>>;

    /// Insert or replace the record for `record.user_id`. Re-running setup
    /// overwrites any prior pending or enabled record wholesale.
    async fn upsert(&self, record: MfaRecord) -> Result<()>;

    /// Flip the record to enabled and stamp the first verification time.
    async fn mark_enabled(&self, user_id: &str, verified_at: DateTime<Utc>) -> Result<()>;

    /// Replace the stored backup code hashes wholesale.
    async fn replace_backup_codes(&self, user_id: &str, hashes: Vec<String>) -> Result<()>;

    /// Atomically remove one backup code hash, if it is still present.
    ///
    /// Returns the count of hashes remaining after removal, or `None` if
    /// the hash was already gone (consumed by a concurrent request). The
    /// removal must be conditional on presence so that two requests
    /// spending the same code cannot both succeed.
    async fn take_backup_code(&self, user_id: &str, hash: &str) -> Result<Option<usize>>;

    /// Delete the record entirely. Returns whether a record existed.
    /// Disabling MFA destroys all MFA material; there is no soft delete.
    async fn delete(&self, user_id: &str) -> Result<bool>;
}

/// In-memory MFA store.
///
/// Suitable for development and testing, not for production (records are
/// lost on restart and not shared across instances).
#[derive(Clone, Default)]
pub struct InMemoryMfaStore {
    records: Arc<RwLock<HashMap<String, MfaRecord>>>,
}

impl InMemoryMfaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MfaStore for InMemoryMfaStore {
    async fn get(&self, user_id: &str) -> Result<Option<MfaRecord>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn upsert(&self, record: MfaRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.user_id.clone(), record);
        Ok(())
    }

    async fn mark_enabled(&self, user_id: &str, verified_at: DateTime<Utc>) -> Result<()> {
        if let Some(record) = self.records.write().await.get_mut(user_id) {
            record.enabled = true;
            record.verified_at = Some(verified_at);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn replace_backup_codes(&self, user_id: &str, hashes: Vec<String>) -> Result<()> {
        if let Some(record) = self.records.write().await.get_mut(user_id) {
            record.backup_code_hashes = hashes;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn take_backup_code(&self, user_id: &str, hash: &str) -> Result<Option<usize>> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(user_id) else {
            return Ok(None);
        };
        // Conditional removal under the write lock: present -> remove and
        // report the remainder, absent -> the code was already spent.
        let Some(position) = record.backup_code_hashes.iter().position(|h| h == hash) else {
            return Ok(None);
        };
        record.backup_code_hashes.remove(position);
        record.updated_at = Utc::now();
        Ok(Some(record.backup_code_hashes.len()))
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(user_id).is_some())
    }
}
