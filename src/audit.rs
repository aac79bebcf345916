//! Security audit events.
//!
//! The core emits an event for every security-relevant transition: MFA
//! enablement, every verification attempt (success and failure), backup
//! code consumption, and account lockouts. Where those events go is the
//! embedder's choice; [`TracingAuditSink`] is the default destination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A security event emitted by the auth core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    MfaEnabled {
        user_id: String,
    },
    MfaDisabled {
        user_id: String,
    },
    /// Every MFA code check, not just failures.
    MfaCodeVerified {
        user_id: String,
        success: bool,
    },
    BackupCodeAccepted {
        user_id: String,
        remaining: usize,
    },
    BackupCodeRejected {
        user_id: String,
    },
    BackupCodesRegenerated {
        user_id: String,
    },
    AccountLocked {
        email: String,
        ip: Option<String>,
        unlock_at: DateTime<Utc>,
    },
    AccountUnlocked {
        email: String,
    },
}

/// Destination for audit events.
///
/// Implementations must not fail the operation that produced the event;
/// a sink that talks to external infrastructure should swallow and log
/// its own errors.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

/// Default sink: structured `tracing` events under the `auth.audit.*`
/// targets.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        match &event {
            AuditEvent::MfaEnabled { user_id } => {
                tracing::info!(target: "auth.audit.mfa_enabled", user_id = %user_id, "MFA enabled");
            }
            AuditEvent::MfaDisabled { user_id } => {
                tracing::info!(target: "auth.audit.mfa_disabled", user_id = %user_id, "MFA disabled");
            }
            AuditEvent::MfaCodeVerified { user_id, success } => {
                tracing::info!(
                    target: "auth.audit.mfa_verified",
                    user_id = %user_id,
                    success = success,
                    "MFA code verification"
                );
            }
            AuditEvent::BackupCodeAccepted { user_id, remaining } => {
                tracing::warn!(
                    target: "auth.audit.backup_code_used",
                    user_id = %user_id,
                    remaining = remaining,
                    "Backup code consumed"
                );
            }
            AuditEvent::BackupCodeRejected { user_id } => {
                tracing::warn!(
                    target: "auth.audit.backup_code_rejected",
                    user_id = %user_id,
                    "Backup code rejected"
                );
            }
            AuditEvent::BackupCodesRegenerated { user_id } => {
                tracing::info!(
                    target: "auth.audit.backup_codes_regenerated",
                    user_id = %user_id,
                    "Backup codes regenerated"
                );
            }
            AuditEvent::AccountLocked { email, ip, unlock_at } => {
                tracing::warn!(
                    target: "auth.audit.account_locked",
                    email = %email,
                    ip = ip.as_deref().unwrap_or("unknown"),
                    unlock_at = %unlock_at,
                    "Account locked after repeated failures"
                );
            }
            AuditEvent::AccountUnlocked { email } => {
                tracing::info!(
                    target: "auth.audit.account_unlocked",
                    email = %email,
                    "Account unlocked"
                );
            }
        }
    }
}

/// In-memory sink that records events for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}
