//! MFA orchestration.
//!
//! Owns the record lifecycle: `unset → pending → enabled`, with disable as
//! a hard delete back to `unset`. Cryptographic work is delegated to the
//! TOTP codec and the secret cipher; persistence to an injected
//! [`MfaStore`]; security events to an injected [`AuditSink`].

use crate::audit::{AuditEvent, AuditSink};
use crate::error::Result;
use crate::mfa::backup::{self, BackupCodeGenerator};
use crate::mfa::cipher::SecretCipher;
use crate::mfa::storage::{MfaRecord, MfaStore};
use crate::totp;
use chrono::Utc;
use std::sync::Arc;

/// Data returned once, at setup time, for user display.
///
/// The secret and codes exist in plaintext only in this value; storage
/// holds the encrypted secret and one-way hashes.
#[derive(Debug, Clone)]
pub struct MfaSetup {
    /// Base32 secret for manual authenticator entry.
    pub secret: String,
    /// otpauth:// URI for QR-code rendering by the caller.
    pub otpauth_uri: String,
    /// Plaintext backup codes.
    pub backup_codes: Vec<String>,
}

/// Stateful MFA service coordinating setup, verification, disable, and
/// backup-code recovery for one store.
pub struct MfaService<S: MfaStore> {
    store: S,
    cipher: SecretCipher,
    issuer: String,
    generator: BackupCodeGenerator,
    audit: Arc<dyn AuditSink>,
}

impl<S: MfaStore> MfaService<S> {
    pub fn new(
        store: S,
        cipher: SecretCipher,
        issuer: impl Into<String>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            cipher,
            issuer: issuer.into(),
            generator: BackupCodeGenerator::default(),
            audit,
        }
    }

    /// Override the backup code batch settings.
    pub fn with_backup_codes(mut self, generator: BackupCodeGenerator) -> Self {
        self.generator = generator;
        self
    }

    /// Begin (or restart) MFA setup for a user.
    ///
    /// Generates a fresh secret and backup code batch, stores them
    /// encrypted/hashed with `enabled = false`, and returns the plaintext
    /// material for one-time display. Any prior record for the user,
    /// pending or enabled, is overwritten, so re-running setup always
    /// restarts the flow and invalidates the previous secret.
    pub async fn initiate_setup(&self, user_id: &str, email: &str) -> Result<MfaSetup> {
        let secret = totp::generate_secret();
        let backup_codes = self.generator.generate();

        let hashes = backup_codes
            .iter()
            .map(|code| backup::hash_code(code))
            .collect::<Result<Vec<_>>>()?;

        let encrypted = self.cipher.encrypt(&secret)?;
        self.store
            .upsert(MfaRecord::pending(user_id, encrypted, hashes))
            .await?;

        Ok(MfaSetup {
            otpauth_uri: self.otpauth_uri(email, &secret),
            secret,
            backup_codes,
        })
    }

    /// Complete setup by verifying the first code from the authenticator.
    ///
    /// On success the record flips to enabled and an audit event is
    /// emitted. On failure the record is left pending; the caller may
    /// retry with the next code.
    pub async fn verify_setup(&self, user_id: &str, code: &str) -> Result<bool> {
        let Some(record) = self.store.get(user_id).await? else {
            return Ok(false);
        };

        let secret = self.cipher.decrypt(&record.secret)?;
        if !totp::verify_code(&secret, code) {
            return Ok(false);
        }

        if !record.enabled {
            self.store.mark_enabled(user_id, Utc::now()).await?;
            self.audit
                .record(AuditEvent::MfaEnabled {
                    user_id: user_id.to_string(),
                })
                .await;
        }
        Ok(true)
    }

    /// Verify a TOTP code for an enabled user.
    ///
    /// Emits an audit event for every attempt, success or failure. Users
    /// without an enabled record always get `false` without touching
    /// crypto.
    pub async fn verify_code(&self, user_id: &str, code: &str) -> Result<bool> {
        let Some(record) = self.enabled_record(user_id).await? else {
            return Ok(false);
        };

        let secret = self.cipher.decrypt(&record.secret)?;
        let success = totp::verify_code(&secret, code);

        self.audit
            .record(AuditEvent::MfaCodeVerified {
                user_id: user_id.to_string(),
                success,
            })
            .await;

        Ok(success)
    }

    /// Verify and consume a backup code for an enabled user.
    ///
    /// Each code is usable exactly once: the matched hash is removed
    /// through a conditional store update, so a concurrent request
    /// presenting the same code cannot spend it twice.
    pub async fn verify_backup_code(&self, user_id: &str, raw_code: &str) -> Result<bool> {
        let Some(record) = self.enabled_record(user_id).await? else {
            return Ok(false);
        };

        let normalized = backup::normalize(raw_code);
        for hash in &record.backup_code_hashes {
            if !backup::verify_hash(&normalized, hash) {
                continue;
            }
            match self.store.take_backup_code(user_id, hash).await? {
                Some(remaining) => {
                    self.audit
                        .record(AuditEvent::BackupCodeAccepted {
                            user_id: user_id.to_string(),
                            remaining,
                        })
                        .await;
                    return Ok(true);
                }
                // Matched, but another request consumed it first.
                None => break,
            }
        }

        self.audit
            .record(AuditEvent::BackupCodeRejected {
                user_id: user_id.to_string(),
            })
            .await;
        Ok(false)
    }

    /// Disable MFA: delete the record and all its material outright.
    ///
    /// No code check happens at this layer; callers demand a valid
    /// current code before invoking disable (see [`crate::mfa::MfaFlow`]).
    /// Returns whether a record existed.
    pub async fn disable(&self, user_id: &str) -> Result<bool> {
        let existed = self.store.delete(user_id).await?;
        if existed {
            self.audit
                .record(AuditEvent::MfaDisabled {
                    user_id: user_id.to_string(),
                })
                .await;
        }
        Ok(existed)
    }

    /// Replace the stored backup codes with a fresh batch.
    ///
    /// Returns `None` when MFA is not enabled; otherwise the new plaintext
    /// batch, returned once.
    pub async fn regenerate_backup_codes(&self, user_id: &str) -> Result<Option<Vec<String>>> {
        if self.enabled_record(user_id).await?.is_none() {
            return Ok(None);
        }

        let codes = self.generator.generate();
        let hashes = codes
            .iter()
            .map(|code| backup::hash_code(code))
            .collect::<Result<Vec<_>>>()?;

        self.store.replace_backup_codes(user_id, hashes).await?;
        self.audit
            .record(AuditEvent::BackupCodesRegenerated {
                user_id: user_id.to_string(),
            })
            .await;

        Ok(Some(codes))
    }

    /// Whether MFA is fully enabled for a user. Used by login flows to
    /// branch between credential-only login and the MFA challenge.
    pub async fn is_enabled(&self, user_id: &str) -> Result<bool> {
        Ok(self.enabled_record(user_id).await?.is_some())
    }

    async fn enabled_record(&self, user_id: &str) -> Result<Option<MfaRecord>> {
        Ok(self.store.get(user_id).await?.filter(|r| r.enabled))
    }

    fn otpauth_uri(&self, email: &str, secret: &str) -> String {
        let issuer = urlencoding::encode(&self.issuer);
        let account = urlencoding::encode(email);
        format!(
            "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}\
             &algorithm=SHA1&digits={digits}&period={period}",
            digits = totp::DIGITS,
            period = totp::STEP_SECONDS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::RecordingAuditSink;
    use crate::mfa::storage::InMemoryMfaStore;
    use secrecy::SecretString;

    fn service() -> (MfaService<InMemoryMfaStore>, Arc<RecordingAuditSink>) {
        let audit = Arc::new(RecordingAuditSink::new());
        let cipher = SecretCipher::new(
            Some(SecretString::new("unit-test-mfa-key".to_string())),
            SecretString::new("unit-test-session-secret".to_string()),
        );
        let service = MfaService::new(InMemoryMfaStore::new(), cipher, "Palisade", audit.clone());
        (service, audit)
    }

    #[tokio::test]
    async fn test_setup_produces_uri_and_codes() {
        let (service, _) = service();
        let setup = service
            .initiate_setup("user-1", "user@example.com")
            .await
            .unwrap();

        assert_eq!(setup.backup_codes.len(), 10);
        assert!(setup.otpauth_uri.starts_with("otpauth://totp/Palisade:user%40example.com"));
        assert!(setup.otpauth_uri.contains(&format!("secret={}", setup.secret)));
        assert!(setup.otpauth_uri.contains("algorithm=SHA1"));
        assert!(setup.otpauth_uri.contains("digits=6"));
        assert!(setup.otpauth_uri.contains("period=30"));

        // Not enabled until the first code verifies
        assert!(!service.is_enabled("user-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_setup_enables_and_audits() {
        let (service, audit) = service();
        let setup = service
            .initiate_setup("user-1", "user@example.com")
            .await
            .unwrap();

        let code = totp::generate_code(&setup.secret, now());
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!service.verify_setup("user-1", wrong).await.unwrap());
        assert!(!service.is_enabled("user-1").await.unwrap());

        assert!(service.verify_setup("user-1", &code).await.unwrap());
        assert!(service.is_enabled("user-1").await.unwrap());

        assert!(audit.events().contains(&AuditEvent::MfaEnabled {
            user_id: "user-1".to_string()
        }));
    }

    #[tokio::test]
    async fn test_second_setup_invalidates_first_secret() {
        let (service, _) = service();
        let first = service
            .initiate_setup("user-1", "user@example.com")
            .await
            .unwrap();
        let second = service
            .initiate_setup("user-1", "user@example.com")
            .await
            .unwrap();
        assert_ne!(first.secret, second.secret);

        let stale = totp::generate_code(&first.secret, now());
        let fresh = totp::generate_code(&second.secret, now());
        // The stale code can only pass by colliding with the fresh secret's
        // code for this window.
        if stale != fresh {
            assert!(!service.verify_setup("user-1", &stale).await.unwrap());
        }
        assert!(service.verify_setup("user-1", &fresh).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_code_requires_enabled() {
        let (service, _) = service();

        // No record at all
        assert!(!service.verify_code("ghost", "123456").await.unwrap());

        // Pending record is not verifiable either
        let setup = service
            .initiate_setup("user-1", "user@example.com")
            .await
            .unwrap();
        let code = totp::generate_code(&setup.secret, now());
        assert!(!service.verify_code("user-1", &code).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_code_audits_both_outcomes() {
        let (service, audit) = service();
        let setup = enable(&service, "user-1").await;

        let code = totp::generate_code(&setup.secret, now());
        assert!(service.verify_code("user-1", &code).await.unwrap());
        let wrong = if code == "000000" { "000001" } else { "000000" };
        assert!(!service.verify_code("user-1", wrong).await.unwrap());

        let events = audit.events();
        assert!(events.contains(&AuditEvent::MfaCodeVerified {
            user_id: "user-1".to_string(),
            success: true
        }));
        assert!(events.contains(&AuditEvent::MfaCodeVerified {
            user_id: "user-1".to_string(),
            success: false
        }));
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let (service, audit) = service();
        let setup = enable(&service, "user-1").await;
        let code = &setup.backup_codes[3];

        assert!(service.verify_backup_code("user-1", code).await.unwrap());
        assert!(!service.verify_backup_code("user-1", code).await.unwrap());

        let events = audit.events();
        assert!(events.contains(&AuditEvent::BackupCodeAccepted {
            user_id: "user-1".to_string(),
            remaining: 9
        }));
        assert!(events.contains(&AuditEvent::BackupCodeRejected {
            user_id: "user-1".to_string()
        }));
    }

    #[tokio::test]
    async fn test_backup_code_accepts_messy_input() {
        let (service, _) = service();
        let setup = enable(&service, "user-1").await;
        let code = &setup.backup_codes[0];
        let messy = format!(" {}-{} ", &code[..4], code[4..].to_lowercase());

        assert!(service.verify_backup_code("user-1", &messy).await.unwrap());
    }

    #[tokio::test]
    async fn test_disable_deletes_everything() {
        let (service, audit) = service();
        enable(&service, "user-1").await;

        assert!(service.disable("user-1").await.unwrap());
        assert!(!service.is_enabled("user-1").await.unwrap());
        // A second disable finds nothing
        assert!(!service.disable("user-1").await.unwrap());

        assert!(audit.events().contains(&AuditEvent::MfaDisabled {
            user_id: "user-1".to_string()
        }));
    }

    #[tokio::test]
    async fn test_regenerate_replaces_wholesale() {
        let (service, _) = service();
        let setup = enable(&service, "user-1").await;

        let fresh = service
            .regenerate_backup_codes("user-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fresh.len(), 10);

        // Old codes are dead, new ones work
        assert!(!service
            .verify_backup_code("user-1", &setup.backup_codes[0])
            .await
            .unwrap());
        assert!(service.verify_backup_code("user-1", &fresh[0]).await.unwrap());
    }

    #[tokio::test]
    async fn test_regenerate_requires_enabled() {
        let (service, _) = service();
        assert!(service
            .regenerate_backup_codes("ghost")
            .await
            .unwrap()
            .is_none());
    }

    fn now() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    async fn enable(service: &MfaService<InMemoryMfaStore>, user_id: &str) -> MfaSetup {
        let setup = service
            .initiate_setup(user_id, "user@example.com")
            .await
            .unwrap();
        let code = totp::generate_code(&setup.secret, now());
        assert!(service.verify_setup(user_id, &code).await.unwrap());
        setup
    }
}
