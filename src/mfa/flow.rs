//! Route-facing MFA operation surface.
//!
//! [`MfaFlow`] wraps the orchestrator with the contracts a route layer
//! needs: input-format rejection before any crypto or storage work, the
//! already-enabled guard on setup, and the valid-current-code requirement
//! on destructive operations.

use crate::error::{PalisadeError, Result};
use crate::mfa::service::{MfaService, MfaSetup};
use crate::mfa::storage::MfaStore;
use crate::reauth::ReauthCache;
use crate::totp;
use serde::Serialize;

/// MFA status for one user.
#[derive(Debug, Clone, Serialize)]
pub struct MfaStatus {
    pub user_id: String,
    pub enabled: bool,
}

/// Routes-facing MFA operations.
pub struct MfaFlow<S: MfaStore> {
    service: MfaService<S>,
    reauth: ReauthCache,
}

impl<S: MfaStore> MfaFlow<S> {
    pub fn new(service: MfaService<S>, reauth: ReauthCache) -> Self {
        Self { service, reauth }
    }

    /// Whether MFA is enabled for the user.
    pub async fn status(&self, user_id: &str) -> Result<MfaStatus> {
        Ok(MfaStatus {
            user_id: user_id.to_string(),
            enabled: self.service.is_enabled(user_id).await?,
        })
    }

    /// Begin enrollment. Refused once MFA is already enabled: the user
    /// must disable first (with a valid code) to re-enroll.
    pub async fn setup(&self, user_id: &str, email: &str) -> Result<MfaSetup> {
        if self.service.is_enabled(user_id).await? {
            return Err(PalisadeError::MfaAlreadyEnabled);
        }
        self.service.initiate_setup(user_id, email).await
    }

    /// Verify the first authenticator code and enable MFA.
    pub async fn verify_setup(&self, user_id: &str, code: &str) -> Result<bool> {
        let code = validate_code_format(code)?;
        let success = self.service.verify_setup(user_id, code).await?;
        if success {
            self.reauth.mark(user_id);
        }
        Ok(success)
    }

    /// Verify a TOTP or backup code during login.
    pub async fn verify(&self, user_id: &str, code: &str, is_backup_code: bool) -> Result<bool> {
        let success = if is_backup_code {
            if code.trim().is_empty() {
                return Err(PalisadeError::bad_request("Backup code is required"));
            }
            self.service.verify_backup_code(user_id, code).await?
        } else {
            let code = validate_code_format(code)?;
            self.service.verify_code(user_id, code).await?
        };

        if success {
            self.reauth.mark(user_id);
        }
        Ok(success)
    }

    /// Disable MFA. Demands a valid current TOTP code first; returns
    /// `false` (leaving the record intact) when the code does not verify.
    pub async fn disable(&self, user_id: &str, code: &str) -> Result<bool> {
        let code = validate_code_format(code)?;
        if !self.service.is_enabled(user_id).await? {
            return Err(PalisadeError::MfaNotEnabled);
        }
        if !self.service.verify_code(user_id, code).await? {
            return Ok(false);
        }

        self.service.disable(user_id).await?;
        self.reauth.clear(user_id);
        Ok(true)
    }

    /// Regenerate backup codes. Demands a valid current TOTP code first.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<Option<Vec<String>>> {
        let code = validate_code_format(code)?;
        if !self.service.is_enabled(user_id).await? {
            return Err(PalisadeError::MfaNotEnabled);
        }
        if !self.service.verify_code(user_id, code).await? {
            return Ok(None);
        }

        self.reauth.mark(user_id);
        self.service.regenerate_backup_codes(user_id).await
    }

    /// Whether the user passed a verification step within the
    /// reauthentication freshness window. Advisory (process-local).
    pub fn recently_verified(&self, user_id: &str) -> bool {
        self.reauth.is_fresh(user_id)
    }

    /// Access the underlying orchestrator, for callers that build their
    /// own route contracts.
    pub fn service(&self) -> &MfaService<S> {
        &self.service
    }
}

/// Reject anything that is not exactly six ASCII digits before crypto or
/// storage work happens.
fn validate_code_format(code: &str) -> Result<&str> {
    let trimmed = code.trim();
    if trimmed.len() != totp::DIGITS || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PalisadeError::bad_request("Code must be exactly 6 digits"));
    }
    Ok(trimmed)
}
