//! Configuration for the auth core.
//!
//! Built through [`AuthConfigBuilder`], which validates at `build()` time:
//! misconfiguration is a startup failure, never a request-time surprise.
//! Key material lives in [`SecretString`] so it stays out of `Debug`
//! output and logs.

use crate::error::{PalisadeError, Result};
use crate::lockout::LockoutPolicy;
use crate::mfa::SecretCipher;
use crate::reauth::DEFAULT_REAUTH_WINDOW;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Configuration for the auth core.
#[derive(Clone)]
pub struct AuthConfig {
    /// Issuer shown in authenticator apps and otpauth URIs.
    pub issuer: String,
    /// Production deployments refuse to start without a dedicated MFA
    /// encryption key.
    pub production: bool,
    pub lockout: LockoutPolicy,
    /// Freshness window for the recent-reauthentication cache.
    pub reauth_window: Duration,
    mfa_encryption_key: Option<SecretString>,
    session_signing_secret: SecretString,
}

impl AuthConfig {
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::new()
    }

    /// Construct the secret cipher from the configured key material.
    pub fn secret_cipher(&self) -> SecretCipher {
        SecretCipher::new(
            self.mfa_encryption_key.clone(),
            self.session_signing_secret.clone(),
        )
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("production", &self.production)
            .field("lockout", &self.lockout)
            .field("reauth_window", &self.reauth_window)
            .field("mfa_encryption_key", &self.mfa_encryption_key.as_ref().map(|_| "[REDACTED]"))
            .field("session_signing_secret", &"[REDACTED]")
            .finish()
    }
}

/// Builder for [`AuthConfig`] with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct AuthConfigBuilder {
    issuer: String,
    production: bool,
    lockout: LockoutPolicy,
    reauth_window: Duration,
    mfa_encryption_key: Option<SecretString>,
    session_signing_secret: Option<SecretString>,
}

impl AuthConfigBuilder {
    pub fn new() -> Self {
        Self {
            issuer: "App".to_string(),
            production: false,
            lockout: LockoutPolicy::default(),
            reauth_window: DEFAULT_REAUTH_WINDOW,
            mfa_encryption_key: None,
            session_signing_secret: None,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    pub fn with_reauth_window(mut self, window: Duration) -> Self {
        self.reauth_window = window;
        self
    }

    /// Dedicated key for MFA secret encryption. Optional outside
    /// production; required in production.
    pub fn with_mfa_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.mfa_encryption_key = Some(SecretString::new(key.into()));
        self
    }

    /// The secret used to sign session tokens. Required; also the legacy
    /// decryption key and the non-production fallback for encryption.
    pub fn with_session_signing_secret(mut self, secret: impl Into<String>) -> Self {
        self.session_signing_secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Load settings from environment variables:
    /// `PALISADE_ISSUER`, `PALISADE_PRODUCTION`, `MFA_ENCRYPTION_KEY`,
    /// `SESSION_SIGNING_SECRET`.
    pub fn from_env(mut self) -> Self {
        if let Ok(issuer) = std::env::var("PALISADE_ISSUER") {
            self.issuer = issuer;
        }
        if let Ok(production) = std::env::var("PALISADE_PRODUCTION") {
            self.production = production.parse().unwrap_or(false);
        }
        if let Ok(key) = std::env::var("MFA_ENCRYPTION_KEY") {
            if !key.is_empty() {
                self.mfa_encryption_key = Some(SecretString::new(key));
            }
        }
        if let Ok(secret) = std::env::var("SESSION_SIGNING_SECRET") {
            if !secret.is_empty() {
                self.session_signing_secret = Some(SecretString::new(secret));
            }
        }
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// - Missing or empty session signing secret.
    /// - Production mode without a dedicated MFA encryption key: the
    ///   session-secret fallback is a development convenience only, so
    ///   this is fatal before any cipher is ever constructed.
    /// - Zero-valued lockout policy fields.
    pub fn build(self) -> Result<AuthConfig> {
        let session_signing_secret = self
            .session_signing_secret
            .filter(|s| !s.expose_secret().is_empty())
            .ok_or_else(|| {
                PalisadeError::config("SESSION_SIGNING_SECRET is required and must be non-empty")
            })?;

        if self.production && self.mfa_encryption_key.is_none() {
            return Err(PalisadeError::config(
                "MFA_ENCRYPTION_KEY is required in production; refusing to fall back \
                 to the session signing secret",
            ));
        }

        if self.lockout.max_attempts == 0 {
            return Err(PalisadeError::config(
                "Lockout max_attempts must be greater than 0",
            ));
        }
        if self.lockout.lockout_duration.is_zero() {
            return Err(PalisadeError::config(
                "Lockout duration must be greater than 0",
            ));
        }

        Ok(AuthConfig {
            issuer: self.issuer,
            production: self.production,
            lockout: self.lockout,
            reauth_window: self.reauth_window,
            mfa_encryption_key: self.mfa_encryption_key,
            session_signing_secret,
        })
    }
}

impl Default for AuthConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
