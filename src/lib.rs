//! Palisade - authentication-security core
//!
//! Building blocks for the hard parts of login security: TOTP multi-factor
//! authentication, versioned at-rest encryption of MFA secrets, one-time
//! backup-code recovery, and account lockout on repeated failures.
//!
//! Palisade is deliberately not a web framework. An upstream identity
//! provider supplies the verified principal, a relational store persists
//! records behind the [`mfa::MfaStore`] / [`lockout::LockoutStore`] traits,
//! an [`audit::AuditSink`] receives security events, and your HTTP layer
//! exposes the operations.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use palisade::{AuthConfig, ReauthCache, TracingAuditSink};
//! use palisade::mfa::{InMemoryMfaStore, MfaFlow, MfaService};
//! use std::sync::Arc;
//!
//! # async fn run() -> palisade::Result<()> {
//! palisade::init_tracing();
//!
//! let config = AuthConfig::builder()
//!     .with_issuer("MyApp")
//!     .from_env()
//!     .build()?;
//!
//! let service = MfaService::new(
//!     InMemoryMfaStore::new(),
//!     config.secret_cipher(),
//!     &config.issuer,
//!     Arc::new(TracingAuditSink),
//! );
//! let mfa = MfaFlow::new(service, ReauthCache::new(config.reauth_window));
//!
//! let setup = mfa.setup("user-1", "user@example.com").await?;
//! println!("Scan: {}", setup.otpauth_uri);
//! # Ok(())
//! # }
//! ```

pub mod audit;
mod config;
mod error;
pub mod lockout;
pub mod mfa;
mod reauth;
pub mod totp;

// Re-exports for public API
pub use audit::{AuditEvent, AuditSink, RecordingAuditSink, TracingAuditSink};
pub use config::{AuthConfig, AuthConfigBuilder};
pub use error::{PalisadeError, Result};
pub use lockout::{
    lockout_message, InMemoryLockoutStore, LockoutManager, LockoutPolicy, LockoutRecord,
    LockoutStatus, LockoutStore,
};
pub use mfa::{
    BackupCodeGenerator, InMemoryMfaStore, MfaFlow, MfaRecord, MfaService, MfaSetup, MfaStatus,
    MfaStore, SecretCipher,
};
pub use reauth::ReauthCache;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "palisade=debug")
/// - `PALISADE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("PALISADE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
