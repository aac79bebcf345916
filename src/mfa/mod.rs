//! Multi-factor authentication.
//!
//! TOTP enrollment and verification, backup-code recovery, and encrypted
//! at-rest storage of secrets.
//!
//! # Example
//!
//! ```rust,ignore
//! use palisade::mfa::{MfaFlow, MfaService, InMemoryMfaStore};
//! use palisade::{AuthConfig, ReauthCache, TracingAuditSink};
//! use std::sync::Arc;
//!
//! let config = AuthConfig::builder().from_env().build()?;
//! let service = MfaService::new(
//!     InMemoryMfaStore::new(),
//!     config.secret_cipher(),
//!     &config.issuer,
//!     Arc::new(TracingAuditSink),
//! );
//! let flow = MfaFlow::new(service, ReauthCache::new(config.reauth_window));
//!
//! let setup = flow.setup("user-1", "user@example.com").await?;
//! println!("Scan this: {}", setup.otpauth_uri);
//! ```

pub mod backup;
mod cipher;
mod flow;
mod service;
mod storage;

pub use backup::BackupCodeGenerator;
pub use cipher::SecretCipher;
pub use flow::{MfaFlow, MfaStatus};
pub use service::{MfaService, MfaSetup};
pub use storage::{InMemoryMfaStore, MfaRecord, MfaStore};
