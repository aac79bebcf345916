use std::fmt;

/// The main error type for Palisade operations.
///
/// Authentication *outcomes* (wrong code, wrong backup code) are not errors;
/// they are `bool`/`Option` results. Variants here cover input-format
/// problems, invalid state transitions, integrity failures, and the
/// infrastructure underneath.
#[derive(Debug, thiserror::Error)]
pub enum PalisadeError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("MFA is not enabled for this account")]
    MfaNotEnabled,

    #[error("MFA is already enabled for this account")]
    MfaAlreadyEnabled,

    /// GCM tag mismatch, corrupt ciphertext framing, or a wrong key.
    /// Never downgraded to a boolean outcome: tampered data must fail hard.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl PalisadeError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn storage(msg: impl fmt::Display) -> Self {
        Self::Storage(msg.to_string())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convenience result type for Palisade operations.
pub type Result<T> = std::result::Result<T, PalisadeError>;
