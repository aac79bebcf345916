//! Backup codes for account recovery.
//!
//! Codes are shown to the user in plaintext exactly once, at generation
//! time. Only one-way hashes are ever persisted; [`hash_code`] and
//! [`verify_hash`] carry that contract.

use crate::error::{PalisadeError, Result};
use argon2::{
    password_hash::{rand_core::OsRng as HashOsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::{rngs::OsRng, Rng};

// No 0/O or 1/I/L to avoid transcription mistakes
const CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Default number of codes per batch.
pub const DEFAULT_CODE_COUNT: usize = 10;
/// Default length of each code.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Generates cryptographically secure backup codes.
#[derive(Clone, Debug)]
pub struct BackupCodeGenerator {
    /// Number of codes to generate (default: 10).
    pub count: usize,
    /// Length of each code (default: 8).
    pub length: usize,
}

impl Default for BackupCodeGenerator {
    fn default() -> Self {
        Self {
            count: DEFAULT_CODE_COUNT,
            length: DEFAULT_CODE_LENGTH,
        }
    }
}

impl BackupCodeGenerator {
    /// Create a generator with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of codes to generate.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Set the length of each code.
    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Generate a new batch of plaintext codes.
    ///
    /// Each character is drawn with an independent CSPRNG index into the
    /// unambiguous alphabet.
    pub fn generate(&self) -> Vec<String> {
        let mut rng = OsRng;
        (0..self.count)
            .map(|_| {
                (0..self.length)
                    .map(|_| {
                        let idx = rng.gen_range(0..CHARSET.len());
                        CHARSET[idx] as char
                    })
                    .collect()
            })
            .collect()
    }
}

/// Format codes for display to the user (grouped for readability).
pub fn display_codes(codes: &[String]) -> Vec<String> {
    codes
        .iter()
        .map(|c| {
            if c.len() >= 8 {
                format!("{}-{}", &c[..4], &c[4..])
            } else {
                c.clone()
            }
        })
        .collect()
}

/// Normalize user input before hashing or verification: uppercase and
/// strip everything that is not a letter or digit (dashes, spaces).
pub fn normalize(code: &str) -> String {
    code.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// One-way hash of a (normalized) backup code, as an Argon2id PHC string.
pub fn hash_code(code: &str) -> Result<String> {
    let salt = SaltString::generate(&mut HashOsRng);
    build_argon2()?
        .hash_password(normalize(code).as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PalisadeError::internal(format!("Backup code hashing failed: {}", e)))
}

/// Verify a normalized code against a stored hash.
///
/// Argon2's verifier performs the comparison in constant time; a hash that
/// fails to parse verifies as false rather than erroring, since a corrupt
/// stored hash is indistinguishable from a non-match to the caller.
/// Parameters are read from the stored PHC string, so hashes written under
/// older settings keep verifying.
pub fn verify_hash(normalized_code: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(normalized_code.as_bytes(), &parsed)
        .is_ok()
}

// 4 MiB / t=3: ten codes are hashed per setup call, and each code has
// ~40 bits of entropy (vs. typical passwords).
fn build_argon2() -> Result<Argon2<'static>> {
    let params = Params::new(4 * 1024, 3, 1, None)
        .map_err(|e| PalisadeError::internal(format!("Invalid Argon2 params: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_codes() {
        let generator = BackupCodeGenerator::new();
        let codes = generator.generate();

        assert_eq!(codes.len(), 10);
        assert!(codes.iter().all(|c| c.len() == 8));
        assert!(codes
            .iter()
            .all(|c| c.bytes().all(|b| CHARSET.contains(&b))));
    }

    #[test]
    fn test_charset_excludes_ambiguous_glyphs() {
        for forbidden in [b'0', b'O', b'1', b'I', b'L'] {
            assert!(!CHARSET.contains(&forbidden));
        }
    }

    #[test]
    fn test_custom_settings() {
        let generator = BackupCodeGenerator::new().with_count(5).with_length(10);
        let codes = generator.generate();

        assert_eq!(codes.len(), 5);
        assert!(codes.iter().all(|c| c.len() == 10));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("abcd-2345"), "ABCD2345");
        assert_eq!(normalize(" ab cd 23 45 "), "ABCD2345");
        assert_eq!(normalize("ABCD2345"), "ABCD2345");
    }

    #[test]
    fn test_display_codes() {
        let codes = vec!["ABCD2345".to_string()];
        assert_eq!(display_codes(&codes), vec!["ABCD-2345"]);
    }

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_code("ABCD2345").unwrap();
        assert!(verify_hash("ABCD2345", &hash));
        assert!(!verify_hash("ABCD2346", &hash));

        // Hashing normalizes, so dashed input matches too
        let hash = hash_code("abcd-2345").unwrap();
        assert!(verify_hash("ABCD2345", &hash));
    }

    #[test]
    fn test_verify_corrupt_hash_is_false() {
        assert!(!verify_hash("ABCD2345", "not-a-phc-string"));
    }
}
