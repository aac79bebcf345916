//! At-rest encryption of TOTP secrets.
//!
//! Two ciphertext formats are readable, one is written:
//!
//! - **V2** (`v2$` prefix): `salt(16) || iv(16) || tag(16) || ciphertext`,
//!   hex-encoded. The AES-256 key is derived per record with
//!   `scrypt(base_key, salt)` over a fresh random salt, and a fresh random
//!   IV is drawn for every encryption call.
//! - **Legacy** (no prefix): `iv(16) || tag(16) || ciphertext`, hex-encoded,
//!   key derived from the session signing secret with the fixed salt
//!   `"mfa-salt"`. Still decryptable for migration; never written.
//!
//! Both paths authenticate through the GCM tag and fail hard on tamper or
//! wrong key.

use crate::error::{PalisadeError, Result};
use aes_gcm::{
    aead::{generic_array::typenum::U16, Aead, KeyInit},
    aes::Aes256,
    AesGcm, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use scrypt::Params;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Once;

/// AES-256-GCM with a 16-byte nonce, matching the stored wire format.
type SecretAead = AesGcm<Aes256, U16>;

const VERSION_PREFIX: &str = "v2$";
const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Fixed salt of the legacy format. Every deployment derived the same key
/// from it, which is exactly why the V2 format exists.
const LEGACY_SALT: &[u8] = b"mfa-salt";

static FALLBACK_WARNING: Once = Once::new();

/// Parsed ciphertext, dispatched on the version prefix before any
/// cryptographic work.
#[derive(Debug)]
enum CipherFormat {
    V2 {
        salt: Vec<u8>,
        iv: Vec<u8>,
        tag: Vec<u8>,
        ciphertext: Vec<u8>,
    },
    Legacy {
        iv: Vec<u8>,
        tag: Vec<u8>,
        ciphertext: Vec<u8>,
    },
}

impl CipherFormat {
    fn parse(input: &str) -> Result<Self> {
        if let Some(body) = input.strip_prefix(VERSION_PREFIX) {
            let bytes = hex::decode(body)
                .map_err(|e| PalisadeError::Decryption(format!("Invalid hex in ciphertext: {}", e)))?;
            if bytes.len() < SALT_LEN + IV_LEN + TAG_LEN {
                return Err(PalisadeError::Decryption("Ciphertext too short".to_string()));
            }
            let (salt, rest) = bytes.split_at(SALT_LEN);
            let (iv, rest) = rest.split_at(IV_LEN);
            let (tag, ciphertext) = rest.split_at(TAG_LEN);
            Ok(Self::V2 {
                salt: salt.to_vec(),
                iv: iv.to_vec(),
                tag: tag.to_vec(),
                ciphertext: ciphertext.to_vec(),
            })
        } else {
            let bytes = hex::decode(input)
                .map_err(|e| PalisadeError::Decryption(format!("Invalid hex in ciphertext: {}", e)))?;
            if bytes.len() < IV_LEN + TAG_LEN {
                return Err(PalisadeError::Decryption("Ciphertext too short".to_string()));
            }
            let (iv, rest) = bytes.split_at(IV_LEN);
            let (tag, ciphertext) = rest.split_at(TAG_LEN);
            Ok(Self::Legacy {
                iv: iv.to_vec(),
                tag: tag.to_vec(),
                ciphertext: ciphertext.to_vec(),
            })
        }
    }
}

/// Encrypts and decrypts MFA secrets at rest.
///
/// Construct via [`crate::AuthConfig::secret_cipher`]; production
/// configurations refuse to build without a dedicated encryption key, so
/// the session-secret fallback can only occur in non-production deployments.
#[derive(Clone)]
pub struct SecretCipher {
    mfa_key: Option<SecretString>,
    session_secret: SecretString,
}

impl SecretCipher {
    pub fn new(mfa_key: Option<SecretString>, session_secret: SecretString) -> Self {
        Self {
            mfa_key,
            session_secret,
        }
    }

    /// Encrypt a plaintext secret, always emitting the V2 format.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let key = derive_key(self.base_key().as_bytes(), &salt)?;
        let cipher = SecretAead::new(Key::<SecretAead>::from_slice(&key));

        let mut sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| PalisadeError::internal("Encryption failed"))?;

        // The AEAD API appends the tag; the wire format carries it between
        // the IV and the ciphertext.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        let mut out = String::with_capacity(
            VERSION_PREFIX.len() + 2 * (SALT_LEN + IV_LEN + TAG_LEN + sealed.len()),
        );
        out.push_str(VERSION_PREFIX);
        out.push_str(&hex::encode(salt));
        out.push_str(&hex::encode(iv));
        out.push_str(&hex::encode(tag));
        out.push_str(&hex::encode(sealed));
        Ok(out)
    }

    /// Decrypt a ciphertext in either format, dispatching on the version
    /// prefix.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let (key, iv, tag, body) = match CipherFormat::parse(ciphertext)? {
            CipherFormat::V2 {
                salt,
                iv,
                tag,
                ciphertext,
            } => {
                let key = derive_key(self.base_key().as_bytes(), &salt)?;
                (key, iv, tag, ciphertext)
            }
            CipherFormat::Legacy { iv, tag, ciphertext } => {
                let key = derive_key(self.session_secret.expose_secret().as_bytes(), LEGACY_SALT)?;
                (key, iv, tag, ciphertext)
            }
        };

        let cipher = SecretAead::new(Key::<SecretAead>::from_slice(&key));

        let mut sealed = body;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_ref())
            .map_err(|_| {
                PalisadeError::Decryption("Authentication failed (tampered data or wrong key)".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| PalisadeError::Decryption("Decrypted data is not valid UTF-8".to_string()))
    }

    /// Resolve the base key material for V2 derivation.
    ///
    /// Private on purpose: this is a master-key oracle and must not leak
    /// outside the cipher. The session-secret fallback warns once per
    /// process lifetime.
    fn base_key(&self) -> &str {
        match &self.mfa_key {
            Some(key) => key.expose_secret(),
            None => {
                FALLBACK_WARNING.call_once(|| {
                    tracing::warn!(
                        target: "auth.mfa.cipher",
                        "MFA_ENCRYPTION_KEY not set; falling back to the session \
                         signing secret for MFA secret encryption"
                    );
                });
                self.session_secret.expose_secret()
            }
        }
    }

    /// Produce a legacy-format ciphertext. Test-only: the legacy path is
    /// read-only in production code, but round-trip coverage needs a writer.
    #[cfg(test)]
    fn encrypt_legacy(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut iv);

        let key = derive_key(self.session_secret.expose_secret().as_bytes(), LEGACY_SALT)?;
        let cipher = SecretAead::new(Key::<SecretAead>::from_slice(&key));

        let mut sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| PalisadeError::internal("Encryption failed"))?;
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}{}{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(sealed)
        ))
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("mfa_key", &self.mfa_key.as_ref().map(|_| "[REDACTED]"))
            .field("session_secret", &"[REDACTED]")
            .finish()
    }
}

/// scrypt with the deployed parameters: N=2^14, r=8, p=1, 32-byte output.
fn derive_key(base: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(14, 8, 1, KEY_LEN)
        .map_err(|e| PalisadeError::internal(format!("Invalid scrypt parameters: {}", e)))?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(base, salt, &params, &mut key)
        .map_err(|e| PalisadeError::internal(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher_with_dedicated_key() -> SecretCipher {
        SecretCipher::new(
            Some(SecretString::new("test-mfa-encryption-key".to_string())),
            SecretString::new("test-session-signing-secret".to_string()),
        )
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher_with_dedicated_key();
        for plaintext in ["JBSWY3DPEHPK3PXP", "", "unicode ✓ secret", "a"] {
            let sealed = cipher.encrypt(plaintext).unwrap();
            assert!(sealed.starts_with("v2$"));
            assert_eq!(cipher.decrypt(&sealed).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_salt_and_iv_per_call() {
        let cipher = cipher_with_dedicated_key();
        let a = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        let b = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert_ne!(a, b);
        // Salts differ, not just IVs
        assert_ne!(&a[3..3 + 32], &b[3..3 + 32]);
    }

    #[test]
    fn test_tamper_fails_hard() {
        let cipher = cipher_with_dedicated_key();
        let sealed = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();

        // Flip one hex character of the ciphertext body
        let mut chars: Vec<char> = sealed.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        let result = cipher.decrypt(&tampered);
        assert!(matches!(result, Err(PalisadeError::Decryption(_))));
    }

    #[test]
    fn test_wrong_key_fails_hard() {
        let cipher = cipher_with_dedicated_key();
        let other = SecretCipher::new(
            Some(SecretString::new("a-different-key".to_string())),
            SecretString::new("test-session-signing-secret".to_string()),
        );

        let sealed = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert!(matches!(
            other.decrypt(&sealed),
            Err(PalisadeError::Decryption(_))
        ));
    }

    #[test]
    fn test_legacy_format_decrypts_without_hints() {
        let cipher = cipher_with_dedicated_key();
        let legacy = cipher.encrypt_legacy("JBSWY3DPEHPK3PXP").unwrap();
        assert!(!legacy.starts_with("v2$"));
        assert_eq!(cipher.decrypt(&legacy).unwrap(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn test_legacy_tamper_fails_hard() {
        let cipher = cipher_with_dedicated_key();
        let legacy = cipher.encrypt_legacy("JBSWY3DPEHPK3PXP").unwrap();
        let mut bytes = hex::decode(&legacy).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&hex::encode(bytes)),
            Err(PalisadeError::Decryption(_))
        ));
    }

    #[test]
    fn test_malformed_ciphertext_rejected() {
        let cipher = cipher_with_dedicated_key();
        assert!(cipher.decrypt("v2$zz-not-hex").is_err());
        assert!(cipher.decrypt("v2$00ff").is_err()); // too short
        assert!(cipher.decrypt("00ff").is_err()); // too short, legacy path
    }

    #[test]
    fn test_fallback_key_roundtrip_and_warning() {
        let cipher = SecretCipher::new(
            None,
            SecretString::new("test-session-signing-secret".to_string()),
        );
        let sealed = cipher.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "JBSWY3DPEHPK3PXP");

        // The one-time warning has fired; Once guarantees it cannot fire again.
        assert!(FALLBACK_WARNING.is_completed());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let cipher = cipher_with_dedicated_key();
        let debug = format!("{:?}", cipher);
        assert!(!debug.contains("test-mfa-encryption-key"));
        assert!(!debug.contains("test-session-signing-secret"));
    }
}
