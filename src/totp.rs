//! TOTP (Time-based One-Time Password) codec.
//!
//! Implements RFC 6238 code generation and verification over RFC 4648
//! Base32 secrets. Pure and stateless: every function here is
//! deterministic given its inputs, and the time-dependent entry points
//! have `_at` variants that pin the timestamp.

use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::{Choice, ConstantTimeEq};

type HmacSha1 = Hmac<Sha1>;

/// Number of digits in a code.
pub const DIGITS: usize = 6;
/// Time step in seconds.
pub const STEP_SECONDS: u64 = 30;
/// Secret length in bytes (160-bit entropy per RFC 4226 recommendation).
pub const SECRET_LEN: usize = 20;

/// Accepted clock-drift window, in steps either side of now.
const SKEW_STEPS: u64 = 1;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Generate a new Base32-encoded TOTP secret (20 random bytes).
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    OsRng.fill_bytes(&mut bytes);
    base32_encode(&bytes)
}

/// Encode bytes as RFC 4648 Base32, uppercase, without padding.
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            out.push(BASE32_ALPHABET[index] as char);
        }
    }

    if bits > 0 {
        let index = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(BASE32_ALPHABET[index] as char);
    }

    out
}

/// Decode an RFC 4648 Base32 string.
///
/// Lowercase input is accepted and any character outside the alphabet
/// (separators, `=` padding, whitespace) is skipped rather than rejected.
/// A trailing partial group is discarded, so this never fails.
pub fn base32_decode(input: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for ch in input.chars() {
        let upper = ch.to_ascii_uppercase();
        let Some(index) = BASE32_ALPHABET.iter().position(|&a| a as char == upper) else {
            continue;
        };
        buffer = (buffer << 5) | index as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }

    out
}

/// Generate the 6-digit code for a secret at the given Unix timestamp.
///
/// Malformed secrets decode to whatever bytes survive the tolerant Base32
/// pass; the result is still a well-formed 6-digit code (it just won't
/// match anything a correct authenticator produces).
pub fn generate_code(secret: &str, timestamp: u64) -> String {
    let key = base32_decode(secret);
    let counter = timestamp / STEP_SECONDS;
    format!("{:0width$}", hotp(&key, counter), width = DIGITS)
}

/// Verify a code against a secret using the current system time.
///
/// Accepts codes from the previous, current, and next time step to absorb
/// clock drift between the server and the authenticator device.
pub fn verify_code(secret: &str, code: &str) -> bool {
    verify_code_at(secret, code, unix_now())
}

/// Verify a code at a pinned timestamp.
///
/// All window candidates are compared in constant time and the results
/// OR-ed together, so a match at one offset is not observable through
/// timing.
pub fn verify_code_at(secret: &str, code: &str, timestamp: u64) -> bool {
    if code.len() != DIGITS || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let key = base32_decode(secret);
    let counter = timestamp / STEP_SECONDS;

    let mut matched = Choice::from(0u8);
    for offset in -(SKEW_STEPS as i64)..=(SKEW_STEPS as i64) {
        let candidate_counter = if offset < 0 {
            counter.saturating_sub(offset.unsigned_abs())
        } else {
            counter.saturating_add(offset as u64)
        };
        let expected = format!("{:0width$}", hotp(&key, candidate_counter), width = DIGITS);
        matched |= expected.as_bytes().ct_eq(code.as_bytes());
    }

    matched.into()
}

/// RFC 4226 HOTP: HMAC-SHA1 over the big-endian counter, dynamically
/// truncated to a 31-bit value, reduced modulo 10^DIGITS.
fn hotp(key: &[u8], counter: u64) -> u32 {
    // HMAC accepts keys of any length, so this cannot fail.
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((u32::from(digest[offset]) & 0x7f) << 24)
        | (u32::from(digest[offset + 1]) << 16)
        | (u32::from(digest[offset + 2]) << 8)
        | u32::from(digest[offset + 3]);

    binary % 10u32.pow(DIGITS as u32)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base32_round_trip() {
        for len in 0..=64 {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 7 + 13) as u8).collect();
            let encoded = base32_encode(&bytes);
            assert_eq!(base32_decode(&encoded), bytes, "length {}", len);
        }
    }

    #[test]
    fn test_base32_known_values() {
        // RFC 4648 test vectors, padding stripped
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "MY");
        assert_eq!(base32_encode(b"fo"), "MZXQ");
        assert_eq!(base32_encode(b"foo"), "MZXW6");
        assert_eq!(base32_encode(b"foob"), "MZXW6YQ");
        assert_eq!(base32_encode(b"fooba"), "MZXW6YTB");
        assert_eq!(base32_encode(b"foobar"), "MZXW6YTBOI");
    }

    #[test]
    fn test_base32_decode_tolerant() {
        assert_eq!(base32_decode("mzxw6ytboi"), b"foobar");
        assert_eq!(base32_decode("MZXW 6YTB-OI"), b"foobar");
        assert_eq!(base32_decode("MZXW6YTBOI======"), b"foobar");
        assert_eq!(base32_decode("!!!"), Vec::<u8>::new());
    }

    #[test]
    fn test_generate_secret_length() {
        let secret = generate_secret();
        // 20 bytes -> 32 Base32 characters
        assert_eq!(secret.len(), 32);
        assert_eq!(base32_decode(&secret).len(), SECRET_LEN);
    }

    #[test]
    fn test_hotp_rfc4226_vectors() {
        // RFC 4226 Appendix D, secret "12345678901234567890"
        let secret = b"12345678901234567890";
        let expected = [
            755224, 287082, 359152, 969429, 338314, 254676, 287922, 162583, 399871, 520489,
        ];
        for (counter, want) in expected.into_iter().enumerate() {
            assert_eq!(hotp(secret, counter as u64), want, "counter {}", counter);
        }
    }

    #[test]
    fn test_totp_rfc6238_vectors() {
        // RFC 6238 Appendix B, SHA-1 rows; 8-digit reference values
        // truncated to our 6 digits.
        let secret = base32_encode(b"12345678901234567890");
        assert_eq!(generate_code(&secret, 59), "287082");
        assert_eq!(generate_code(&secret, 1111111109), "081804");
        assert_eq!(generate_code(&secret, 1111111111), "050471");
        assert_eq!(generate_code(&secret, 1234567890), "005924");
        assert_eq!(generate_code(&secret, 2000000000), "279037");
    }

    #[test]
    fn test_verify_within_window() {
        let secret = generate_secret();
        let now = 1_700_000_000u64;
        let code = generate_code(&secret, now);

        assert!(verify_code_at(&secret, &code, now));
        assert!(verify_code_at(&secret, &code, now - STEP_SECONDS));
        assert!(verify_code_at(&secret, &code, now + STEP_SECONDS));
    }

    #[test]
    fn test_verify_outside_window() {
        let secret = generate_secret();
        let now = 1_700_000_000u64;
        // Pin to the middle of a step so ±90s is always out of the window.
        let now = now - (now % STEP_SECONDS) + STEP_SECONDS / 2;
        let code = generate_code(&secret, now);

        assert!(!verify_code_at(&secret, &code, now - 3 * STEP_SECONDS));
        assert!(!verify_code_at(&secret, &code, now + 3 * STEP_SECONDS));
    }

    #[test]
    fn test_verify_rejects_bad_format() {
        let secret = generate_secret();
        assert!(!verify_code_at(&secret, "12345", 0));
        assert!(!verify_code_at(&secret, "1234567", 0));
        assert!(!verify_code_at(&secret, "12345a", 0));
        assert!(!verify_code_at(&secret, "", 0));
    }

    #[test]
    fn test_malformed_secret_does_not_panic() {
        let code = generate_code("not!base32@at#all", 1_700_000_000);
        assert_eq!(code.len(), DIGITS);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));

        // Empty secret still yields a definitive (negative-or-positive) answer.
        let _ = verify_code_at("", "000000", 1_700_000_000);
    }
}
