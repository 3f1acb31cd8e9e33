//! Keyed-hash integrity for wire bytes.
//!
//! The hash is HMAC-SHA256 over the exact bytes placed on the wire, rendered
//! as lowercase hex. Verification decodes the provided hex and compares in
//! constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use crate::error::CommonError;
use crate::impl_error_classification;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised by the integrity guard
#[derive(Debug, Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("Invalid integrity key: {0}")]
    InvalidKey(String),

    #[error("Malformed integrity hash: {0}")]
    MalformedHash(String),

    #[error("Integrity hash mismatch")]
    Mismatch,
}

impl_error_classification!(IntegrityError, Common,
    Self::InvalidKey(_) | Self::MalformedHash(_) | Self::Mismatch => { retryable: false },
);

/// Result type for integrity operations
pub type IntegrityResult<T> = Result<T, IntegrityError>;

/// Signs and verifies payloads with a shared secret.
#[derive(Clone)]
pub struct IntegrityGuard {
    mac: HmacSha256,
}

impl std::fmt::Debug for IntegrityGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityGuard").field("key", &"[REDACTED]").finish()
    }
}

impl IntegrityGuard {
    /// Create a guard for a non-empty shared key.
    pub fn new(shared_key: impl AsRef<[u8]>) -> IntegrityResult<Self> {
        let key = shared_key.as_ref();
        if key.is_empty() {
            return Err(IntegrityError::InvalidKey("key must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| IntegrityError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    /// Hex-encoded HMAC-SHA256 of `payload`.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check `provided_hash` against `payload` in constant time.
    pub fn verify(&self, payload: &[u8], provided_hash: &str) -> IntegrityResult<()> {
        let expected = hex::decode(provided_hash.trim())
            .map_err(|e| IntegrityError::MalformedHash(e.to_string()))?;

        let mut mac = self.mac.clone();
        mac.update(payload);
        mac.verify_slice(&expected).map_err(|_| IntegrityError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for crypto::integrity.

    use super::*;
    use crate::error::ErrorClassification;

    /// Validates `IntegrityGuard::sign` behavior for the known vector
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the digest matches the RFC 4231 test case 2 output.
    #[test]
    fn sign_matches_known_vector() {
        let guard = IntegrityGuard::new("Jefe").unwrap();
        assert_eq!(
            guard.sign(b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    /// Validates `IntegrityGuard::verify` behavior for the matching hash
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a hash produced by `sign` verifies, including upper-case hex.
    #[test]
    fn verify_accepts_own_signature() {
        let guard = IntegrityGuard::new(b"secret").unwrap();
        let body = b"compressed-and-encrypted-bytes";
        let hash = guard.sign(body);

        assert!(guard.verify(body, &hash).is_ok());
        assert!(guard.verify(body, &hash.to_uppercase()).is_ok());
    }

    /// Validates `IntegrityGuard::verify` behavior for the tampered payload
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures a single flipped payload byte is a non-retryable mismatch.
    /// - Ensures a different key does not verify.
    #[test]
    fn verify_rejects_tampering() {
        let guard = IntegrityGuard::new("secret").unwrap();
        let body = b"payload".to_vec();
        let hash = guard.sign(&body);

        let mut tampered = body.clone();
        tampered[0] ^= 0x01;
        let err = guard.verify(&tampered, &hash).unwrap_err();
        assert!(matches!(err, IntegrityError::Mismatch));
        assert!(!err.is_retryable());

        let other = IntegrityGuard::new("other").unwrap();
        assert!(matches!(other.verify(&body, &hash), Err(IntegrityError::Mismatch)));
    }

    /// Validates `IntegrityGuard::verify` behavior for the malformed hash
    /// scenario.
    ///
    /// Assertions:
    /// - Ensures non-hex input is reported as malformed.
    /// - Ensures a truncated digest is a mismatch.
    #[test]
    fn verify_rejects_malformed_hash() {
        let guard = IntegrityGuard::new("secret").unwrap();
        assert!(matches!(guard.verify(b"x", "zz"), Err(IntegrityError::MalformedHash(_))));

        let truncated = &guard.sign(b"x")[..32];
        assert!(matches!(guard.verify(b"x", truncated), Err(IntegrityError::Mismatch)));
    }

    /// Validates `IntegrityGuard::new` behavior for the empty key scenario.
    ///
    /// Assertions:
    /// - Ensures an empty key is rejected.
    #[test]
    fn empty_key_is_rejected() {
        assert!(matches!(IntegrityGuard::new(""), Err(IntegrityError::InvalidKey(_))));
    }
}
