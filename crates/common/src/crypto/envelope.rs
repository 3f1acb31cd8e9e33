//! Hybrid envelope encryption.
//!
//! A fresh 256-bit AES-GCM key seals the payload; the key itself is sealed
//! with the recipient's RSA public key (PKCS#1 v1.5). All three outputs are
//! base64 encoded into an [`EncryptedEnvelope`], serialised on the wire as
//! `{"aes_key": .., "data": .., "nonce": ..}`.
//!
//! ```rust,ignore
//! use tally_common::crypto::{ConfidentialityGuard, load_private_key_pem, load_public_key_pem};
//!
//! let envelope = ConfidentialityGuard::encrypt(b"batch", &public_key)?;
//! let plaintext = ConfidentialityGuard::decrypt(&envelope, &private_key)?;
//! assert_eq!(plaintext, b"batch");
//! ```

use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::crypto::error::{CryptoError, CryptoResult};

/// Symmetric key length in bytes (AES-256).
pub const SYMMETRIC_KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Transport-safe encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// RSA-sealed symmetric key, base64.
    pub aes_key: String,
    /// AES-GCM ciphertext including the authentication tag, base64.
    pub data: String,
    /// AES-GCM nonce, base64.
    pub nonce: String,
}

impl EncryptedEnvelope {
    /// Serialise to the JSON wire form.
    pub fn to_json_bytes(&self) -> CryptoResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse the JSON wire form.
    ///
    /// A body that is not an envelope is a decryption failure, not a
    /// serialisation one: the receiver expected ciphertext.
    pub fn from_json_slice(bytes: &[u8]) -> CryptoResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::Decryption(format!("malformed envelope: {e}")))
    }
}

/// Stateless hybrid encryption entry points.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidentialityGuard;

impl ConfidentialityGuard {
    /// Seal `plaintext` for the holder of `public_key`.
    pub fn encrypt(plaintext: &[u8], public_key: &RsaPublicKey) -> CryptoResult<EncryptedEnvelope> {
        let mut rng = OsRng;

        let mut key = [0u8; SYMMETRIC_KEY_LEN];
        rng.fill_bytes(&mut key);
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::Encryption(format!("failed to create cipher: {e}")))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(format!("payload encryption failed: {e}")))?;

        let sealed_key = public_key
            .encrypt(&mut rng, Pkcs1v15Encrypt, &key)
            .map_err(|e| CryptoError::Encryption(format!("key encryption failed: {e}")))?;

        Ok(EncryptedEnvelope {
            aes_key: BASE64.encode(sealed_key),
            data: BASE64.encode(ciphertext),
            nonce: BASE64.encode(nonce),
        })
    }

    /// Open an envelope with the recipient's private key.
    ///
    /// Every failure (encoding, padding, key length, nonce length, tag
    /// mismatch) is reported as [`CryptoError::Decryption`]; no partial or
    /// unauthenticated plaintext is ever returned.
    pub fn decrypt(envelope: &EncryptedEnvelope, private_key: &RsaPrivateKey) -> CryptoResult<Vec<u8>> {
        let sealed_key = decode_field("aes_key", &envelope.aes_key)?;
        let ciphertext = decode_field("data", &envelope.data)?;
        let nonce = decode_field("nonce", &envelope.nonce)?;

        if nonce.len() != NONCE_LEN {
            return Err(CryptoError::Decryption(format!(
                "nonce must be {NONCE_LEN} bytes, got {}",
                nonce.len()
            )));
        }

        let key = private_key
            .decrypt(Pkcs1v15Encrypt, &sealed_key)
            .map_err(|e| CryptoError::Decryption(format!("key decryption failed: {e}")))?;
        if key.len() != SYMMETRIC_KEY_LEN {
            return Err(CryptoError::Decryption(format!(
                "symmetric key must be {SYMMETRIC_KEY_LEN} bytes, got {}",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::Decryption(format!("failed to create cipher: {e}")))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| CryptoError::Decryption("authentication tag mismatch".to_string()))
    }
}

fn decode_field(field: &str, value: &str) -> CryptoResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| CryptoError::Decryption(format!("invalid base64 in '{field}': {e}")))
}

/// Parse an RSA public key from PEM (SPKI `PUBLIC KEY` or PKCS#1
/// `RSA PUBLIC KEY`).
pub fn load_public_key_pem(pem: &str) -> CryptoResult<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKey(format!("unreadable RSA public key: {e}")))
}

/// Parse an RSA private key from PEM (PKCS#8 `PRIVATE KEY` or PKCS#1
/// `RSA PRIVATE KEY`).
pub fn load_private_key_pem(pem: &str) -> CryptoResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| CryptoError::InvalidKey(format!("unreadable RSA private key: {e}")))
}

/// Read and parse a PEM public key file.
pub fn load_public_key_file(path: &Path) -> CryptoResult<RsaPublicKey> {
    let pem = std::fs::read_to_string(path)?;
    load_public_key_pem(&pem)
}

/// Read and parse a PEM private key file.
pub fn load_private_key_file(path: &Path) -> CryptoResult<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)?;
    load_private_key_pem(&pem)
}
