//! Integration tests for the wire protection chain
//!
//! Validates the sender-side ordering (compress, encrypt, sign) against the
//! receiver-side ordering (verify, decrypt, decompress) across the
//! compression, crypto and integrity modules.

#![cfg(feature = "runtime")]

use rand::rngs::OsRng;
use tally_common::crypto::{
    load_private_key_pem, load_public_key_pem, RsaPrivateKey, RsaPublicKey,
};
use tally_common::{
    CompressionService, ConfidentialityGuard, CryptoError, EncryptedEnvelope, IntegrityError,
    IntegrityGuard,
};

fn keypair() -> (RsaPrivateKey, RsaPublicKey) {
    let private = RsaPrivateKey::new(&mut OsRng, 1024).expect("key generation should succeed");
    let public = RsaPublicKey::from(&private);
    (private, public)
}

fn seal(batch: &[u8], public: &RsaPublicKey, guard: &IntegrityGuard) -> (Vec<u8>, String) {
    let compressed = CompressionService::default().compress(batch).expect("compress");
    let envelope = ConfidentialityGuard::encrypt(&compressed, public).expect("encrypt");
    let wire = envelope.to_json_bytes().expect("serialize envelope");
    let hash = guard.sign(&wire);
    (wire, hash)
}

/// End-to-end chain: what the sender puts on the wire is exactly what the
/// receiver verifies and opens.
#[test]
fn sender_and_receiver_chains_agree() {
    let (private, public) = keypair();
    let guard = IntegrityGuard::new("shared-secret").expect("guard");
    let batch = br#"[{"id":"PollCount","type":"counter","delta":3},{"id":"Alloc","type":"gauge","value":12.5}]"#;

    let (wire, hash) = seal(batch, &public, &guard);

    guard.verify(&wire, &hash).expect("hash over wire bytes should verify");
    let envelope = EncryptedEnvelope::from_json_slice(&wire).expect("envelope");
    let compressed = ConfidentialityGuard::decrypt(&envelope, &private).expect("decrypt");
    let plain = CompressionService::default().decompress(&compressed).expect("decompress");

    assert_eq!(plain.as_slice(), batch);
}

/// The hash covers the post-encryption bytes, so a hash computed over the
/// plaintext must not verify.
#[test]
fn hash_over_plaintext_does_not_verify_wire_bytes() {
    let (_, public) = keypair();
    let guard = IntegrityGuard::new("shared-secret").expect("guard");
    let batch = br#"[{"id":"x","type":"gauge","value":1}]"#;

    let (wire, _) = seal(batch, &public, &guard);
    let plaintext_hash = guard.sign(batch);

    assert!(matches!(guard.verify(&wire, &plaintext_hash), Err(IntegrityError::Mismatch)));
}

/// A tampered wire body fails integrity before decryption is attempted, and
/// decryption alone also refuses the tampered envelope.
#[test]
fn tampered_wire_body_is_rejected_at_every_layer() {
    let (private, public) = keypair();
    let guard = IntegrityGuard::new("shared-secret").expect("guard");
    let (wire, hash) = seal(b"[]", &public, &guard);

    let mut envelope = EncryptedEnvelope::from_json_slice(&wire).expect("envelope");
    let mut data = envelope.data.into_bytes();
    let last = data.len() - 3;
    data[last] = if data[last] == b'A' { b'B' } else { b'A' };
    envelope.data = String::from_utf8(data).expect("ascii");
    let tampered = envelope.to_json_bytes().expect("serialize");

    assert!(guard.verify(&tampered, &hash).is_err());
    assert!(matches!(
        ConfidentialityGuard::decrypt(&envelope, &private),
        Err(CryptoError::Decryption(_))
    ));
}

/// Key material written as PEM files loads back into working keys.
#[test]
fn pem_key_files_round_trip() {
    use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    let (private, public) = keypair();
    let dir = tempfile::TempDir::new().expect("tempdir");
    let public_path = dir.path().join("public.pem");
    let private_path = dir.path().join("private.pem");
    std::fs::write(&public_path, public.to_public_key_pem(LineEnding::LF).expect("pem"))
        .expect("write public key");
    std::fs::write(&private_path, private.to_pkcs8_pem(LineEnding::LF).expect("pem").as_bytes())
        .expect("write private key");

    let loaded_public =
        tally_common::crypto::load_public_key_file(&public_path).expect("load public key");
    let loaded_private =
        tally_common::crypto::load_private_key_file(&private_path).expect("load private key");

    let envelope = ConfidentialityGuard::encrypt(b"payload", &loaded_public).expect("encrypt");
    let plain = ConfidentialityGuard::decrypt(&envelope, &loaded_private).expect("decrypt");
    assert_eq!(plain, b"payload");

    let pem = std::fs::read_to_string(&public_path).expect("read");
    assert_eq!(load_public_key_pem(&pem).expect("parse"), public);
    assert!(load_private_key_pem(&pem).is_err(), "public PEM is not a private key");
}
