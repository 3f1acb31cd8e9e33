//! Wire payload protection.
//!
//! - [`envelope`]: hybrid RSA + AES-256-GCM confidentiality
//! - [`integrity`]: HMAC-SHA256 signing and constant-time verification

pub mod envelope;
pub mod error;
pub mod integrity;

pub use envelope::{
    load_private_key_file, load_private_key_pem, load_public_key_file, load_public_key_pem,
    ConfidentialityGuard, EncryptedEnvelope,
};
pub use error::{CryptoError, CryptoResult};
pub use integrity::{IntegrityError, IntegrityGuard, IntegrityResult};
pub use rsa::{RsaPrivateKey, RsaPublicKey};
