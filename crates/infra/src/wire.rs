//! Wire framing shared by the delivery client and the ingestion router.
//!
//! Sender order: JSON, then gzip, then envelope encryption, then HMAC over
//! the resulting bytes. The receiver undoes it in reverse: verify the HMAC
//! over the raw body, decrypt, inflate, parse. Each stage is optional and
//! configured independently on both sides.

use std::path::Path;

use serde::Serialize;
use tally_common::crypto::{
    load_private_key_file, load_public_key_file, RsaPrivateKey, RsaPublicKey,
};
use tally_common::{CompressionService, ConfidentialityGuard, EncryptedEnvelope, IntegrityGuard};
use tally_domain::{AgentConfig, Result, ServerConfig, TallyError};

use crate::errors::conversions::infra_err;

/// Bytes ready to POST plus the headers that describe them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    pub body: Vec<u8>,
    /// Plaintext inside the (optional) envelope is gzip framed
    pub gzip: bool,
    /// Hex HMAC of `body`
    pub hash: Option<String>,
}

/// Sender half of the wire chain.
#[derive(Debug, Clone, Default)]
pub struct WireEncoder {
    compression: Option<CompressionService>,
    public_key: Option<RsaPublicKey>,
    integrity: Option<IntegrityGuard>,
}

impl WireEncoder {
    /// Plain JSON, no compression, no encryption, no signature.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_agent_config(config: &AgentConfig) -> Result<Self> {
        let mut encoder = Self::new();
        if config.compress {
            encoder = encoder.with_compression(CompressionService::default());
        }
        if let Some(path) = &config.public_key_path {
            encoder = encoder.with_public_key(read_public_key(path)?);
        }
        if let Some(key) = config.hash_key.as_deref().filter(|key| !key.is_empty()) {
            encoder = encoder.with_integrity(IntegrityGuard::new(key).map_err(infra_err)?);
        }
        Ok(encoder)
    }

    pub fn with_compression(mut self, compression: CompressionService) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_public_key(mut self, public_key: RsaPublicKey) -> Self {
        self.public_key = Some(public_key);
        self
    }

    pub fn with_integrity(mut self, integrity: IntegrityGuard) -> Self {
        self.integrity = Some(integrity);
        self
    }

    pub fn encode<T: Serialize + ?Sized>(&self, payload: &T) -> Result<EncodedPayload> {
        let mut body = serde_json::to_vec(payload)
            .map_err(|e| TallyError::Internal(format!("failed to serialise payload: {e}")))?;

        let gzip = match &self.compression {
            Some(compression) => {
                body = compression.compress(&body).map_err(infra_err)?;
                true
            }
            None => false,
        };

        if let Some(public_key) = &self.public_key {
            let envelope = ConfidentialityGuard::encrypt(&body, public_key).map_err(infra_err)?;
            body = envelope.to_json_bytes().map_err(infra_err)?;
        }

        let hash = self.integrity.as_ref().map(|guard| guard.sign(&body));
        Ok(EncodedPayload { body, gzip, hash })
    }
}

/// Receiver half of the wire chain.
#[derive(Debug, Clone, Default)]
pub struct WireDecoder {
    integrity: Option<IntegrityGuard>,
    private_key: Option<RsaPrivateKey>,
    compression: CompressionService,
}

impl WireDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_server_config(config: &ServerConfig) -> Result<Self> {
        let mut decoder = Self::new();
        if let Some(key) = config.hash_key.as_deref().filter(|key| !key.is_empty()) {
            decoder = decoder.with_integrity(IntegrityGuard::new(key).map_err(infra_err)?);
        }
        if let Some(path) = &config.private_key_path {
            decoder = decoder.with_private_key(read_private_key(path)?);
        }
        Ok(decoder)
    }

    pub fn with_integrity(mut self, integrity: IntegrityGuard) -> Self {
        self.integrity = Some(integrity);
        self
    }

    pub fn with_private_key(mut self, private_key: RsaPrivateKey) -> Self {
        self.private_key = Some(private_key);
        self
    }

    pub fn with_compression(mut self, compression: CompressionService) -> Self {
        self.compression = compression;
        self
    }

    /// Whether request bodies must carry a valid hash.
    pub fn verifies_integrity(&self) -> bool {
        self.integrity.is_some()
    }

    /// Check the integrity hash of a raw request body.
    ///
    /// A no-op when no key is configured. With a key, a missing hash is
    /// rejected like a mismatched one.
    pub fn verify(&self, body: &[u8], hash: Option<&str>) -> Result<()> {
        let Some(guard) = &self.integrity else {
            return Ok(());
        };
        let hash = hash
            .filter(|hash| !hash.trim().is_empty())
            .ok_or_else(|| TallyError::Integrity("missing integrity hash".to_string()))?;
        guard.verify(body, hash).map_err(infra_err)
    }

    /// Undo encryption and compression; `verify` must already have passed.
    pub fn open(&self, body: &[u8], gzip: bool) -> Result<Vec<u8>> {
        let plaintext = match &self.private_key {
            Some(private_key) => {
                let envelope = EncryptedEnvelope::from_json_slice(body).map_err(infra_err)?;
                ConfidentialityGuard::decrypt(&envelope, private_key).map_err(infra_err)?
            }
            None => body.to_vec(),
        };

        if gzip {
            return self.compression.decompress(&plaintext).map_err(infra_err);
        }
        Ok(plaintext)
    }

    /// Full receive chain: verify, decrypt, inflate.
    pub fn decode(&self, body: &[u8], hash: Option<&str>, gzip: bool) -> Result<Vec<u8>> {
        self.verify(body, hash)?;
        self.open(body, gzip)
    }

    /// Hash for a response body, when a key is configured.
    pub fn sign(&self, body: &[u8]) -> Option<String> {
        self.integrity.as_ref().map(|guard| guard.sign(body))
    }
}

fn read_public_key(path: &Path) -> Result<RsaPublicKey> {
    load_public_key_file(path).map_err(|e| {
        TallyError::Config(format!("cannot load public key {}: {e}", path.display()))
    })
}

fn read_private_key(path: &Path) -> Result<RsaPrivateKey> {
    load_private_key_file(path).map_err(|e| {
        TallyError::Config(format!("cannot load private key {}: {e}", path.display()))
    })
}
