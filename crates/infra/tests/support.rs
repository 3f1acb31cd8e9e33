#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, OnceLock};

use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use tally_common::crypto::{RsaPrivateKey, RsaPublicKey};
use tally_domain::{DatabaseConfig, RetrySettings};
use tally_infra::DurableStore;
use tempfile::TempDir;

/// Retry schedule short enough for tests: 10ms, 20ms, stop.
pub fn fast_retry() -> RetrySettings {
    RetrySettings { initial_interval_ms: 10, increment_ms: 10, max_attempts: 2 }
}

/// Temporary durable store that keeps its directory alive.
pub struct TestDurableStore {
    pub store: Arc<DurableStore>,
    pub config: DatabaseConfig,
    _dir: TempDir,
}

impl TestDurableStore {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut DatabaseConfig)) -> Self {
        let dir = TempDir::new().expect("temp dir should be created");
        let mut config =
            DatabaseConfig { path: dir.path().join("metrics.db"), ..DatabaseConfig::default() };
        adjust(&mut config);

        let store = DurableStore::open(&config, fast_retry()).expect("durable store should open");
        Self { store: Arc::new(store), config, _dir: dir }
    }

    /// Execute raw SQL against the store's database.
    pub fn execute_batch(&self, sql: &str) {
        let conn = self.store.db().get_connection().expect("connection should be available");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }

    /// Make any insert of the metric `poison` fail with a constraint error.
    pub fn install_poison_trigger(&self) {
        self.execute_batch(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON metrics
             WHEN NEW.name = 'poison'
             BEGIN SELECT RAISE(ABORT, 'poisoned metric'); END;",
        );
    }
}

/// Process-wide RSA test keypair (1024 bits keeps generation fast).
pub fn keypair() -> &'static (RsaPrivateKey, RsaPublicKey) {
    static KEYS: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
    KEYS.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut OsRng, 1024).expect("key generation should succeed");
        let public = RsaPublicKey::from(&private);
        (private, public)
    })
}

/// Write the test keypair as PEM files; returns (private, public) paths.
pub fn write_keypair(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let (private, public) = keypair();
    let private_path = dir.join("private.pem");
    let public_path = dir.join("public.pem");

    let private_pem = private.to_pkcs8_pem(LineEnding::LF).expect("private key should encode");
    let public_pem = public.to_public_key_pem(LineEnding::LF).expect("public key should encode");
    std::fs::write(&private_path, private_pem.as_bytes()).expect("private key should write");
    std::fs::write(&public_path, public_pem).expect("public key should write");

    (private_path, public_path)
}
