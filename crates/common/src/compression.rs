//! Gzip framing for batch payloads.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

use crate::error::CommonError;
use crate::impl_error_classification;

/// Errors raised while (de)compressing payloads
#[derive(Debug, Error)]
pub enum CompressionError {
    #[error(transparent)]
    Common(#[from] CommonError),

    #[error("Gzip compression failed: {0}")]
    Compress(String),

    #[error("Gzip decompression failed: {0}")]
    Decompress(String),

    #[error("Decompressed payload exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

impl_error_classification!(CompressionError, Common,
    Self::Compress(_) | Self::Decompress(_) | Self::TooLarge { .. } => { retryable: false },
);

/// Result type for compression operations
pub type CompressionResult<T> = Result<T, CompressionError>;

/// Default ceiling for inflated request bodies (16 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_BYTES: usize = 16 * 1024 * 1024;

/// Gzip compressor with a bounded decompressor.
#[derive(Debug, Clone, Copy)]
pub struct CompressionService {
    level: u32,
    max_decompressed: usize,
}

impl Default for CompressionService {
    fn default() -> Self {
        Self { level: 6, max_decompressed: DEFAULT_MAX_DECOMPRESSED_BYTES }
    }
}

impl CompressionService {
    /// Cap the size a decompressed payload may reach.
    pub fn with_max_decompressed(mut self, limit: usize) -> Self {
        self.max_decompressed = limit;
        self
    }

    /// Compress data
    pub fn compress(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data).map_err(|e| CompressionError::Compress(e.to_string()))?;
        encoder.finish().map_err(|e| CompressionError::Compress(e.to_string()))
    }

    /// Decompress data
    pub fn decompress(&self, data: &[u8]) -> CompressionResult<Vec<u8>> {
        let limit = self.max_decompressed as u64;
        let mut decoder = GzDecoder::new(data).take(limit.saturating_add(1));
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| CompressionError::Decompress(e.to_string()))?;

        if decompressed.len() as u64 > limit {
            return Err(CompressionError::TooLarge { limit: self.max_decompressed });
        }
        Ok(decompressed)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for compression.

    use super::*;

    /// Validates `CompressionService::compress` behavior for the gzip framing
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms output starts with the gzip magic bytes.
    /// - Confirms decompression restores the input.
    #[test]
    fn compress_produces_gzip_stream() {
        let service = CompressionService::default();
        let payload = br#"[{"id":"Alloc","type":"gauge","value":1024.5}]"#.repeat(20);

        let compressed = service.compress(&payload).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert!(compressed.len() < payload.len());
        assert_eq!(service.decompress(&compressed).unwrap(), payload);
    }

    /// Validates `CompressionService::decompress` behavior for the corrupt
    /// input scenario.
    ///
    /// Assertions:
    /// - Ensures non-gzip input is a decompression error.
    #[test]
    fn decompress_rejects_garbage() {
        let service = CompressionService::default();
        let err = service.decompress(b"plain json, not gzip").unwrap_err();
        assert!(matches!(err, CompressionError::Decompress(_)));
    }

    /// Validates `CompressionService::with_max_decompressed` behavior for the
    /// oversized payload scenario.
    ///
    /// Assertions:
    /// - Ensures inflating past the limit fails with `TooLarge`.
    #[test]
    fn decompress_enforces_size_limit() {
        let service = CompressionService::default().with_max_decompressed(64);
        let compressed = service.compress(&[b'a'; 1024]).unwrap();
        assert!(matches!(service.decompress(&compressed), Err(CompressionError::TooLarge { limit: 64 })));
    }
}
