/*!
Compression adapters for sealed artifacts.

Serialized snapshots are compressed before encryption. Gzip output from
[`GzipCompressor`] carries no timestamp, so identical snapshots compress to
identical bytes.
*/

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{Result, VaultError};

/// Compression abstraction used by the envelope
pub trait CompressionAdapter {
    /// Compress the input data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress the input data
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Name of the compression algorithm, recorded in the envelope header
    fn algorithm_name(&self) -> &str;
}

/// Gzip compression adapter
///
/// # Example
/// ```rust
/// use appvault_core::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::new();
/// let data = br#"{"preferenceStores":{},"databases":{},"files":{"directory":{}}}"#;
/// let compressed = compressor.compress(data)?;
/// assert_eq!(compressor.decompress(&compressed)?, data);
/// # Ok::<(), appvault_core::VaultError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct GzipCompressor;

impl GzipCompressor {
    /// Create a gzip compressor at the default level (6)
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());

        encoder.write_all(data).map_err(|e| {
            VaultError::compression(format!("Failed to write data for compression: {e}"))
        })?;

        encoder
            .finish()
            .map_err(|e| VaultError::compression(format!("Failed to finish compression: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| VaultError::compression(format!("Failed to decompress data: {e}")))?;

        Ok(decompressed)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter for tests and already-compact payloads
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

/// Look up an adapter by the name it records in envelope headers
pub fn compressor_for(name: &str) -> Option<Box<dyn CompressionAdapter + Send + Sync>> {
    match name {
        "gzip" => Some(Box::new(GzipCompressor::new())),
        "none" => Some(Box::new(NoCompression::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_compression_roundtrip() {
        let compressor = GzipCompressor::new();
        let original_data = br#"{"uid":"123456","nickname":"Alice"},"#.repeat(20);

        let compressed = compressor.compress(&original_data).unwrap();
        assert!(compressed.len() < original_data.len());

        let decompressed = compressor.decompress(&compressed).unwrap();
        assert_eq!(original_data, decompressed);
    }

    #[test]
    fn test_gzip_output_is_deterministic() {
        let compressor = GzipCompressor::new();
        let data = b"same snapshot, same bytes".repeat(8);
        assert_eq!(
            compressor.compress(&data).unwrap(),
            compressor.compress(&data).unwrap()
        );
    }

    #[test]
    fn test_no_compression() {
        let compressor = NoCompression::new();
        let test_data = b"test data";

        let compressed = compressor.compress(test_data).unwrap();
        assert_eq!(compressed, test_data);
        assert_eq!(compressor.decompress(&compressed).unwrap(), test_data);
        assert_eq!(compressor.algorithm_name(), "none");
    }

    #[test]
    fn test_compressor_lookup() {
        assert_eq!(compressor_for("gzip").unwrap().algorithm_name(), "gzip");
        assert_eq!(compressor_for("none").unwrap().algorithm_name(), "none");
        assert!(compressor_for("zstd").is_none());
    }

    #[test]
    fn test_gzip_invalid_compressed_data() {
        let compressor = GzipCompressor::new();
        let result = compressor.decompress(b"this is not compressed gzip data");
        assert!(matches!(result, Err(VaultError::Compression(_))));
    }
}
