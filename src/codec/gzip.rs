//! Gzip codec using `flate2`.
//!
//! The server may gzip control payloads (compression nibble = GZIP). The
//! client never compresses what it sends, but can when asked.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{FrameError, Result};

/// Gzip codec for payload bodies.
pub struct GzipCodec;

impl GzipCodec {
    /// Compress bytes with default compression level.
    pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(
            Vec::with_capacity(data.len() / 2 + 32),
            flate2::Compression::default(),
        );
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    /// Decompress a gzip stream.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Decompress`] if the bytes are not valid gzip.
    pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::with_capacity(data.len() * 2);
        decoder
            .read_to_end(&mut out)
            .map_err(|e| FrameError::Decompress(e.to_string()))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DialogError;

    #[test]
    fn test_compress_decompress() {
        let body = br#"{"results":[{"text":"hello","is_interim":false}]}"#;
        let compressed = GzipCodec::compress(body).unwrap();
        assert_ne!(compressed.as_slice(), body.as_slice());
        assert_eq!(GzipCodec::decompress(&compressed).unwrap(), body);
    }

    #[test]
    fn test_decompress_garbage() {
        let err = GzipCodec::decompress(b"not gzip at all").unwrap_err();
        assert!(matches!(err, DialogError::Frame(FrameError::Decompress(_))));
    }

    #[test]
    fn test_empty_input() {
        let compressed = GzipCodec::compress(b"").unwrap();
        assert!(GzipCodec::decompress(&compressed).unwrap().is_empty());
    }
}
