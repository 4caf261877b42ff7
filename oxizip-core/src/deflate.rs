//! DEFLATE codec binding.
//!
//! Raw (headerless) DEFLATE streams, as stored in ZIP entries and GZIP
//! members, backed by `flate2`.

use crate::error::{OxiZipError, Result};
use crate::traits::{
    CompressStatus, CompressionLevel, Compressor, DecompressStatus, Decompressor, FlushMode,
};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Raw DEFLATE compressor.
pub struct DeflateCompressor {
    inner: Compress,
    finished: bool,
}

impl std::fmt::Debug for DeflateCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateCompressor")
            .field("total_in", &self.inner.total_in())
            .field("total_out", &self.inner.total_out())
            .field("finished", &self.finished)
            .finish()
    }
}

impl DeflateCompressor {
    /// Creates a compressor at the given level.
    pub fn new(level: CompressionLevel) -> Self {
        Self {
            inner: Compress::new(Compression::new(u32::from(level.level())), false),
            finished: false,
        }
    }
}

impl Default for DeflateCompressor {
    fn default() -> Self {
        Self::new(CompressionLevel::default())
    }
}

impl Compressor for DeflateCompressor {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)> {
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();

        let flush = match flush {
            FlushMode::None => FlushCompress::None,
            FlushMode::Sync => FlushCompress::Sync,
            FlushMode::Full => FlushCompress::Full,
            FlushMode::Finish => FlushCompress::Finish,
        };
        let status = self
            .inner
            .compress(input, output, flush)
            .map_err(|e| OxiZipError::format(before_out, format!("deflate: {e}")))?;

        let consumed = (self.inner.total_in() - before_in) as usize;
        let produced = (self.inner.total_out() - before_out) as usize;

        let status = match status {
            Status::StreamEnd => {
                self.finished = true;
                CompressStatus::Done
            }
            Status::Ok | Status::BufError if produced == output.len() => CompressStatus::NeedsOutput,
            Status::Ok | Status::BufError => CompressStatus::NeedsInput,
        };
        Ok((consumed, produced, status))
    }

    fn reset(&mut self) {
        self.inner.reset();
        self.finished = false;
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn total_in(&self) -> u64 {
        self.inner.total_in()
    }

    fn total_out(&self) -> u64 {
        self.inner.total_out()
    }
}

/// Raw DEFLATE decompressor.
pub struct DeflateDecompressor {
    inner: Decompress,
    finished: bool,
}

impl std::fmt::Debug for DeflateDecompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeflateDecompressor")
            .field("total_in", &self.inner.total_in())
            .field("total_out", &self.inner.total_out())
            .field("finished", &self.finished)
            .finish()
    }
}

impl DeflateDecompressor {
    /// Creates a decompressor for a raw DEFLATE stream.
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
            finished: false,
        }
    }
}

impl Default for DeflateDecompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor for DeflateDecompressor {
    fn decompress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
    ) -> Result<(usize, usize, DecompressStatus)> {
        if self.finished {
            return Ok((0, 0, DecompressStatus::Done));
        }

        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();

        let status = self
            .inner
            .decompress(input, output, FlushDecompress::None)
            .map_err(|e| OxiZipError::format(before_in, format!("corrupt deflate stream: {e}")))?;

        let consumed = (self.inner.total_in() - before_in) as usize;
        let produced = (self.inner.total_out() - before_out) as usize;

        let status = match status {
            Status::StreamEnd => {
                self.finished = true;
                DecompressStatus::Done
            }
            Status::Ok | Status::BufError if produced == output.len() => {
                DecompressStatus::NeedsOutput
            }
            Status::Ok | Status::BufError => DecompressStatus::NeedsInput,
        };
        Ok((consumed, produced, status))
    }

    fn reset(&mut self) {
        self.inner.reset(false);
        self.finished = false;
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn total_in(&self) -> u64 {
        self.inner.total_in()
    }

    fn total_out(&self) -> u64 {
        self.inner.total_out()
    }
}

/// Compress a buffer to raw DEFLATE in one call.
pub fn deflate(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    DeflateCompressor::new(level).compress_all(data)
}

/// Decompress a complete raw DEFLATE buffer in one call.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressor = DeflateDecompressor::new();
    let output = decompressor.decompress_all(data)?;
    if !decompressor.is_finished() {
        return Err(OxiZipError::unexpected_eof("deflate stream ended early"));
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_roundtrip() {
        let data = b"Hello, World! This is a test of Deflate compression.".repeat(20);
        let compressed = deflate(&data, CompressionLevel::DEFAULT).unwrap();
        assert!(compressed.len() < data.len());

        let decompressed = inflate(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_deflate_empty() {
        let compressed = deflate(b"", CompressionLevel::BEST).unwrap();
        assert!(!compressed.is_empty());
        assert!(inflate(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_decompressor_reports_unconsumed_tail() {
        let mut stream = deflate(b"payload payload payload", CompressionLevel::FAST).unwrap();
        let stream_len = stream.len();
        stream.extend_from_slice(b"TRAILER!");

        let mut decompressor = DeflateDecompressor::new();
        let mut out = vec![0u8; 256];
        let (consumed, produced, status) = decompressor.decompress(&stream, &mut out).unwrap();

        assert_eq!(status, DecompressStatus::Done);
        assert_eq!(consumed, stream_len);
        assert_eq!(&out[..produced], b"payload payload payload");
        assert_eq!(decompressor.total_in(), stream_len as u64);
    }

    #[test]
    fn test_truncated_stream() {
        let data = vec![7u8; 10_000];
        let compressed = deflate(&data, CompressionLevel::DEFAULT).unwrap();
        let err = inflate(&compressed[..compressed.len() / 2]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_reset_allows_reuse() {
        let first = deflate(b"first", CompressionLevel::DEFAULT).unwrap();
        let second = deflate(b"second", CompressionLevel::DEFAULT).unwrap();

        let mut decompressor = DeflateDecompressor::new();
        assert_eq!(decompressor.decompress_all(&first).unwrap(), b"first");
        decompressor.reset();
        assert_eq!(decompressor.total_in(), 0);
        assert_eq!(decompressor.decompress_all(&second).unwrap(), b"second");
    }
}
