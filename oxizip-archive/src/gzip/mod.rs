//! GZIP format support (RFC 1952).
//!
//! GZIP is a file format for single-file compression using DEFLATE.
//! Several members may be concatenated; [`GzipReader`] decodes them as
//! one stream.
//!
//! ## Example
//!
//! ```rust
//! use oxizip_archive::gzip;
//! use oxizip_core::CompressionLevel;
//!
//! // Compress data
//! let data = b"Hello, World!";
//! let compressed = gzip::compress(data, CompressionLevel::DEFAULT).unwrap();
//!
//! // Decompress data
//! let mut reader = std::io::Cursor::new(compressed);
//! let decompressed = gzip::decompress(&mut reader).unwrap();
//! assert_eq!(decompressed, data);
//! ```

mod header;
mod reader;
mod writer;

pub use header::{flags, GzipHeader, CM_DEFLATE, GZIP_HEADER_LEN, GZIP_MAGIC, GZIP_TRAILER_LEN};
pub use reader::GzipReader;
pub use writer::GzipWriter;

use oxizip_core::error::Result;
use oxizip_core::CompressionLevel;
use std::io::{Read, Write};

/// Decompress a GZIP stream, including any concatenated members.
pub fn decompress<R: Read>(reader: R) -> Result<Vec<u8>> {
    GzipReader::new(reader)?.decompress()
}

/// Compress data to GZIP format.
pub fn compress(data: &[u8], level: CompressionLevel) -> Result<Vec<u8>> {
    let mut writer = GzipWriter::new(Vec::new()).level(level);
    writer.write_all(data)?;
    writer.finish()
}

/// Compress data to GZIP format with filename.
pub fn compress_with_filename(data: &[u8], filename: &str, level: CompressionLevel) -> Result<Vec<u8>> {
    let header = GzipHeader::with_filename(filename).with_mtime_now();
    let mut writer = GzipWriter::with_header(Vec::new(), header).level(level);
    writer.write_all(data)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_gzip_roundtrip() {
        let original = b"Hello, GZIP World! This is a test of compression.";
        let compressed = compress(original, CompressionLevel::DEFAULT).unwrap();
        assert_eq!(decompress(Cursor::new(compressed)).unwrap(), original);
    }

    #[test]
    fn test_gzip_roundtrip_with_filename() {
        let original = b"Test data with filename";
        let compressed = compress_with_filename(original, "data.txt", CompressionLevel::DEFAULT).unwrap();

        let mut reader = GzipReader::new(Cursor::new(compressed)).unwrap();
        assert_eq!(reader.header().filename, Some("data.txt".to_string()));
        assert!(reader.header().modified().is_some());
        assert_eq!(reader.decompress().unwrap(), original);
    }

    #[test]
    fn test_gzip_empty() {
        let compressed = compress(b"", CompressionLevel::DEFAULT).unwrap();
        assert!(decompress(Cursor::new(compressed)).unwrap().is_empty());
    }

    #[test]
    fn test_gzip_repeated() {
        let original = vec![b'A'; 10000];
        let compressed = compress(&original, CompressionLevel::BEST).unwrap();

        // Should compress well
        assert!(compressed.len() < original.len() / 10);
        assert_eq!(decompress(Cursor::new(compressed)).unwrap(), original);
    }
}
