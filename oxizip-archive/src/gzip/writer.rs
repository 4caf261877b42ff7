//! Streaming GZIP compression.

use super::header::GzipHeader;
use oxizip_core::crc::Crc32;
use oxizip_core::error::Result;
use oxizip_core::{CompressStatus, CompressionLevel, Compressor, DeflateCompressor, FlushMode};
use std::io::{self, Write};

const OUTPUT_CHUNK_LEN: usize = 32 * 1024;

/// GZIP writer that compresses data into a single member.
///
/// The header goes out just before the first compressed bytes;
/// [`finish`](Self::finish) writes the trailer and returns the sink.
pub struct GzipWriter<W: Write> {
    out: W,
    header: GzipHeader,
    header_written: bool,
    compressor: Box<dyn Compressor + Send>,
    crc: Crc32,
    size: u64,
    buffer: Vec<u8>,
}

impl<W: Write> GzipWriter<W> {
    /// Create a new GZIP writer with default settings.
    pub fn new(writer: W) -> Self {
        Self::with_header(writer, GzipHeader::new())
    }

    /// Create a writer with a specific header.
    pub fn with_header(writer: W, mut header: GzipHeader) -> Self {
        header.set_level(CompressionLevel::DEFAULT);
        Self {
            out: writer,
            header,
            header_written: false,
            compressor: Box::new(DeflateCompressor::new(CompressionLevel::DEFAULT)),
            crc: Crc32::new(),
            size: 0,
            buffer: vec![0u8; OUTPUT_CHUNK_LEN],
        }
    }

    /// Set compression level. Has no effect once data has been written.
    pub fn level(mut self, level: CompressionLevel) -> Self {
        if !self.header_written {
            self.header.set_level(level);
            self.compressor = Box::new(DeflateCompressor::new(level));
        }
        self
    }

    /// Header that is (or will be) written.
    pub fn header(&self) -> &GzipHeader {
        &self.header
    }

    /// Uncompressed bytes accepted so far.
    pub fn total_in(&self) -> u64 {
        self.size
    }

    fn ensure_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.header.write(&mut self.out)?;
            self.header_written = true;
        }
        Ok(())
    }

    fn compress(&mut self, mut input: &[u8], flush: FlushMode) -> Result<()> {
        loop {
            let (consumed, produced, status) =
                self.compressor.compress(input, &mut self.buffer, flush)?;
            input = &input[consumed..];
            if produced > 0 {
                self.ensure_header()?;
                self.out.write_all(&self.buffer[..produced])?;
            }

            let drained = match flush {
                FlushMode::Finish => status == CompressStatus::Done,
                _ => input.is_empty() && produced < self.buffer.len(),
            };
            if drained {
                return Ok(());
            }
        }
    }

    /// Write the trailer and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.compress(&[], FlushMode::Finish)?;
        self.ensure_header()?;
        self.out.write_all(&self.crc.value().to_le_bytes())?;
        self.out.write_all(&((self.size & 0xFFFF_FFFF) as u32).to_le_bytes())?;
        self.out.flush()?;
        Ok(self.out)
    }
}

impl<W: Write> Write for GzipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.crc.update(buf);
        self.size += buf.len() as u64;
        self.compress(buf, FlushMode::None)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.compress(&[], FlushMode::Sync)?;
        self.out.flush()
    }
}

impl<W: Write> std::fmt::Debug for GzipWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipWriter")
            .field("header", &self.header)
            .field("header_written", &self.header_written)
            .field("total_in", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gzip::GzipReader;
    use std::io::{Cursor, Read};

    #[test]
    fn test_header_is_lazy() {
        let writer = GzipWriter::new(Vec::new());
        assert!(writer.out.is_empty());

        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..2], &[0x1F, 0x8B]);
    }

    #[test]
    fn test_streamed_writes() {
        let mut writer = GzipWriter::new(Vec::new()).level(CompressionLevel::BEST);
        for chunk in [&b"alpha "[..], b"beta ", b"gamma"] {
            writer.write_all(chunk).unwrap();
        }
        writer.flush().unwrap();
        writer.write_all(b"!").unwrap();
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes[8], 2);

        let mut out = String::new();
        GzipReader::new(Cursor::new(bytes))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "alpha beta gamma!");
    }
}
