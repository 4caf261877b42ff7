//! Streaming GZIP decompression with concatenated member support.

use super::header::{GzipHeader, GZIP_HEADER_LEN, GZIP_TRAILER_LEN};
use log::{debug, warn};
use oxizip_core::crc::Crc32;
use oxizip_core::error::{ErrorKind, OxiZipError, Result};
use oxizip_core::{DecompressStatus, Decompressor, DeflateDecompressor, PeekReader};
use std::io::{self, Read};

/// GZIP reader that decompresses one or more concatenated members.
///
/// Each member trailer is checked against the data produced. After a
/// valid trailer, the reader tries to parse another member if at least a
/// full fixed header remains; anything that does not parse as a header
/// ends the stream quietly.
pub struct GzipReader<R: Read> {
    input: PeekReader<R>,
    decoder: Box<dyn Decompressor + Send>,
    header: GzipHeader,
    members: usize,
    crc: Crc32,
    member_size: u64,
    done: bool,
}

impl<R: Read> GzipReader<R> {
    /// Create a new GZIP reader, parsing the first member header.
    pub fn new(reader: R) -> Result<Self> {
        let mut input = PeekReader::new(reader);
        let header = GzipHeader::read_at(&mut input, 0)?;
        Ok(Self {
            input,
            decoder: Box::new(DeflateDecompressor::new()),
            header,
            members: 1,
            crc: Crc32::new(),
            member_size: 0,
            done: false,
        })
    }

    /// Header of the member currently being read.
    pub fn header(&self) -> &GzipHeader {
        &self.header
    }

    /// Number of member headers parsed so far.
    pub fn members(&self) -> usize {
        self.members
    }

    /// Compressed bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.input.position()
    }

    /// Decompress everything that remains.
    pub fn decompress(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Consume the reader and return the underlying input.
    pub fn into_inner(self) -> R {
        self.input.into_inner()
    }

    fn member_label(&self) -> String {
        match &self.header.filename {
            Some(name) => name.clone(),
            None => format!("<gzip member {}>", self.members),
        }
    }

    fn read_member(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.done {
                return Ok(0);
            }
            let available = self.input.fill_some()?;
            if available.is_empty() {
                return Err(OxiZipError::unexpected_eof(format!(
                    "data of {}",
                    self.member_label()
                )));
            }
            let (consumed, produced, status) = self.decoder.decompress(available, buf)?;
            self.input.consume(consumed);
            self.crc.update(&buf[..produced]);
            self.member_size += produced as u64;

            if status == DecompressStatus::Done {
                self.finish_member()?;
                if produced > 0 {
                    return Ok(produced);
                }
                continue;
            }
            if produced > 0 {
                return Ok(produced);
            }
            if consumed == 0 {
                let buffered = self.input.buffered().len();
                if self.input.fill(buffered + 1)? == buffered {
                    return Err(OxiZipError::unexpected_eof(format!(
                        "data of {}",
                        self.member_label()
                    )));
                }
            }
        }
    }

    /// Check the trailer, then look for another member.
    fn finish_member(&mut self) -> Result<()> {
        let mut trailer = [0u8; GZIP_TRAILER_LEN];
        self.input.read_exact_or_eof(&mut trailer, "gzip trailer")?;
        let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let expected_size = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

        let crc = self.crc.value();
        if crc != expected_crc {
            return Err(OxiZipError::crc_mismatch(self.member_label(), expected_crc, crc));
        }
        let size = self.member_size & 0xFFFF_FFFF;
        if size != u64::from(expected_size) {
            return Err(OxiZipError::size_mismatch(
                self.member_label(),
                "size",
                u64::from(expected_size),
                size,
            ));
        }
        debug!("gzip member {} ok: {} bytes", self.members, self.member_size);

        let available = self.input.fill(GZIP_HEADER_LEN)?;
        if available < GZIP_HEADER_LEN {
            if available > 0 {
                debug!("ignoring {available} trailing bytes after gzip member");
            }
            self.done = true;
            return Ok(());
        }

        let offset = self.input.position();
        match GzipHeader::read_at(&mut self.input, offset) {
            Ok(header) => {
                self.header = header;
                self.members += 1;
                self.decoder.reset();
                self.crc = Crc32::new();
                self.member_size = 0;
            }
            Err(e) if e.kind() == ErrorKind::Io => return Err(e),
            Err(e) => {
                warn!("ignoring trailing data at offset {offset}: {e}");
                self.done = true;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for GzipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Ok(self.read_member(buf)?)
    }
}

impl<R: Read> std::fmt::Debug for GzipReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipReader")
            .field("header", &self.header)
            .field("members", &self.members)
            .field("position", &self.input.position())
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gzip::compress;
    use oxizip_core::CompressionLevel;
    use std::io::Cursor;

    #[test]
    fn test_concatenated_members() {
        let mut data = compress(b"first ", CompressionLevel::DEFAULT).unwrap();
        data.extend(compress(b"second", CompressionLevel::BEST).unwrap());

        let mut reader = GzipReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.decompress().unwrap(), b"first second");
        assert_eq!(reader.members(), 2);
    }

    #[test]
    fn test_trailing_garbage_is_ignored() {
        let mut data = compress(b"payload", CompressionLevel::DEFAULT).unwrap();
        data.extend_from_slice(b"this is not a gzip header");

        let mut reader = GzipReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.decompress().unwrap(), b"payload");
        assert_eq!(reader.members(), 1);
    }

    #[test]
    fn test_short_tail_is_ignored() {
        let mut data = compress(b"payload", CompressionLevel::DEFAULT).unwrap();
        data.extend_from_slice(&[0x1F, 0x8B, 8]);

        let mut reader = GzipReader::new(Cursor::new(data)).unwrap();
        assert_eq!(reader.decompress().unwrap(), b"payload");
    }

    #[test]
    fn test_crc_mismatch() {
        let mut data = compress(b"payload", CompressionLevel::DEFAULT).unwrap();
        let crc_pos = data.len() - 8;
        data[crc_pos] ^= 0x01;

        let mut reader = GzipReader::new(Cursor::new(data)).unwrap();
        let err = reader.decompress().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Integrity);
    }

    #[test]
    fn test_size_mismatch() {
        let mut data = compress(b"payload", CompressionLevel::DEFAULT).unwrap();
        let size_pos = data.len() - 4;
        data[size_pos] ^= 0x01;

        let mut reader = GzipReader::new(Cursor::new(data)).unwrap();
        let err = reader.decompress().unwrap_err();
        assert!(matches!(err, OxiZipError::SizeMismatch { .. }));
    }

    #[test]
    fn test_truncated_member() {
        let data = compress(&[b'z'; 5000], CompressionLevel::DEFAULT).unwrap();
        let truncated = &data[..data.len() - 4];

        let mut reader = GzipReader::new(Cursor::new(truncated)).unwrap();
        let err = reader.decompress().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }
}
