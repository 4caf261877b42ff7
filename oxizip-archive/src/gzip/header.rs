//! GZIP member header parsing and writing.

use oxizip_core::crc::Crc32;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::CompressionLevel;
use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

/// GZIP magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// GZIP compression method: DEFLATE.
pub const CM_DEFLATE: u8 = 8;

/// Length of the fixed part of a member header.
pub const GZIP_HEADER_LEN: usize = 10;

/// Length of a member trailer (CRC-32 and size).
pub const GZIP_TRAILER_LEN: usize = 8;

/// Operating system byte for "unknown".
pub const OS_UNKNOWN: u8 = 255;

/// GZIP header flags.
pub mod flags {
    /// Text file.
    pub const FTEXT: u8 = 0x01;
    /// Header CRC present.
    pub const FHCRC: u8 = 0x02;
    /// Extra field present.
    pub const FEXTRA: u8 = 0x04;
    /// Original filename present.
    pub const FNAME: u8 = 0x08;
    /// Comment present.
    pub const FCOMMENT: u8 = 0x10;
    /// Bits that must be zero.
    pub const RESERVED: u8 = 0xE0;
}

/// GZIP member header.
///
/// The `FEXTRA`, `FNAME` and `FCOMMENT` flag bits follow the optional
/// fields when writing; only `FTEXT` and `FHCRC` are taken from `flags`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipHeader {
    /// Compression method (always 8 for DEFLATE).
    pub method: u8,
    /// Flags.
    pub flags: u8,
    /// Modification time (Unix timestamp, 0 if unknown).
    pub mtime: u32,
    /// Extra flags (2 = best compression, 4 = fastest).
    pub xfl: u8,
    /// Operating system.
    pub os: u8,
    /// Extra field (if FEXTRA set).
    pub extra: Option<Vec<u8>>,
    /// Original filename (if FNAME set).
    pub filename: Option<String>,
    /// Comment (if FCOMMENT set).
    pub comment: Option<String>,
    /// Header CRC16 (if FHCRC set).
    pub header_crc: Option<u16>,
}

impl Default for GzipHeader {
    fn default() -> Self {
        Self {
            method: CM_DEFLATE,
            flags: 0,
            mtime: 0,
            xfl: 0,
            os: OS_UNKNOWN,
            extra: None,
            filename: None,
            comment: None,
            header_crc: None,
        }
    }
}

impl GzipHeader {
    /// Create a new GZIP header with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a header with filename.
    pub fn with_filename(filename: &str) -> Self {
        Self {
            flags: flags::FNAME,
            filename: Some(filename.to_string()),
            ..Self::default()
        }
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the extra field.
    pub fn with_extra(mut self, extra: Vec<u8>) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, mtime: u32) -> Self {
        self.mtime = mtime;
        self
    }

    /// Set the modification time to now.
    pub fn with_mtime_now(mut self) -> Self {
        self.mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(0))
            .unwrap_or(0);
        self
    }

    /// Request a header CRC16 on write.
    pub fn with_header_crc(mut self) -> Self {
        self.flags |= flags::FHCRC;
        self
    }

    /// Set the extra flags byte from a compression level.
    pub fn set_level(&mut self, level: CompressionLevel) {
        self.xfl = match level.level() {
            0..=1 => 4,
            9 => 2,
            _ => 0,
        };
    }

    /// Modification time, if set.
    pub fn modified(&self) -> Option<SystemTime> {
        (self.mtime != 0).then(|| UNIX_EPOCH + std::time::Duration::from_secs(u64::from(self.mtime)))
    }

    /// Check if the text flag is set.
    pub fn is_text(&self) -> bool {
        self.flags & flags::FTEXT != 0
    }

    /// Flag byte as written: optional fields decide their own bits.
    fn effective_flags(&self) -> u8 {
        let mut value = self.flags & (flags::FTEXT | flags::FHCRC);
        if self.extra.is_some() {
            value |= flags::FEXTRA;
        }
        if self.filename.is_some() {
            value |= flags::FNAME;
        }
        if self.comment.is_some() {
            value |= flags::FCOMMENT;
        }
        value
    }

    /// Serialize the header, including the CRC16 if requested.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let flag_byte = self.effective_flags();
        let mut out = Vec::with_capacity(GZIP_HEADER_LEN);
        out.extend_from_slice(&GZIP_MAGIC);
        out.push(self.method);
        out.push(flag_byte);
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.push(self.xfl);
        out.push(self.os);

        if let Some(extra) = &self.extra {
            let len = u16::try_from(extra.len())
                .map_err(|_| OxiZipError::invalid_entry("<gzip header>", "extra field too long"))?;
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(extra);
        }
        for (field, text) in [("filename", &self.filename), ("comment", &self.comment)] {
            if let Some(text) = text {
                if text.as_bytes().contains(&0) {
                    return Err(OxiZipError::invalid_entry(
                        "<gzip header>",
                        format!("{field} contains a NUL byte"),
                    ));
                }
                out.extend_from_slice(text.as_bytes());
                out.push(0);
            }
        }
        if flag_byte & flags::FHCRC != 0 {
            let crc16 = (Crc32::compute(&out) & 0xFFFF) as u16;
            out.extend_from_slice(&crc16.to_le_bytes());
        }
        Ok(out)
    }

    /// Write the header to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read a GZIP header from a reader.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        Self::read_at(reader, 0)
    }

    /// Read a header that starts at stream position `offset`.
    pub(crate) fn read_at<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let mut reader = CrcReader {
            inner: reader,
            crc: Crc32::new(),
        };

        let mut buf = [0u8; GZIP_HEADER_LEN];
        reader.read_exact(&mut buf)?;

        if buf[0..2] != GZIP_MAGIC {
            return Err(OxiZipError::invalid_magic(
                offset,
                GZIP_MAGIC.to_vec(),
                buf[0..2].to_vec(),
            ));
        }

        let method = buf[2];
        if method != CM_DEFLATE {
            return Err(OxiZipError::unsupported_method(format!("GZIP method {method}")));
        }

        let flag_byte = buf[3];
        if flag_byte & flags::RESERVED != 0 {
            return Err(OxiZipError::format(
                offset + 3,
                format!("reserved GZIP flag bits set: {flag_byte:#04x}"),
            ));
        }
        let mtime = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let xfl = buf[8];
        let os = buf[9];

        let mut extra = None;
        if flag_byte & flags::FEXTRA != 0 {
            let mut xlen_buf = [0u8; 2];
            reader.read_exact(&mut xlen_buf)?;
            let mut field = vec![0u8; usize::from(u16::from_le_bytes(xlen_buf))];
            reader.read_exact(&mut field)?;
            extra = Some(field);
        }

        let filename = if flag_byte & flags::FNAME != 0 {
            Some(read_null_terminated(&mut reader)?)
        } else {
            None
        };
        let comment = if flag_byte & flags::FCOMMENT != 0 {
            Some(read_null_terminated(&mut reader)?)
        } else {
            None
        };

        let mut header_crc = None;
        if flag_byte & flags::FHCRC != 0 {
            let computed = (reader.crc.value() & 0xFFFF) as u16;
            let mut crc_buf = [0u8; 2];
            reader.inner.read_exact(&mut crc_buf)?;
            let stored = u16::from_le_bytes(crc_buf);
            if stored != computed {
                return Err(OxiZipError::crc_mismatch(
                    "<gzip header>",
                    u32::from(stored),
                    u32::from(computed),
                ));
            }
            header_crc = Some(stored);
        }

        Ok(Self {
            method,
            flags: flag_byte,
            mtime,
            xfl,
            os,
            extra,
            filename,
            comment,
            header_crc,
        })
    }
}

/// Read a null-terminated string.
fn read_null_terminated<R: Read>(reader: &mut R) -> Result<String> {
    let mut bytes = Vec::new();
    let mut buf = [0u8; 1];

    loop {
        reader.read_exact(&mut buf)?;
        if buf[0] == 0 {
            break;
        }
        bytes.push(buf[0]);
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Reader that checksums everything read through it.
struct CrcReader<'a, R> {
    inner: &'a mut R,
    crc: Crc32,
}

impl<R: Read> Read for CrcReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.crc.update(&buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_gzip_header_default() {
        let header = GzipHeader::new();
        assert_eq!(header.method, CM_DEFLATE);
        assert_eq!(header.flags, 0);
        assert_eq!(header.to_bytes().unwrap().len(), GZIP_HEADER_LEN);
    }

    #[test]
    fn test_gzip_header_with_filename() {
        let header = GzipHeader::with_filename("test.txt");
        assert_eq!(header.flags & flags::FNAME, flags::FNAME);
        assert_eq!(header.filename, Some("test.txt".to_string()));
    }

    #[test]
    fn test_header_optional_fields_roundtrip() {
        let header = GzipHeader::with_filename("a.txt")
            .with_comment("note")
            .with_extra(vec![1, 2, 3, 4])
            .with_mtime(1_700_000_000)
            .with_header_crc();
        let bytes = header.to_bytes().unwrap();

        let parsed = GzipHeader::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(parsed.filename.as_deref(), Some("a.txt"));
        assert_eq!(parsed.comment.as_deref(), Some("note"));
        assert_eq!(parsed.extra, Some(vec![1, 2, 3, 4]));
        assert_eq!(parsed.mtime, 1_700_000_000);
        assert!(parsed.header_crc.is_some());
        assert_eq!(parsed.flags & flags::FEXTRA, flags::FEXTRA);
    }

    #[test]
    fn test_header_crc_checked() {
        let mut bytes = GzipHeader::with_filename("x").with_header_crc().to_bytes().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = GzipHeader::read(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, OxiZipError::CrcMismatch { .. }));
    }

    #[test]
    fn test_bad_magic_and_method() {
        let err = GzipHeader::read(&mut Cursor::new([0u8; 10])).unwrap_err();
        assert!(matches!(err, OxiZipError::InvalidMagic { .. }));

        let mut bytes = GzipHeader::new().to_bytes().unwrap();
        bytes[2] = 7;
        let err = GzipHeader::read(&mut Cursor::new(&bytes)).unwrap_err();
        assert!(matches!(err, OxiZipError::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_nul_in_filename_rejected() {
        assert!(GzipHeader::with_filename("a\0b").to_bytes().is_err());
    }

    #[test]
    fn test_level_sets_xfl() {
        let mut header = GzipHeader::new();
        header.set_level(CompressionLevel::BEST);
        assert_eq!(header.xfl, 2);
        header.set_level(CompressionLevel::FAST);
        assert_eq!(header.xfl, 4);
    }
}
