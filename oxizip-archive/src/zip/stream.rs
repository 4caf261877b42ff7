//! Sequential ZIP reading from local headers.
//!
//! Works on any `Read` (pipes, sockets) and on archives whose central
//! directory was never written.

use super::entry::{from_dos_time, ZipEntry, ZipMethod};
use super::extra::{ExtraTimes, Zip64Values, ZIP64_EXTRA_ID};
use super::spec::{
    u32_at, DataDescriptor, LocalFileHeader, CENTRAL_DIR_HEADER_SIG, END_OF_CENTRAL_DIR_SIG,
    FLAG_UTF8, LOCAL_FILE_HEADER_SIG, LOCAL_HEADER_LEN, ZIP64_END_OF_CENTRAL_DIR_SIG,
    ZIP64_MARKER_32,
};
use log::debug;
use oxizip_core::charset::NameCodec;
use oxizip_core::crc::Crc32;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::{DecompressStatus, Decompressor, DeflateDecompressor, PeekReader};
use std::io::{self, Read};

/// Where the reader is within the current entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the next local header.
    AwaitHeader,
    /// Inside entry data.
    ReadingBody,
    /// Data consumed; trailer and checks pending.
    AwaitTrailer,
    /// Data and trailer consumed and verified.
    Closed,
    /// No more entries.
    Finished,
    /// An entry failed where the input position is no longer known.
    Failed,
}

/// Per-entry bookkeeping.
#[derive(Debug)]
struct Current {
    entry: ZipEntry,
    deferred: bool,
    /// The local header carried a ZIP64 extra field.
    zip64: bool,
    crc: Crc32,
    /// Stored bytes still to read.
    remaining: u64,
    produced: u64,
}

/// Reads ZIP entries one after another from local headers.
///
/// # Example
///
/// ```rust,no_run
/// use oxizip_archive::zip::ZipStreamReader;
/// use std::io::Read;
///
/// let mut reader = ZipStreamReader::new(std::io::stdin());
/// while let Some(entry) = reader.next_entry().unwrap() {
///     let mut data = Vec::new();
///     reader.read_to_end(&mut data).unwrap();
///     println!("{}: {} bytes", entry.name, data.len());
/// }
/// ```
pub struct ZipStreamReader<R: Read> {
    input: PeekReader<R>,
    codec: NameCodec,
    decoder: Box<dyn Decompressor + Send>,
    state: State,
    current: Option<Current>,
}

impl<R: Read> ZipStreamReader<R> {
    /// Create a reader assuming UTF-8 names.
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, NameCodec::utf8())
    }

    /// Create a reader with a charset for names without the UTF-8 flag.
    pub fn with_codec(reader: R, codec: NameCodec) -> Self {
        Self {
            input: PeekReader::new(reader),
            codec,
            decoder: Box::new(DeflateDecompressor::new()),
            state: State::AwaitHeader,
            current: None,
        }
    }

    /// The current entry, updated with trailer values once its data is read.
    pub fn entry(&self) -> Option<&ZipEntry> {
        self.current.as_ref().map(|c| &c.entry)
    }

    /// Bytes consumed from the input so far.
    pub fn position(&self) -> u64 {
        self.input.position()
    }

    /// Advance to the next entry, skipping any unread data of the current one.
    ///
    /// Returns `None` at the central directory or at a clean end of input.
    /// After an integrity error whose trailer was read, the reader moves on
    /// to the next entry; after any other failure it keeps returning an
    /// error.
    pub fn next_entry(&mut self) -> Result<Option<ZipEntry>> {
        if self.state == State::ReadingBody {
            io::copy(self, &mut io::sink())?;
        }
        match self.state {
            State::Finished => return Ok(None),
            State::Failed => {
                return Err(OxiZipError::invalid_state(format!(
                    "input position lost at {} after a failed entry",
                    self.input.position()
                )));
            }
            _ => {}
        }
        self.current = None;

        let result = self.read_header();
        if result.is_err() {
            self.state = State::Failed;
        }
        result
    }

    fn read_header(&mut self) -> Result<Option<ZipEntry>> {
        let available = self.input.fill(4)?;
        if available == 0 {
            self.state = State::Finished;
            return Ok(None);
        }
        if available < 4 {
            return Err(OxiZipError::unexpected_eof("record signature"));
        }

        let offset = self.input.position();
        match u32_at(self.input.buffered(), 0) {
            LOCAL_FILE_HEADER_SIG => {}
            CENTRAL_DIR_HEADER_SIG | END_OF_CENTRAL_DIR_SIG | ZIP64_END_OF_CENTRAL_DIR_SIG => {
                debug!("reached central directory at {offset}");
                self.state = State::Finished;
                return Ok(None);
            }
            other => {
                return Err(OxiZipError::format(
                    offset,
                    format!("unexpected record signature {other:#010x}"),
                ));
            }
        }

        let mut fixed = [0u8; LOCAL_HEADER_LEN];
        self.input.read_exact_or_eof(&mut fixed, "local file header")?;
        let header = LocalFileHeader::parse(&fixed, offset)?;
        let mut name = vec![0u8; usize::from(header.name_len)];
        self.input.read_exact_or_eof(&mut name, "entry name")?;
        let mut extra = vec![0u8; usize::from(header.extra_len)];
        self.input.read_exact_or_eof(&mut extra, "extra field")?;

        let name = if header.flags & FLAG_UTF8 != 0 {
            NameCodec::utf8().decode(&name)?.into_owned()
        } else {
            self.codec.decode(&name)?.into_owned()
        };

        if header.is_encrypted() {
            return Err(OxiZipError::encrypted(name));
        }
        let method = ZipMethod::from_code(header.method)?;
        let deferred = header.has_data_descriptor();
        if deferred && method == ZipMethod::Stored {
            return Err(OxiZipError::format(
                offset,
                format!("stored entry {name} cannot use a data descriptor"),
            ));
        }

        let zip64 = super::extra::find(&extra, ZIP64_EXTRA_ID).is_some();
        let (size, compressed_size, crc32) = if deferred {
            (None, None, None)
        } else {
            let need_size = header.uncompressed_size == ZIP64_MARKER_32;
            let need_compressed = header.compressed_size == ZIP64_MARKER_32;
            let values = Zip64Values::read(&extra, need_size, need_compressed, false);
            if (need_size && values.size.is_none()) || (need_compressed && values.compressed_size.is_none()) {
                return Err(OxiZipError::format(offset, format!("invalid LOC header for {name} (bad zip64 extra)")));
            }
            (
                Some(values.size.unwrap_or(u64::from(header.uncompressed_size))),
                Some(values.compressed_size.unwrap_or(u64::from(header.compressed_size))),
                Some(header.crc32),
            )
        };

        if method == ZipMethod::Stored && size != compressed_size {
            return Err(OxiZipError::format(
                offset,
                format!("stored entry {name} has differing sizes"),
            ));
        }

        let times = ExtraTimes::read(&extra);
        let entry = ZipEntry {
            name,
            method,
            size,
            compressed_size,
            crc32,
            modified: times.modified.or(Some(from_dos_time(header.dos_time))),
            accessed: times.accessed,
            created: times.created,
            extra,
            comment: None,
            external_attributes: 0,
            flags: header.flags,
            dos_time: Some(header.dos_time),
            header_offset: Some(offset),
        };

        debug!("entry {} at {offset} ({}, deferred: {deferred})", entry.name, entry.method);
        self.decoder.reset();
        self.current = Some(Current {
            remaining: if method == ZipMethod::Stored { compressed_size.unwrap_or(0) } else { 0 },
            entry: entry.clone(),
            deferred,
            zip64,
            crc: Crc32::new(),
            produced: 0,
        });
        self.state = State::ReadingBody;
        Ok(Some(entry))
    }

    fn read_stored(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(current) = self.current.as_mut() else {
            return Ok(0);
        };
        let n = (buf.len() as u64).min(current.remaining) as usize;
        if n > 0 {
            let available = self.input.fill_some()?;
            if available.is_empty() {
                return Err(OxiZipError::unexpected_eof(format!("data of {}", current.entry.name)));
            }
            let n = n.min(available.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.input.consume(n);
            current.crc.update(&buf[..n]);
            current.remaining -= n as u64;
            current.produced += n as u64;
            if current.remaining > 0 {
                return Ok(n);
            }
            self.close_entry()?;
            return Ok(n);
        }
        self.close_entry()?;
        Ok(0)
    }

    fn read_deflated(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(current) = self.current.as_mut() else {
            return Ok(0);
        };
        loop {
            let available = self.input.fill_some()?;
            if available.is_empty() {
                return Err(OxiZipError::unexpected_eof(format!("data of {}", current.entry.name)));
            }
            let (consumed, produced, status) = self.decoder.decompress(available, buf)?;
            self.input.consume(consumed);
            current.crc.update(&buf[..produced]);
            current.produced += produced as u64;

            if status == DecompressStatus::Done {
                self.close_entry()?;
                return Ok(produced);
            }
            if produced > 0 {
                return Ok(produced);
            }
            if consumed == 0 {
                // The decoder wants more than is buffered.
                let buffered = self.input.buffered().len();
                if self.input.fill(buffered + 1)? == buffered {
                    return Err(OxiZipError::unexpected_eof(format!("data of {}", current.entry.name)));
                }
            }
        }
    }

    /// Read the trailer if any and cross-check CRC and sizes.
    fn close_entry(&mut self) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        self.state = State::AwaitTrailer;

        let produced = current.produced;
        let compressed = match current.entry.method {
            ZipMethod::Stored => produced,
            ZipMethod::Deflated => self.decoder.total_in(),
        };
        let crc = current.crc.value();

        let (expected_crc, expected_compressed, expected_size) = if current.deferred {
            let zip64 = current.zip64
                || compressed >= u64::from(ZIP64_MARKER_32)
                || produced >= u64::from(ZIP64_MARKER_32);
            let (descriptor, _) = DataDescriptor::read(&mut self.input, zip64)?;
            (descriptor.crc32, descriptor.compressed_size, descriptor.uncompressed_size)
        } else {
            (
                current.entry.crc32.unwrap_or(0),
                current.entry.compressed_size.unwrap_or(0),
                current.entry.size.unwrap_or(0),
            )
        };

        // The whole entry is consumed; checks below leave the input aligned.
        self.state = State::Closed;
        let name = &current.entry.name;
        if expected_crc != crc {
            return Err(OxiZipError::crc_mismatch(name, expected_crc, crc));
        }
        if expected_compressed != compressed {
            return Err(OxiZipError::size_mismatch(name, "compressed size", expected_compressed, compressed));
        }
        if expected_size != produced {
            return Err(OxiZipError::size_mismatch(name, "size", expected_size, produced));
        }

        current.entry.crc32 = Some(crc);
        current.entry.compressed_size = Some(compressed);
        current.entry.size = Some(produced);
        Ok(())
    }
}

impl<R: Read> Read for ZipStreamReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state != State::ReadingBody || buf.is_empty() {
            return Ok(0);
        }
        let method = match &self.current {
            Some(current) => current.entry.method,
            None => return Ok(0),
        };
        let result = match method {
            ZipMethod::Stored => self.read_stored(buf),
            ZipMethod::Deflated => self.read_deflated(buf),
        };
        result.map_err(|e| {
            if self.state != State::Closed {
                self.state = State::Failed;
            }
            e.into()
        })
    }
}

impl<R: Read> std::fmt::Debug for ZipStreamReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipStreamReader")
            .field("position", &self.input.position())
            .field("state", &self.state)
            .field("entry", &self.entry().map(|e| &e.name))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::spec::{FLAG_DATA_DESCRIPTOR, VERSION_DEFLATED};
    use oxizip_core::deflate::deflate;
    use oxizip_core::CompressionLevel;
    use std::io::Cursor;

    fn deferred_entry(name: &str, data: &[u8], with_signature: bool) -> Vec<u8> {
        let compressed = deflate(data, CompressionLevel::DEFAULT).unwrap();
        let header = LocalFileHeader {
            version_needed: VERSION_DEFLATED,
            flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            method: 8,
            ..Default::default()
        };
        let mut out = Vec::new();
        header.write(&mut out, name.as_bytes(), b"").unwrap();
        out.extend_from_slice(&compressed);
        if with_signature {
            out.extend_from_slice(&0x08074B50u32.to_le_bytes());
        }
        out.extend_from_slice(&Crc32::compute(data).to_le_bytes());
        out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out
    }

    #[test]
    fn test_descriptor_with_and_without_signature() {
        let mut stream = deferred_entry("one.txt", b"first entry body", true);
        stream.extend(deferred_entry("two.txt", b"second entry body, a bit longer", false));

        let mut reader = ZipStreamReader::new(Cursor::new(stream));
        let first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.name, "one.txt");
        assert_eq!(first.size, None);

        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"first entry body");
        assert_eq!(reader.entry().unwrap().size, Some(16));

        let second = reader.next_entry().unwrap().unwrap();
        assert_eq!(second.name, "two.txt");
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"second entry body, a bit longer");

        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_skips_unread_data() {
        let mut stream = deferred_entry("a", &[b'x'; 5000], true);
        stream.extend(deferred_entry("b", b"tail", true));

        let mut reader = ZipStreamReader::new(Cursor::new(stream));
        reader.next_entry().unwrap();
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.name, "b");
    }

    #[test]
    fn test_bad_descriptor_crc() {
        let mut stream = deferred_entry("a", b"payload", true);
        let len = stream.len();
        stream[len - 12] ^= 0xFF;

        stream.extend(deferred_entry("b", b"after the bad one", false));

        let mut reader = ZipStreamReader::new(Cursor::new(stream));
        reader.next_entry().unwrap();
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        let err = OxiZipError::from(err);
        assert!(matches!(err, OxiZipError::CrcMismatch { .. }));

        // The trailer was read, so the next entry is still reachable.
        let next = reader.next_entry().unwrap().unwrap();
        assert_eq!(next.name, "b");
        let mut data = Vec::new();
        reader.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"after the bad one");
    }

    #[test]
    fn test_truncated_body_keeps_failing() {
        let mut stream = deferred_entry("a", &[b'q'; 3000], true);
        stream.truncate(LOCAL_HEADER_LEN + 1 + 4);

        let mut reader = ZipStreamReader::new(Cursor::new(stream));
        reader.next_entry().unwrap();
        assert!(reader.read_to_end(&mut Vec::new()).is_err());
        let err = reader.next_entry().unwrap_err();
        assert_eq!(err.kind(), oxizip_core::ErrorKind::InvalidState);
        assert!(reader.next_entry().is_err());
    }

    #[test]
    fn test_stored_with_descriptor_rejected() {
        let header = LocalFileHeader {
            flags: FLAG_DATA_DESCRIPTOR,
            method: 0,
            ..Default::default()
        };
        let mut stream = Vec::new();
        header.write(&mut stream, b"s", b"").unwrap();

        let mut reader = ZipStreamReader::new(Cursor::new(stream));
        let err = reader.next_entry().unwrap_err();
        assert_eq!(err.kind(), oxizip_core::ErrorKind::Format);
    }

    #[test]
    fn test_empty_input_has_no_entries() {
        let mut reader = ZipStreamReader::new(Cursor::new(Vec::new()));
        assert!(reader.next_entry().unwrap().is_none());
        assert!(reader.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_garbage_signature() {
        let mut reader = ZipStreamReader::new(Cursor::new(b"not a zip".to_vec()));
        assert!(reader.next_entry().is_err());
    }
}
