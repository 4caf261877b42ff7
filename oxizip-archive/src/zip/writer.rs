//! Streaming ZIP writing.

use super::entry::{is_dos_exact, to_dos_time, ZipEntry, ZipMethod};
use super::extra::{self, ExtraTimes, Zip64Values, EXTENDED_TIMESTAMP_ID, NTFS_EXTRA_ID, ZIP64_EXTRA_ID};
use super::spec::{
    clamp32, CentralDirectoryRecord, DataDescriptor, EndOfCentralDirectory, LocalFileHeader,
    Zip64EndOfCentralDirectory, Zip64Locator, FLAG_DATA_DESCRIPTOR, FLAG_UTF8, MAX_COMMENT_LEN,
    VERSION_DEFLATED, VERSION_MADE_BY, VERSION_STORED, VERSION_ZIP64, ZIP64_MARKER_16,
    ZIP64_MARKER_32,
};
use log::debug;
use oxizip_core::charset::NameCodec;
use oxizip_core::crc::Crc32;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::{CompressStatus, CompressionLevel, Compressor, DeflateCompressor, FlushMode};
use std::collections::HashSet;
use std::io::{self, Write};
use std::time::SystemTime;

/// Output buffer size for the compressor.
const OUTPUT_CHUNK_LEN: usize = 32 * 1024;

/// Default Unix mode for file entries.
const DEFAULT_FILE_MODE: u32 = 0o100644;

/// Options for writing a ZIP archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipWriteOptions {
    /// Deflate level.
    pub level: CompressionLevel,
    /// Method used by [`ZipWriter::add_file`].
    pub method: ZipMethod,
    /// Charset for names and comments; UTF-8 sets general purpose bit 11.
    pub codec: NameCodec,
    /// Archive comment.
    pub comment: Option<String>,
}

impl ZipWriteOptions {
    /// Default options: deflate at level 6, UTF-8 names, no comment.
    pub fn new() -> Self {
        Self {
            level: CompressionLevel::DEFAULT,
            method: ZipMethod::Deflated,
            codec: NameCodec::utf8(),
            comment: None,
        }
    }

    /// Set the deflate level.
    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    /// Set the method used by `add_file`.
    pub fn with_method(mut self, method: ZipMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the charset for names and comments.
    pub fn with_codec(mut self, codec: NameCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the archive comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

impl Default for ZipWriteOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts bytes written to the underlying sink.
#[derive(Debug)]
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// An entry whose data has been written, kept for the central directory.
#[derive(Debug)]
struct WrittenEntry {
    name: Vec<u8>,
    comment: Vec<u8>,
    /// Extra field without ZIP64 information.
    extra: Vec<u8>,
    flags: u16,
    method: ZipMethod,
    dos_time: u32,
    crc32: u32,
    size: u64,
    compressed_size: u64,
    header_offset: u64,
    external_attributes: u32,
}

/// The entry currently being written.
#[derive(Debug)]
struct OpenEntry {
    written: WrittenEntry,
    display_name: String,
    deferred: bool,
    /// Declared values checked at close for non-deferred entries.
    declared_size: u64,
    declared_compressed: u64,
    declared_crc: u32,
    crc: Crc32,
    bytes_in: u64,
    bytes_out: u64,
}

/// Streaming ZIP writer.
///
/// Local headers are written as soon as an entry begins. Deflated entries
/// whose sizes are not known up front get a data descriptor after their
/// data. [`finish`](Self::finish) writes the central directory; an archive
/// dropped without it is incomplete and only readable with
/// [`ZipStreamReader`](super::ZipStreamReader).
///
/// # Example
///
/// ```rust
/// use oxizip_archive::zip::ZipWriter;
///
/// let mut writer = ZipWriter::new(Vec::new());
/// writer.add_file("hello.txt", b"Hello, World!").unwrap();
/// writer.add_directory("docs").unwrap();
/// let bytes = writer.into_inner().unwrap();
/// assert_eq!(&bytes[..4], b"PK\x03\x04");
/// ```
pub struct ZipWriter<W: Write> {
    out: CountingWriter<W>,
    options: ZipWriteOptions,
    compressor: Box<dyn Compressor + Send>,
    /// Installed at the next `begin_entry` so an open entry keeps its stream.
    next_compressor: Option<Box<dyn Compressor + Send>>,
    entries: Vec<WrittenEntry>,
    names: HashSet<String>,
    current: Option<OpenEntry>,
    buffer: Vec<u8>,
    finished: bool,
    poisoned: Option<String>,
}

impl<W: Write> ZipWriter<W> {
    /// Create a writer with default options.
    pub fn new(writer: W) -> Self {
        Self::with_options(writer, ZipWriteOptions::default())
    }

    /// Create a writer with the given options.
    pub fn with_options(writer: W, options: ZipWriteOptions) -> Self {
        Self {
            out: CountingWriter {
                inner: writer,
                count: 0,
            },
            compressor: Box::new(DeflateCompressor::new(options.level)),
            next_compressor: None,
            options,
            entries: Vec::new(),
            names: HashSet::new(),
            current: None,
            buffer: vec![0u8; OUTPUT_CHUNK_LEN],
            finished: false,
            poisoned: None,
        }
    }

    /// Set the archive comment (at most 65535 encoded bytes).
    pub fn set_comment(&mut self, comment: impl Into<String>) -> Result<()> {
        let comment = comment.into();
        if self.options.codec.encode(&comment)?.len() > MAX_COMMENT_LEN {
            return Err(OxiZipError::invalid_entry("<archive>", "archive comment too long"));
        }
        self.options.comment = Some(comment);
        Ok(())
    }

    /// Set the deflate level for entries begun after this call.
    pub fn set_level(&mut self, level: CompressionLevel) {
        if level != self.options.level {
            self.options.level = level;
            self.next_compressor = Some(Box::new(DeflateCompressor::new(level)));
        }
    }

    /// Set the method used by [`add_file`](Self::add_file).
    pub fn set_method(&mut self, method: ZipMethod) {
        self.options.method = method;
    }

    /// Replace the compressor used for deflated entries begun after this call.
    pub fn set_compressor(&mut self, compressor: Box<dyn Compressor + Send>) {
        self.next_compressor = Some(compressor);
    }

    /// Number of entries written or in progress.
    pub fn len(&self) -> usize {
        self.entries.len() + usize::from(self.current.is_some())
    }

    /// Check if no entry has been started.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.out.count
    }

    /// Reference to the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.out.inner
    }

    fn check_usable(&self) -> Result<()> {
        if let Some(reason) = &self.poisoned {
            return Err(OxiZipError::invalid_state(format!("writer unusable after failed entry: {reason}")));
        }
        if self.finished {
            return Err(OxiZipError::invalid_state("archive already finished"));
        }
        Ok(())
    }

    fn poison<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.poisoned = Some(e.to_string());
        }
        result
    }

    /// Begin a new entry, closing the current one first.
    pub fn begin_entry(&mut self, entry: ZipEntry) -> Result<()> {
        self.check_usable()?;
        if self.current.is_some() {
            self.close_entry()?;
        }
        if self.names.contains(&entry.name) {
            return Err(OxiZipError::invalid_entry(&entry.name, "duplicate entry name"));
        }

        let codec = self.options.codec;
        let name = codec.encode(&entry.name)?.into_owned();
        if name.len() > MAX_COMMENT_LEN {
            return Err(OxiZipError::invalid_entry(&entry.name, "entry name too long"));
        }
        let comment = match &entry.comment {
            Some(comment) => codec.encode(comment)?.into_owned(),
            None => Vec::new(),
        };
        if comment.len() > MAX_COMMENT_LEN {
            return Err(OxiZipError::invalid_entry(&entry.name, "entry comment too long"));
        }

        let mut size = entry.size;
        let mut compressed_size = entry.compressed_size;
        let deferred = match entry.method {
            ZipMethod::Stored => {
                if size.is_none() {
                    size = compressed_size;
                } else if compressed_size.is_none() {
                    compressed_size = size;
                }
                match (size, compressed_size, entry.crc32) {
                    (Some(s), Some(c), Some(_)) if s == c => false,
                    (Some(_), Some(_), Some(_)) => {
                        return Err(OxiZipError::invalid_entry(
                            &entry.name,
                            "STORED entry where compressed != uncompressed size",
                        ));
                    }
                    _ => {
                        return Err(OxiZipError::invalid_entry(
                            &entry.name,
                            "STORED entry missing size, compressed size, or crc-32",
                        ));
                    }
                }
            }
            ZipMethod::Deflated => {
                size.is_none() || compressed_size.is_none() || entry.crc32.is_none()
            }
        };

        let mut flags = 0u16;
        if deferred {
            flags |= FLAG_DATA_DESCRIPTOR;
        }
        if codec.is_utf8() {
            flags |= FLAG_UTF8;
        }

        let modified = entry.modified.unwrap_or_else(SystemTime::now);
        let dos_time = to_dos_time(modified);
        let times = ExtraTimes {
            modified: (!is_dos_exact(modified) || entry.accessed.is_some() || entry.created.is_some())
                .then_some(modified),
            accessed: entry.accessed,
            created: entry.created,
        };
        let user_extra = extra::strip(&entry.extra, &[ZIP64_EXTRA_ID, EXTENDED_TIMESTAMP_ID, NTFS_EXTRA_ID]);

        let known_size = if deferred { None } else { size };
        let known_compressed = if deferred { None } else { compressed_size };
        let local_zip64 = known_size.is_some_and(|s| s >= u64::from(ZIP64_MARKER_32))
            || known_compressed.is_some_and(|c| c >= u64::from(ZIP64_MARKER_32));

        let mut local_extra = times.to_extra(false);
        local_extra.extend_from_slice(&user_extra);
        if local_zip64 {
            local_extra.extend(
                Zip64Values {
                    size: known_size,
                    compressed_size: known_compressed,
                    header_offset: None,
                }
                .to_extra(),
            );
        }
        if local_extra.len() > MAX_COMMENT_LEN {
            return Err(OxiZipError::invalid_entry(&entry.name, "extra field too long"));
        }

        let mut central_extra = times.to_extra(true);
        central_extra.extend_from_slice(&user_extra);

        let version_needed = if local_zip64 {
            VERSION_ZIP64
        } else if entry.method == ZipMethod::Deflated {
            VERSION_DEFLATED
        } else {
            VERSION_STORED
        };
        let header = LocalFileHeader {
            version_needed,
            flags,
            method: entry.method.code(),
            dos_time,
            crc32: if deferred { 0 } else { entry.crc32.unwrap_or(0) },
            compressed_size: match known_compressed {
                Some(_) if local_zip64 => ZIP64_MARKER_32,
                Some(c) => c as u32,
                None => 0,
            },
            uncompressed_size: match known_size {
                Some(_) if local_zip64 => ZIP64_MARKER_32,
                Some(s) => s as u32,
                None => 0,
            },
            name_len: name.len() as u16,
            extra_len: local_extra.len() as u16,
        };

        let header_offset = self.out.count;
        let result = header.write(&mut self.out, &name, &local_extra);
        self.poison(result)?;
        debug!("begin entry {} at {header_offset} ({}, deferred: {deferred})", entry.name, entry.method);

        if let Some(compressor) = self.next_compressor.take() {
            self.compressor = compressor;
        }
        self.compressor.reset();
        self.names.insert(entry.name.clone());
        let external_attributes = match entry.external_attributes {
            0 if entry.is_dir() => 0o40755 << 16,
            0 => DEFAULT_FILE_MODE << 16,
            attrs => attrs,
        };
        self.current = Some(OpenEntry {
            written: WrittenEntry {
                name,
                comment,
                extra: central_extra,
                flags,
                method: entry.method,
                dos_time,
                crc32: 0,
                size: 0,
                compressed_size: 0,
                header_offset,
                external_attributes,
            },
            display_name: entry.name,
            deferred,
            declared_size: size.unwrap_or(0),
            declared_compressed: compressed_size.unwrap_or(0),
            declared_crc: entry.crc32.unwrap_or(0),
            crc: Crc32::new(),
            bytes_in: 0,
            bytes_out: 0,
        });
        Ok(())
    }

    fn write_entry_data(&mut self, data: &[u8]) -> Result<()> {
        self.check_usable()?;
        let Some(current) = self.current.as_mut() else {
            return Err(OxiZipError::invalid_state("no entry is open"));
        };

        match current.written.method {
            ZipMethod::Stored => {
                if current.bytes_in + data.len() as u64 > current.declared_size {
                    return Err(OxiZipError::invalid_entry(
                        &current.display_name,
                        "attempt to write past end of STORED entry",
                    ));
                }
                current.crc.update(data);
                current.bytes_in += data.len() as u64;
                current.bytes_out += data.len() as u64;
                let result = self.out.write_all(data).map_err(OxiZipError::from);
                self.poison(result)
            }
            ZipMethod::Deflated => {
                current.crc.update(data);
                current.bytes_in += data.len() as u64;
                let result = self.compress(data, FlushMode::None);
                self.poison(result)
            }
        }
    }

    /// Feed `input` to the compressor, writing everything it produces.
    fn compress(&mut self, mut input: &[u8], flush: FlushMode) -> Result<()> {
        loop {
            let (consumed, produced, status) = self.compressor.compress(input, &mut self.buffer, flush)?;
            input = &input[consumed..];
            self.out.write_all(&self.buffer[..produced])?;
            if let Some(current) = self.current.as_mut() {
                current.bytes_out += produced as u64;
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

    /// Finish the current entry: flush the compressor, then write the data
    /// descriptor or check the declared values.
    pub fn close_entry(&mut self) -> Result<()> {
        self.check_usable()?;
        if self.current.is_none() {
            return Ok(());
        }
        let result = self.close_entry_inner();
        self.poison(result)
    }

    fn close_entry_inner(&mut self) -> Result<()> {
        if self.current.as_ref().is_some_and(|c| c.written.method == ZipMethod::Deflated) {
            self.compress(&[], FlushMode::Finish)?;
        }
        let Some(mut current) = self.current.take() else {
            return Ok(());
        };

        let crc = current.crc.value();
        let size = current.bytes_in;
        let compressed = current.bytes_out;
        let name = &current.display_name;

        if current.deferred {
            let zip64 = size >= u64::from(ZIP64_MARKER_32) || compressed >= u64::from(ZIP64_MARKER_32);
            DataDescriptor {
                crc32: crc,
                compressed_size: compressed,
                uncompressed_size: size,
            }
            .write(&mut self.out, zip64)?;
        } else {
            if size != current.declared_size {
                return Err(OxiZipError::size_mismatch(name, "size", current.declared_size, size));
            }
            if compressed != current.declared_compressed {
                return Err(OxiZipError::size_mismatch(
                    name,
                    "compressed size",
                    current.declared_compressed,
                    compressed,
                ));
            }
            if crc != current.declared_crc {
                return Err(OxiZipError::crc_mismatch(name, current.declared_crc, crc));
            }
        }

        debug!("closed entry {name}: {size} -> {compressed} bytes");
        current.written.crc32 = crc;
        current.written.size = size;
        current.written.compressed_size = compressed;
        self.entries.push(current.written);
        Ok(())
    }

    /// Write the central directory and end records. Idempotent.
    pub fn finish(&mut self) -> Result<()> {
        if self.finished && self.poisoned.is_none() {
            return Ok(());
        }
        self.close_entry()?;
        let result = self.write_central_directory();
        self.poison(result)?;
        self.finished = true;
        Ok(())
    }

    fn write_central_directory(&mut self) -> Result<()> {
        let cen_start = self.out.count;

        for entry in &self.entries {
            let zip64 = Zip64Values {
                size: (entry.size >= u64::from(ZIP64_MARKER_32)).then_some(entry.size),
                compressed_size: (entry.compressed_size >= u64::from(ZIP64_MARKER_32))
                    .then_some(entry.compressed_size),
                header_offset: (entry.header_offset >= u64::from(ZIP64_MARKER_32))
                    .then_some(entry.header_offset),
            };
            let zip64_extra = zip64.to_extra();
            let mut extra = entry.extra.clone();
            extra.extend_from_slice(&zip64_extra);
            if extra.len() > MAX_COMMENT_LEN {
                return Err(OxiZipError::invalid_entry(
                    String::from_utf8_lossy(&entry.name),
                    "extra field too long",
                ));
            }

            let version_needed = if !zip64_extra.is_empty() {
                VERSION_ZIP64
            } else if entry.method == ZipMethod::Deflated {
                VERSION_DEFLATED
            } else {
                VERSION_STORED
            };
            let record = CentralDirectoryRecord {
                version_made_by: VERSION_MADE_BY,
                version_needed,
                flags: entry.flags,
                method: entry.method.code(),
                dos_time: entry.dos_time,
                crc32: entry.crc32,
                compressed_size: clamp32(entry.compressed_size),
                uncompressed_size: clamp32(entry.size),
                name_len: entry.name.len() as u16,
                extra_len: extra.len() as u16,
                comment_len: entry.comment.len() as u16,
                disk_start: 0,
                internal_attr: 0,
                external_attr: entry.external_attributes,
                local_header_offset: clamp32(entry.header_offset),
            };
            record.write(&mut self.out, &entry.name, &extra, &entry.comment)?;
        }

        let cen_len = self.out.count - cen_start;
        let count = self.entries.len() as u64;
        let needs_zip64 = count >= u64::from(ZIP64_MARKER_16)
            || cen_len >= u64::from(ZIP64_MARKER_32)
            || cen_start >= u64::from(ZIP64_MARKER_32);

        if needs_zip64 {
            let end64_pos = self.out.count;
            Zip64EndOfCentralDirectory {
                version_made_by: VERSION_MADE_BY,
                version_needed: VERSION_ZIP64,
                disk_number: 0,
                cd_disk: 0,
                entries_on_disk: count,
                total_entries: count,
                cd_size: cen_len,
                cd_offset: cen_start,
            }
            .write(&mut self.out)?;
            Zip64Locator {
                disk: 0,
                end_record_offset: end64_pos,
                total_disks: 1,
            }
            .write(&mut self.out)?;
            debug!("wrote ZIP64 end record at {end64_pos}");
        }

        let comment = match &self.options.comment {
            Some(comment) => self.options.codec.encode(comment)?.into_owned(),
            None => Vec::new(),
        };
        let count16 = if count >= u64::from(ZIP64_MARKER_16) {
            ZIP64_MARKER_16
        } else {
            count as u16
        };
        EndOfCentralDirectory {
            disk_number: 0,
            cd_disk: 0,
            entries_on_disk: count16,
            total_entries: count16,
            cd_size: clamp32(cen_len),
            cd_offset: clamp32(cen_start),
            comment_len: comment.len() as u16,
        }
        .write(&mut self.out, &comment)?;
        self.out.flush()?;
        debug!("finished archive: {count} entries, directory of {cen_len} bytes at {cen_start}");
        Ok(())
    }

    /// Finish the archive and return the underlying sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        Ok(self.out.inner)
    }

    /// Add a file with its full contents, using the writer's method.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let mut entry = ZipEntry::new(name).with_method(self.options.method);
        if self.options.method == ZipMethod::Stored {
            entry = entry
                .with_size(data.len() as u64)
                .with_crc32(Crc32::compute(data));
        }
        self.begin_entry(entry)?;
        self.write_entry_data(data)?;
        self.close_entry()
    }

    /// Add an empty directory entry; a trailing `/` is added if missing.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        self.begin_entry(ZipEntry::directory(name))?;
        self.close_entry()
    }
}

impl<W: Write> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_entry_data(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

impl<W: Write> std::fmt::Debug for ZipWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipWriter")
            .field("entries", &self.entries.len())
            .field("current", &self.current.as_ref().map(|c| &c.display_name))
            .field("bytes_written", &self.out.count)
            .field("finished", &self.finished)
            .field("poisoned", &self.poisoned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::spec::{u16_at, u32_at, END_RECORD_LEN};

    #[test]
    fn test_empty_archive_is_end_record_only() {
        let bytes = ZipWriter::new(Vec::new()).into_inner().unwrap();
        assert_eq!(bytes.len(), END_RECORD_LEN);
        assert_eq!(&bytes[..4], b"PK\x05\x06");
    }

    #[test]
    fn test_deferred_deflate_sets_flag_and_descriptor() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.begin_entry(ZipEntry::new("a.txt")).unwrap();
        writer.write_all(b"hello hello hello").unwrap();
        writer.close_entry().unwrap();
        let bytes = writer.get_ref().clone();

        let flags = u16_at(&bytes, 6);
        assert_ne!(flags & FLAG_DATA_DESCRIPTOR, 0);
        assert_ne!(flags & FLAG_UTF8, 0);
        // Zero placeholders in the local header.
        assert_eq!(u32_at(&bytes, 14), 0);
        assert_eq!(u32_at(&bytes, 18), 0);
        // Descriptor with signature at the end.
        assert_eq!(u32_at(&bytes, bytes.len() - 16), 0x08074B50);
        assert_eq!(u32_at(&bytes, bytes.len() - 12), Crc32::compute(b"hello hello hello"));
    }

    #[test]
    fn test_duplicate_name() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_file("same", b"1").unwrap();
        let err = writer.begin_entry(ZipEntry::new("same")).unwrap_err();
        assert!(matches!(err, OxiZipError::InvalidEntry { .. }));
        // Different case is a different name.
        writer.add_file("SAME", b"2").unwrap();
    }

    #[test]
    fn test_stored_requires_sizes_and_crc() {
        let mut writer = ZipWriter::new(Vec::new());
        let entry = ZipEntry::new("s").with_method(ZipMethod::Stored).with_size(3);
        assert!(matches!(writer.begin_entry(entry), Err(OxiZipError::InvalidEntry { .. })));

        let entry = ZipEntry::new("s")
            .with_method(ZipMethod::Stored)
            .with_size(3)
            .with_compressed_size(4)
            .with_crc32(0);
        assert!(matches!(writer.begin_entry(entry), Err(OxiZipError::InvalidEntry { .. })));

        // Compressed size alone is copied to size.
        let entry = ZipEntry::new("s")
            .with_method(ZipMethod::Stored)
            .with_compressed_size(3)
            .with_crc32(Crc32::compute(b"abc"));
        writer.begin_entry(entry).unwrap();
        writer.write_all(b"abc").unwrap();
        writer.close_entry().unwrap();
    }

    #[test]
    fn test_stored_overflow_rejected() {
        let mut writer = ZipWriter::new(Vec::new());
        let entry = ZipEntry::new("s")
            .with_method(ZipMethod::Stored)
            .with_size(2)
            .with_crc32(0);
        writer.begin_entry(entry).unwrap();
        let err = writer.write_entry_data(b"abc").unwrap_err();
        assert!(matches!(err, OxiZipError::InvalidEntry { .. }));
    }

    #[test]
    fn test_wrong_declared_crc_poisons_writer() {
        let mut writer = ZipWriter::new(Vec::new());
        let entry = ZipEntry::new("s")
            .with_method(ZipMethod::Stored)
            .with_size(3)
            .with_crc32(0xDEADBEEF);
        writer.begin_entry(entry).unwrap();
        writer.write_all(b"abc").unwrap();

        let err = writer.close_entry().unwrap_err();
        assert!(matches!(err, OxiZipError::CrcMismatch { .. }));
        let err = writer.finish().unwrap_err();
        assert!(matches!(err, OxiZipError::InvalidState { .. }));
        assert!(writer.add_file("more", b"x").is_err());
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_file("a", b"a").unwrap();
        writer.finish().unwrap();
        let len = writer.get_ref().len();
        writer.finish().unwrap();
        assert_eq!(writer.get_ref().len(), len);
        assert!(writer.add_file("b", b"b").is_err());
    }

    #[test]
    fn test_comment_limit() {
        let mut writer = ZipWriter::new(Vec::new());
        assert!(writer.set_comment("x".repeat(MAX_COMMENT_LEN)).is_ok());
        assert!(writer.set_comment("x".repeat(MAX_COMMENT_LEN + 1)).is_err());
    }

    #[test]
    fn test_known_sizes_skip_descriptor() {
        let data = b"known in advance";
        let compressed = oxizip_core::deflate::deflate(data, CompressionLevel::DEFAULT).unwrap();

        let mut writer = ZipWriter::new(Vec::new());
        let entry = ZipEntry::new("k")
            .with_modified(crate::zip::entry::from_dos_time(crate::zip::entry::DOS_EPOCH))
            .with_size(data.len() as u64)
            .with_compressed_size(compressed.len() as u64)
            .with_crc32(Crc32::compute(data));
        writer.begin_entry(entry).unwrap();
        writer.write_all(data).unwrap();
        writer.close_entry().unwrap();

        let bytes = writer.get_ref();
        assert_eq!(u16_at(bytes, 6) & FLAG_DATA_DESCRIPTOR, 0);
        assert_eq!(bytes.len(), 30 + 1 + compressed.len());
    }

    #[test]
    fn test_level_change_waits_for_next_entry() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.begin_entry(ZipEntry::new("open")).unwrap();
        writer.write_all(b"written before the change").unwrap();
        writer.set_level(CompressionLevel::BEST);
        assert!(writer.next_compressor.is_some());
        writer.write_all(b" and after it").unwrap();

        writer.begin_entry(ZipEntry::new("next")).unwrap();
        assert!(writer.next_compressor.is_none());
        assert_eq!(writer.options.level, CompressionLevel::BEST);
    }
}
