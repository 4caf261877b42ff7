//! Random-access ZIP reading.

use super::entry::{ZipEntry, ZipMethod};
use super::shared::{PooledDecompressor, ReadSeek, SharedArchive};
use super::spec::{LocalFileHeader, LOCAL_HEADER_LEN};
use oxizip_core::charset::NameCodec;
use oxizip_core::crc::Crc32;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::DecompressStatus;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Compressed bytes fetched per positioned read.
const INPUT_CHUNK_LEN: usize = 8 * 1024;

/// Options for opening a ZIP archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipReadOptions {
    /// Charset for names and comments without the UTF-8 flag.
    pub codec: NameCodec,
    /// Share one index among handles on the same file.
    pub use_cache: bool,
}

impl ZipReadOptions {
    /// Default options: UTF-8 names, cache enabled.
    pub fn new() -> Self {
        Self {
            codec: NameCodec::utf8(),
            use_cache: true,
        }
    }

    /// Set the charset for names without the UTF-8 flag.
    pub fn with_codec(mut self, codec: NameCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Enable or disable the shared index cache.
    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }
}

impl Default for ZipReadOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// A ZIP archive opened for random access.
///
/// Handles opened on the same unchanged file share their index and file
/// handle. Entry streams hold their own reference, so they stay usable after
/// the handle is dropped, but [`close`](Self::close) ends them.
///
/// # Example
///
/// ```rust,no_run
/// use oxizip_archive::zip::ZipArchive;
///
/// let archive = ZipArchive::open("archive.zip").unwrap();
/// for entry in archive.entries().unwrap() {
///     let entry = entry.unwrap();
///     println!("{} ({} bytes)", entry.name, entry.size.unwrap_or(0));
/// }
/// let data = archive.read_entry("readme.txt").unwrap();
/// ```
pub struct ZipArchive {
    shared: Option<Arc<SharedArchive>>,
    streams: Mutex<Vec<Weak<AtomicBool>>>,
}

impl ZipArchive {
    /// Open an archive with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ZipReadOptions::default())
    }

    /// Open an archive.
    pub fn open_with_options(path: impl AsRef<Path>, options: ZipReadOptions) -> Result<Self> {
        let path = path.as_ref();
        let shared = SharedArchive::open(path, options.codec, options.use_cache)
            .map_err(|e| e.in_archive(path))?;
        Ok(Self::with_shared(shared))
    }

    /// Read an archive from any seekable source. The index is not cached.
    pub fn from_reader<R: Read + io::Seek + Send + 'static>(
        reader: R,
        options: ZipReadOptions,
    ) -> Result<Self> {
        let reader: Box<dyn ReadSeek> = Box::new(reader);
        Ok(Self::with_shared(SharedArchive::from_reader(reader, options.codec)?))
    }

    fn with_shared(shared: Arc<SharedArchive>) -> Self {
        Self {
            shared: Some(shared),
            streams: Mutex::new(Vec::new()),
        }
    }

    fn shared(&self) -> Result<&Arc<SharedArchive>> {
        self.shared
            .as_ref()
            .ok_or_else(|| OxiZipError::invalid_state("archive is closed"))
    }

    /// Look up an entry by name (a bare directory name also finds `name/`).
    pub fn entry(&self, name: &str) -> Result<Option<ZipEntry>> {
        self.shared()?.directory.entry(name)
    }

    /// Iterate over entries in central directory order.
    pub fn entries(&self) -> Result<Entries<'_>> {
        Ok(Entries {
            shared: self.shared()?,
            index: 0,
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.shared.as_ref().map_or(0, |s| s.directory.len())
    }

    /// Check if the archive has no entries (or is closed).
    pub fn is_empty(&self) -> bool {
        self.shared.as_ref().is_none_or(|s| s.directory.is_empty())
    }

    /// Archive comment.
    pub fn comment(&self) -> Result<Option<String>> {
        self.shared()?.directory.comment()
    }

    /// Names of non-directory entries under `META-INF/`.
    pub fn metadata_names(&self) -> Result<Vec<String>> {
        self.shared()?.directory.metadata_names()
    }

    /// Whether the archive uses a ZIP64 end record.
    pub fn is_zip64(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.directory.is_zip64())
    }

    /// Canonical path of the archive, if opened from a file.
    pub fn path(&self) -> Option<&Path> {
        self.shared.as_ref().and_then(|s| s.path())
    }

    /// Number of live references to the shared index (handles and streams).
    pub fn shared_count(&self) -> usize {
        self.shared.as_ref().map_or(0, Arc::strong_count)
    }

    /// Open a stream over the uncompressed data of `entry`.
    pub fn open_entry_stream(&self, entry: &ZipEntry) -> Result<ZipEntryReader> {
        let shared = self.shared()?;
        let missing = || OxiZipError::invalid_entry(&entry.name, "entry was not read from an archive");
        let header_offset = entry.header_offset.ok_or_else(missing)?;
        let compressed_size = entry.compressed_size.ok_or_else(missing)?;
        let size = entry.size.ok_or_else(missing)?;
        let crc32 = entry.crc32.ok_or_else(missing)?;

        let decoder = match entry.method {
            ZipMethod::Stored => None,
            ZipMethod::Deflated => Some(shared.pool.acquire()),
        };

        let closed = Arc::new(AtomicBool::new(false));
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        streams.retain(|weak| weak.strong_count() > 0);
        streams.push(Arc::downgrade(&closed));

        Ok(ZipEntryReader {
            shared: Arc::clone(shared),
            closed,
            name: entry.name.clone(),
            header_offset,
            data_offset: None,
            compressed_size,
            fetched: 0,
            expected_size: size,
            expected_crc: crc32,
            crc: Crc32::new(),
            produced: 0,
            decoder,
            input: Vec::new(),
            input_pos: 0,
            done: false,
        })
    }

    /// Open a stream over the entry named `name`.
    pub fn by_name(&self, name: &str) -> Result<ZipEntryReader> {
        let entry = self
            .entry(name)?
            .ok_or_else(|| OxiZipError::entry_not_found(name))?;
        self.open_entry_stream(&entry)
    }

    /// Read the whole uncompressed content of `name`.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let mut stream = self.by_name(name)?;
        let mut data = Vec::with_capacity(stream.expected_size.min(1 << 24) as usize);
        stream.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Close the archive and every stream opened from it. Idempotent.
    pub fn close(&mut self) {
        let mut streams = self.streams.lock().unwrap_or_else(PoisonError::into_inner);
        for closed in streams.drain(..).filter_map(|weak| weak.upgrade()) {
            closed.store(true, Ordering::Release);
        }
        self.shared = None;
    }
}

impl std::fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("path", &self.path())
            .field("entries", &self.len())
            .field("closed", &self.shared.is_none())
            .finish()
    }
}

/// Iterator over archive entries in directory order.
pub struct Entries<'a> {
    shared: &'a SharedArchive,
    index: usize,
}

impl Iterator for Entries<'_> {
    type Item = Result<ZipEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let pos = self.shared.directory.position(self.index)?;
        self.index += 1;
        Some(self.shared.directory.entry_at(pos))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.shared.directory.len() - self.index;
        (remaining, Some(remaining))
    }
}

/// Stream over one entry's uncompressed data.
///
/// The CRC and size are checked once the data is exhausted; a mismatch
/// surfaces as an error from the final `read`.
pub struct ZipEntryReader {
    shared: Arc<SharedArchive>,
    closed: Arc<AtomicBool>,
    name: String,
    header_offset: u64,
    data_offset: Option<u64>,
    compressed_size: u64,
    /// Compressed bytes read from the archive so far.
    fetched: u64,
    expected_size: u64,
    expected_crc: u32,
    crc: Crc32,
    produced: u64,
    decoder: Option<PooledDecompressor>,
    input: Vec<u8>,
    input_pos: usize,
    done: bool,
}

impl ZipEntryReader {
    /// Name of the entry being read.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Uncompressed size declared by the central directory.
    pub fn size(&self) -> u64 {
        self.expected_size
    }

    /// Check if the owning archive was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Start of the entry data, from the local header's own lengths.
    fn data_offset(&mut self) -> Result<u64> {
        if let Some(offset) = self.data_offset {
            return Ok(offset);
        }
        let mut buf = [0u8; LOCAL_HEADER_LEN];
        self.shared.source.read_at(&mut buf, self.header_offset)?;
        let header = LocalFileHeader::parse(&buf, self.header_offset)
            .map_err(|_| OxiZipError::format(self.header_offset, format!("invalid LOC header for {}", self.name)))?;
        let offset = self.header_offset + LOCAL_HEADER_LEN as u64 + header.variable_len();
        self.data_offset = Some(offset);
        Ok(offset)
    }

    fn read_stored(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.compressed_size - self.fetched;
        let n = (buf.len() as u64).min(remaining) as usize;
        if n == 0 {
            self.finish()?;
            return Ok(0);
        }
        let offset = self.data_offset()? + self.fetched;
        self.shared.source.read_at(&mut buf[..n], offset)?;
        self.fetched += n as u64;
        self.produced += n as u64;
        self.crc.update(&buf[..n]);
        if self.fetched == self.compressed_size {
            self.finish()?;
        }
        Ok(n)
    }

    fn read_deflated(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            if self.input_pos == self.input.len() && self.fetched < self.compressed_size {
                let n = (self.compressed_size - self.fetched).min(INPUT_CHUNK_LEN as u64) as usize;
                let offset = self.data_offset()? + self.fetched;
                self.input.resize(n, 0);
                self.shared.source.read_at(&mut self.input, offset)?;
                self.fetched += n as u64;
                self.input_pos = 0;
            }

            let Some(decoder) = self.decoder.as_mut() else {
                return Err(OxiZipError::invalid_state("decompressor released"));
            };
            let (consumed, produced, status) =
                decoder.decompress(&self.input[self.input_pos..], buf)?;
            self.input_pos += consumed;
            self.crc.update(&buf[..produced]);
            self.produced += produced as u64;

            if status == DecompressStatus::Done {
                self.finish()?;
                return Ok(produced);
            }
            if produced > 0 {
                return Ok(produced);
            }
            if consumed == 0 && self.input_pos == self.input.len() && self.fetched == self.compressed_size {
                return Err(OxiZipError::unexpected_eof(format!(
                    "compressed data of {} ended before the deflate stream",
                    self.name
                )));
            }
        }
    }

    /// Verify size and CRC, release the decompressor.
    fn finish(&mut self) -> Result<()> {
        self.done = true;
        self.decoder = None;
        self.input = Vec::new();

        if self.produced != self.expected_size {
            return Err(OxiZipError::size_mismatch(
                &self.name,
                "size",
                self.expected_size,
                self.produced,
            ));
        }
        let crc = self.crc.value();
        if crc != self.expected_crc {
            return Err(OxiZipError::crc_mismatch(&self.name, self.expected_crc, crc));
        }
        Ok(())
    }
}

impl Read for ZipEntryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.is_closed() {
            self.done = true;
            self.decoder = None;
            self.input = Vec::new();
            return Err(OxiZipError::invalid_state(format!("stream for {} is closed", self.name)).into());
        }
        if self.done || buf.is_empty() {
            return Ok(0);
        }
        let result = if self.decoder.is_some() {
            self.read_deflated(buf)
        } else {
            self.read_stored(buf)
        };
        result.map_err(|e| {
            self.done = true;
            self.decoder = None;
            e.into()
        })
    }
}

impl std::fmt::Debug for ZipEntryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipEntryReader")
            .field("name", &self.name)
            .field("produced", &self.produced)
            .field("size", &self.expected_size)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::ZipWriter;
    use std::io::Cursor;

    fn archive_with(name: &str, data: &[u8]) -> ZipArchive {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_file(name, data).unwrap();
        let bytes = writer.into_inner().unwrap();
        ZipArchive::from_reader(Cursor::new(bytes), ZipReadOptions::default()).unwrap()
    }

    #[test]
    fn test_decompressor_returns_to_pool() {
        let archive = archive_with("a", &[b'a'; 1000]);
        let pool = Arc::clone(&archive.shared().unwrap().pool);

        let mut stream = archive.by_name("a").unwrap();
        assert_eq!(pool.idle_count(), 0);
        stream.read_to_end(&mut Vec::new()).unwrap();
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_close_releases_stream_decompressor() {
        let data = "pooled ".repeat(5000);
        let mut archive = archive_with("big", data.as_bytes());
        let pool = Arc::clone(&archive.shared().unwrap().pool);

        let mut stream = archive.by_name("big").unwrap();
        let mut buf = [0u8; 64];
        stream.read_exact(&mut buf).unwrap();
        archive.close();
        assert_eq!(pool.idle_count(), 0);

        assert!(stream.read(&mut buf).is_err());
        assert_eq!(pool.idle_count(), 1);
        assert!(stream.read(&mut buf).is_err());
        assert!(archive.is_empty());
    }
}
