//! State shared by every handle on one physical archive.
//!
//! A [`SharedArchive`] owns the file handle, the parsed central directory
//! and a small pool of decompressors. Handles opened on the same file (same
//! canonical path, modification time and charset) share one instance
//! through a process-wide map of weak references; the slot is cleared when
//! the last strong reference drops.

use super::index::CentralDirectory;
use oxizip_core::charset::NameCodec;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::{DecompressStatus, Decompressor, DeflateDecompressor};
use log::debug;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};
use std::time::SystemTime;

/// Idle decompressors kept per archive.
const MAX_IDLE_DECOMPRESSORS: usize = 4;

/// Any seekable byte source usable as an archive.
pub(crate) trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Seekable input with positioned reads serialized by one lock.
pub(crate) struct Source {
    inner: Mutex<Box<dyn ReadSeek>>,
    len: u64,
}

impl Source {
    pub(crate) fn new(mut reader: Box<dyn ReadSeek>) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        Ok(Self {
            inner: Mutex::new(reader),
            len,
        })
    }

    /// Total length of the input.
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    /// Fill `buf` from absolute position `offset`.
    pub(crate) fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut inner = lock(&self.inner);
        inner.seek(SeekFrom::Start(offset))?;
        inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                OxiZipError::unexpected_eof(format!(
                    "{} bytes at offset {offset} (archive is {} bytes)",
                    buf.len(),
                    self.len
                ))
            } else {
                e.into()
            }
        })
    }
}

/// Identity of a cached archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    path: PathBuf,
    modified: Option<SystemTime>,
    charset: &'static str,
}

static CACHE: LazyLock<Mutex<HashMap<CacheKey, Weak<SharedArchive>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// File handle, index and decompressor pool of one archive.
pub(crate) struct SharedArchive {
    pub(crate) source: Source,
    pub(crate) directory: CentralDirectory,
    pub(crate) pool: Arc<DecompressorPool>,
    path: Option<PathBuf>,
    key: Option<CacheKey>,
}

impl SharedArchive {
    /// Build shared state over an arbitrary reader (never cached).
    pub(crate) fn from_reader(reader: Box<dyn ReadSeek>, codec: NameCodec) -> Result<Arc<Self>> {
        let source = Source::new(reader)?;
        let directory = CentralDirectory::read(&source, codec)?;
        Ok(Arc::new(Self {
            source,
            directory,
            pool: Arc::new(DecompressorPool::new(default_decompressor)),
            path: None,
            key: None,
        }))
    }

    /// Open the archive at `path`, reusing a live instance when allowed.
    pub(crate) fn open(path: &Path, codec: NameCodec, use_cache: bool) -> Result<Arc<Self>> {
        let canonical = fs::canonicalize(path)?;
        let modified = fs::metadata(&canonical)?.modified().ok();
        let key = CacheKey {
            path: canonical.clone(),
            modified,
            charset: codec.name(),
        };

        if !use_cache {
            return Self::build(canonical, codec, None);
        }

        let mut cache = lock(&CACHE);
        if let Some(shared) = cache.get(&key).and_then(Weak::upgrade) {
            debug!("reusing cached central directory for {}", canonical.display());
            return Ok(shared);
        }

        debug!("indexing {}", canonical.display());
        let shared = Self::build(canonical, codec, Some(key.clone()))?;
        cache.insert(key, Arc::downgrade(&shared));
        Ok(shared)
    }

    fn build(path: PathBuf, codec: NameCodec, key: Option<CacheKey>) -> Result<Arc<Self>> {
        let file = File::open(&path)?;
        let source = Source::new(Box::new(file))?;
        let directory = CentralDirectory::read(&source, codec)?;
        Ok(Arc::new(Self {
            source,
            directory,
            pool: Arc::new(DecompressorPool::new(default_decompressor)),
            path: Some(path),
            key,
        }))
    }

    /// Canonical path, if opened from the filesystem.
    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for SharedArchive {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let mut cache = lock(&CACHE);
        // A newer instance may already occupy the slot.
        if cache.get(&key).is_some_and(|weak| weak.strong_count() == 0) {
            cache.remove(&key);
            debug!("released cached central directory for {}", key.path.display());
        }
    }
}

/// Boxed decompressor handed out by the pool.
pub(crate) type BoxedDecompressor = Box<dyn Decompressor + Send>;

fn default_decompressor() -> BoxedDecompressor {
    Box::new(DeflateDecompressor::new())
}

/// Free list of decompressors.
pub(crate) struct DecompressorPool {
    idle: Mutex<Vec<BoxedDecompressor>>,
    factory: fn() -> BoxedDecompressor,
}

impl DecompressorPool {
    pub(crate) fn new(factory: fn() -> BoxedDecompressor) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            factory,
        }
    }

    /// Take an idle decompressor or create one.
    pub(crate) fn acquire(self: &Arc<Self>) -> PooledDecompressor {
        let inner = lock(&self.idle).pop().unwrap_or_else(self.factory);
        PooledDecompressor {
            inner,
            pool: Arc::clone(self),
        }
    }

    /// Number of idle decompressors.
    #[cfg(test)]
    pub(crate) fn idle_count(&self) -> usize {
        lock(&self.idle).len()
    }

    fn release(&self, mut decompressor: BoxedDecompressor) {
        decompressor.reset();
        let mut idle = lock(&self.idle);
        if idle.len() < MAX_IDLE_DECOMPRESSORS {
            idle.push(decompressor);
        }
    }
}

/// A decompressor on loan; returned to its pool on drop.
pub(crate) struct PooledDecompressor {
    inner: BoxedDecompressor,
    pool: Arc<DecompressorPool>,
}

impl Deref for PooledDecompressor {
    type Target = dyn Decompressor + Send;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for PooledDecompressor {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for PooledDecompressor {
    fn drop(&mut self) {
        let inner = std::mem::replace(&mut self.inner, Box::new(Released));
        self.pool.release(inner);
    }
}

/// Placeholder left behind in a guard whose decompressor went back to the pool.
struct Released;

impl Decompressor for Released {
    fn decompress(
        &mut self,
        _input: &[u8],
        _output: &mut [u8],
    ) -> Result<(usize, usize, DecompressStatus)> {
        Err(OxiZipError::invalid_state("decompressor already released"))
    }

    fn reset(&mut self) {}

    fn is_finished(&self) -> bool {
        true
    }

    fn total_in(&self) -> u64 {
        0
    }

    fn total_out(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_at_short_read_is_eof() {
        let source = Source::new(Box::new(Cursor::new(vec![7u8; 10]))).unwrap();
        assert_eq!(source.len(), 10);

        let mut buf = [0u8; 4];
        source.read_at(&mut buf, 6).unwrap();
        assert_eq!(buf, [7; 4]);

        let err = source.read_at(&mut buf, 8).unwrap_err();
        assert_eq!(err.kind(), oxizip_core::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_pool_reuses_and_caps() {
        let pool = Arc::new(DecompressorPool::new(default_decompressor));
        let loans: Vec<_> = (0..6).map(|_| pool.acquire()).collect();
        assert_eq!(pool.idle_count(), 0);

        drop(loans);
        assert_eq!(pool.idle_count(), MAX_IDLE_DECOMPRESSORS);

        let again = pool.acquire();
        assert_eq!(pool.idle_count(), MAX_IDLE_DECOMPRESSORS - 1);
        assert_eq!(again.total_in(), 0);
    }
}
