//! ZIP archive format support.
//!
//! This module provides reading and writing of ZIP archives as specified
//! in the PKWARE APPNOTE, including ZIP64 extensions:
//!
//! - [`ZipArchive`]: random access through the central directory. Handles
//!   on the same file share one parsed index.
//! - [`ZipStreamReader`]: sequential reading from local headers, for
//!   non-seekable input and archives whose directory never got written.
//! - [`ZipWriter`]: streaming output with data descriptors for entries of
//!   unknown size.
//!
//! Only the STORED and DEFLATED methods are supported. Encrypted entries
//! and multi-disk archives are rejected.

mod entry;
pub mod extra;
mod index;
mod reader;
mod shared;
pub mod spec;
mod stream;
mod writer;

pub use entry::{from_dos_time, is_dos_exact, to_dos_time, ZipEntry, ZipMethod, DOS_EPOCH};
pub use index::name_hash;
pub use reader::{Entries, ZipArchive, ZipEntryReader, ZipReadOptions};
pub use stream::ZipStreamReader;
pub use writer::{ZipWriteOptions, ZipWriter};

use oxizip_core::error::Result;
use std::io::{Read, Seek, Write};

/// Read a ZIP archive from a seekable reader.
pub fn read_zip<R: Read + Seek + Send + 'static>(reader: R) -> Result<ZipArchive> {
    ZipArchive::from_reader(reader, ZipReadOptions::default())
}

/// Create a new ZIP archive writer.
pub fn write_zip<W: Write>(writer: W) -> ZipWriter<W> {
    ZipWriter::new(writer)
}
