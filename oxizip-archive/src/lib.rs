//! # OxiZip Archive
//!
//! ZIP and GZIP container support for OxiZip.
//!
//! - **ZIP**: random access through a shared, hash-indexed central
//!   directory; sequential reading from local headers; streaming writes
//!   with data descriptors; ZIP64 on both sides
//! - **GZIP**: single-member writing and multi-member reading
//!
//! ## Example
//!
//! ```rust
//! use oxizip_archive::zip::{ZipArchive, ZipReadOptions, ZipWriter};
//! use std::io::Cursor;
//!
//! let mut writer = ZipWriter::new(Vec::new());
//! writer.add_file("hello.txt", b"Hello, World!").unwrap();
//! let bytes = writer.into_inner().unwrap();
//!
//! let archive = ZipArchive::from_reader(Cursor::new(bytes), ZipReadOptions::default()).unwrap();
//! assert_eq!(archive.read_entry("hello.txt").unwrap(), b"Hello, World!");
//! ```
//!
//! ## Format Detection
//!
//! Use [`detect::ArchiveFormat`] to automatically detect the format of an
//! archive based on its magic bytes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod detect;
pub mod gzip;
pub mod zip;

// Re-exports
pub use detect::ArchiveFormat;
pub use gzip::{GzipHeader, GzipReader, GzipWriter};
pub use zip::{
    ZipArchive, ZipEntry, ZipEntryReader, ZipMethod, ZipReadOptions, ZipStreamReader,
    ZipWriteOptions, ZipWriter,
};
