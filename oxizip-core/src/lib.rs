//! # OxiZip Core
//!
//! Core components for the OxiZip archive library.
//!
//! This crate provides the building blocks shared by the ZIP and GZIP
//! container code:
//!
//! - [`traits`]: Streaming compressor/decompressor traits
//! - [`deflate`]: Raw DEFLATE implementations of those traits
//! - [`crc`]: CRC-32 checksum
//! - [`charset`]: Entry name/comment encoding
//! - [`peek`]: Buffered input with look-ahead for sequential parsers
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ CLI                                                     │
//! │     list / extract / test / create / info              │
//! ├─────────────────────────────────────────────────────────┤
//! │ Container (oxizip-archive)                              │
//! │     ZIP index, random access, streaming, GZIP          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Core (this crate)                                       │
//! │     Codec traits, CRC, NameCodec, PeekReader            │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxizip_core::crc::Crc32;
//! use oxizip_core::deflate::{deflate, inflate};
//! use oxizip_core::CompressionLevel;
//!
//! let data = b"Hello, World!";
//! let compressed = deflate(data, CompressionLevel::DEFAULT).unwrap();
//! assert_eq!(inflate(&compressed).unwrap(), data);
//!
//! assert_eq!(Crc32::compute(data), 0xEC4AC3D0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod charset;
pub mod crc;
pub mod deflate;
pub mod error;
pub mod peek;
pub mod traits;

// Re-exports for convenience
pub use charset::NameCodec;
pub use crc::Crc32;
pub use deflate::{DeflateCompressor, DeflateDecompressor};
pub use error::{ErrorKind, OxiZipError, Result};
pub use peek::PeekReader;
pub use traits::{
    CompressStatus, CompressionLevel, Compressor, DecompressStatus, Decompressor, FlushMode,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::charset::NameCodec;
    pub use crate::crc::Crc32;
    pub use crate::error::{ErrorKind, OxiZipError, Result};
    pub use crate::traits::{CompressionLevel, Compressor, Decompressor};
}
