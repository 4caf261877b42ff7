//! Archive format auto-detection.
//!
//! This module provides automatic detection of archive formats based on
//! magic numbers (file signatures).

use oxizip_core::error::Result;
use std::io::Read;
use std::path::Path;

/// Known archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// ZIP archive (.zip, .jar).
    Zip,
    /// GZIP compressed file (.gz).
    Gzip,
    /// Unknown format.
    Unknown,
}

impl ArchiveFormat {
    /// Detect format from magic bytes.
    pub fn from_magic(magic: &[u8]) -> Self {
        if magic.len() < 2 {
            return Self::Unknown;
        }

        // ZIP: 0x50 0x4B (PK) followed by a record signature
        if magic.len() >= 4 && magic.starts_with(b"PK") {
            match &magic[2..4] {
                [0x03, 0x04] | [0x05, 0x06] | [0x07, 0x08] => return Self::Zip,
                _ => {}
            }
        }

        // GZIP: 0x1F 0x8B
        if magic.starts_with(&[0x1F, 0x8B]) {
            return Self::Gzip;
        }

        Self::Unknown
    }

    /// Detect format from a reader, returning the bytes consumed.
    pub fn detect<R: Read>(reader: &mut R) -> Result<(Self, Vec<u8>)> {
        let mut magic = vec![0u8; 4];
        let mut filled = 0;
        while filled < magic.len() {
            let n = reader.read(&mut magic[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        magic.truncate(filled);

        let format = Self::from_magic(&magic);
        Ok((format, magic))
    }

    /// Guess the format from a file extension.
    pub fn from_extension(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("zip" | "jar") => Self::Zip,
            Some("gz" | "gzip" | "tgz") => Self::Gzip,
            _ => Self::Unknown,
        }
    }

    /// Get the typical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Gzip => "gz",
            Self::Unknown => "",
        }
    }

    /// Get the MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Zip => "application/zip",
            Self::Gzip => "application/gzip",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Check if this is a compressed format (single file).
    pub fn is_compression_only(&self) -> bool {
        matches!(self, Self::Gzip)
    }

    /// Check if this is an archive format (multiple files).
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Zip)
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zip => write!(f, "ZIP"),
            Self::Gzip => write!(f, "GZIP"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}
