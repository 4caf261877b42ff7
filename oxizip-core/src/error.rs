//! Error types for OxiZip operations.
//!
//! Every fallible operation in the workspace returns [`OxiZipError`]. The
//! variants are grouped into a small taxonomy via [`ErrorKind`] so callers can
//! tell a damaged archive (`Format`) from a checksum failure (`Integrity`) or
//! a caller mistake (`InvalidEntry`) without matching every variant.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for OxiZip operations.
#[derive(Debug, Error)]
pub enum OxiZipError {
    /// I/O error from underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// Structurally invalid archive data.
    #[error("Invalid archive format at offset {offset}: {message}")]
    Format {
        /// Byte offset where the problem was detected.
        offset: u64,
        /// Description of the problem.
        message: String,
    },

    /// Invalid magic number in a record header.
    #[error("Invalid magic number at offset {offset}: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Byte offset of the record.
        offset: u64,
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Entry is encrypted; encryption is not supported.
    #[error("Encrypted entry not supported: {name}")]
    Encrypted {
        /// Name of the encrypted entry.
        name: String,
    },

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// CRC checksum mismatch.
    #[error("CRC mismatch in {entry}: expected {expected:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Entry whose data failed the check.
        entry: String,
        /// Expected CRC value from archive.
        expected: u32,
        /// Computed CRC value from data.
        computed: u32,
    },

    /// Declared and actual sizes differ.
    #[error("Invalid {field} for {entry}: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Entry whose size failed the check.
        entry: String,
        /// Which size was wrong ("size" or "compressed size").
        field: &'static str,
        /// Declared value.
        expected: u64,
        /// Observed value.
        actual: u64,
    },

    /// Unexpected end of input.
    #[error("Unexpected end of file: {context}")]
    UnexpectedEof {
        /// What was being read when input ran out.
        context: String,
    },

    /// Entry metadata rejected before any bytes were written.
    #[error("Invalid entry {name}: {message}")]
    InvalidEntry {
        /// Entry name.
        name: String,
        /// Why the entry was rejected.
        message: String,
    },

    /// Operation not allowed in the current state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the misuse.
        message: String,
    },

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// Text encoding error in an entry name or comment.
    #[error("Encoding error: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Path traversal attack detected (e.g., "../" in filename).
    #[error("Path traversal detected in entry: {path}")]
    PathTraversal {
        /// The suspicious path.
        path: String,
    },

    /// An error raised while processing a specific archive file.
    #[error("{}: {source}", .path.display())]
    Archive {
        /// Path of the archive.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: Box<OxiZipError>,
    },
}

/// Coarse classification of [`OxiZipError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Underlying I/O failure.
    Io,
    /// Bad signature, inconsistent lengths, encrypted entry.
    Format,
    /// CRC or size mismatch.
    Integrity,
    /// Truncated input.
    UnexpectedEof,
    /// Caller supplied invalid entry metadata.
    InvalidEntry,
    /// Compression method cannot be decoded.
    UnsupportedMethod,
    /// Named entry does not exist.
    NotFound,
    /// Name or comment could not be encoded/decoded.
    Encoding,
    /// Operation called in the wrong state.
    InvalidState,
}

/// Result type alias for OxiZip operations.
pub type Result<T> = std::result::Result<T, OxiZipError>;

impl OxiZipError {
    /// Create a format error.
    pub fn format(offset: u64, message: impl Into<String>) -> Self {
        Self::Format {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid magic error.
    pub fn invalid_magic(
        offset: u64,
        expected: impl Into<Vec<u8>>,
        found: impl Into<Vec<u8>>,
    ) -> Self {
        Self::InvalidMagic {
            offset,
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an encrypted entry error.
    pub fn encrypted(name: impl Into<String>) -> Self {
        Self::Encrypted { name: name.into() }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(entry: impl Into<String>, expected: u32, computed: u32) -> Self {
        Self::CrcMismatch {
            entry: entry.into(),
            expected,
            computed,
        }
    }

    /// Create a size mismatch error.
    pub fn size_mismatch(
        entry: impl Into<String>,
        field: &'static str,
        expected: u64,
        actual: u64,
    ) -> Self {
        Self::SizeMismatch {
            entry: entry.into(),
            field,
            expected,
            actual,
        }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(context: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            context: context.into(),
        }
    }

    /// Create an invalid entry error.
    pub fn invalid_entry(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create an encoding error.
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Create a path traversal error.
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal { path: path.into() }
    }

    /// Attach the archive path to this error.
    ///
    /// Errors that already carry a path are returned unchanged.
    pub fn in_archive(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Archive { .. } => self,
            other => Self::Archive {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Format { .. } | Self::InvalidMagic { .. } | Self::Encrypted { .. } => {
                ErrorKind::Format
            }
            Self::UnsupportedMethod { .. } => ErrorKind::UnsupportedMethod,
            Self::CrcMismatch { .. } | Self::SizeMismatch { .. } => ErrorKind::Integrity,
            Self::UnexpectedEof { .. } => ErrorKind::UnexpectedEof,
            Self::InvalidEntry { .. } | Self::PathTraversal { .. } => ErrorKind::InvalidEntry,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::EntryNotFound { .. } => ErrorKind::NotFound,
            Self::EncodingError { .. } => ErrorKind::Encoding,
            Self::Archive { source, .. } => source.kind(),
        }
    }
}

impl From<io::Error> for OxiZipError {
    fn from(err: io::Error) -> Self {
        // Typed errors that crossed an io::Read/io::Write boundary come back intact.
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<OxiZipError>())
        {
            if let Some(inner) = err.into_inner() {
                if let Ok(typed) = inner.downcast::<OxiZipError>() {
                    return *typed;
                }
            }
            return Self::invalid_state("lost wrapped error");
        }

        if err.kind() == io::ErrorKind::UnexpectedEof {
            return Self::unexpected_eof(err.to_string());
        }
        Self::Io(err)
    }
}

impl From<OxiZipError> for io::Error {
    fn from(err: OxiZipError) -> Self {
        match err {
            OxiZipError::Io(inner) => inner,
            OxiZipError::UnexpectedEof { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
