//! Entry name and comment encoding.
//!
//! ZIP stores names as raw bytes. General purpose flag bit 11 marks them as
//! UTF-8; without it they are in whatever charset the archive was written
//! with. [`NameCodec`] holds that archive-wide charset choice.

use crate::error::{OxiZipError, Result};
use encoding_rs::{Encoding, UTF_8};
use std::borrow::Cow;

/// Encoder/decoder for entry names and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameCodec {
    encoding: &'static Encoding,
}

impl NameCodec {
    /// The UTF-8 codec.
    pub fn utf8() -> Self {
        Self { encoding: UTF_8 }
    }

    /// Codec for an `encoding_rs` encoding.
    pub fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }

    /// Look up a codec by WHATWG label (e.g. `"shift_jis"`, `"windows-1252"`).
    pub fn for_label(label: &str) -> Result<Self> {
        Encoding::for_label(label.as_bytes())
            .map(Self::new)
            .ok_or_else(|| OxiZipError::encoding_error(format!("unknown charset: {label}")))
    }

    /// Whether this codec is UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.encoding == UTF_8
    }

    /// Canonical name of the charset.
    pub fn name(&self) -> &'static str {
        self.encoding.name()
    }

    /// Encode text to bytes.
    pub fn encode<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>> {
        if self.is_utf8() {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }

        let (bytes, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(OxiZipError::encoding_error(format!(
                "{text:?} is not representable in {}",
                self.name()
            )));
        }
        Ok(bytes)
    }

    /// Decode bytes to text.
    pub fn decode<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>> {
        if self.is_utf8() {
            return std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| OxiZipError::encoding_error(format!("malformed UTF-8: {e}")));
        }

        self.encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or_else(|| {
                OxiZipError::encoding_error(format!("malformed {} input", self.name()))
            })
    }
}

impl Default for NameCodec {
    fn default() -> Self {
        Self::utf8()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_utf8_fast_path_borrows() {
        let codec = NameCodec::utf8();
        assert!(codec.is_utf8());
        assert!(matches!(codec.encode("dir/ファイル.txt").unwrap(), Cow::Borrowed(_)));
        assert!(matches!(codec.decode(b"plain.txt").unwrap(), Cow::Borrowed(_)));
    }

    #[test]
    fn test_utf8_rejects_malformed() {
        let err = NameCodec::utf8().decode(&[0x66, 0xFF, 0x66]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_shift_jis_roundtrip() {
        let codec = NameCodec::for_label("shift_jis").unwrap();
        assert!(!codec.is_utf8());

        let encoded = codec.encode("日本語.txt").unwrap();
        assert_ne!(encoded.as_ref(), "日本語.txt".as_bytes());
        assert_eq!(codec.decode(&encoded).unwrap(), "日本語.txt");
    }

    #[test]
    fn test_unmappable_character() {
        let codec = NameCodec::for_label("windows-1252").unwrap();
        let err = codec.encode("日本").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_unknown_label() {
        assert!(NameCodec::for_label("no-such-charset").is_err());
    }
}
