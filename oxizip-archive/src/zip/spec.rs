//! ZIP record layouts (PKWARE APPNOTE).
//!
//! Fixed-size parts of the local header, central record, data descriptor,
//! end record and their ZIP64 counterparts. Variable-length tails (names,
//! extra fields, comments) are handled by the callers.

use oxizip_core::error::{OxiZipError, Result};
use oxizip_core::PeekReader;
use std::io::{Read, Write};

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// Data descriptor signature (optional, PK\x07\x08).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// Fixed size of a local file header.
pub const LOCAL_HEADER_LEN: usize = 30;

/// Fixed size of a central directory record.
pub const CENTRAL_HEADER_LEN: usize = 46;

/// Fixed size of the end of central directory record.
pub const END_RECORD_LEN: usize = 22;

/// Fixed size of the ZIP64 end of central directory record.
pub const ZIP64_END_RECORD_LEN: usize = 56;

/// Size of the ZIP64 end of central directory locator.
pub const ZIP64_LOCATOR_LEN: usize = 20;

/// Data descriptor size with signature and 4-byte sizes.
pub const DATA_DESCRIPTOR_LEN: usize = 16;

/// Data descriptor size with signature and 8-byte sizes.
pub const ZIP64_DATA_DESCRIPTOR_LEN: usize = 24;

/// Longest archive comment the end record can describe.
pub const MAX_COMMENT_LEN: usize = 0xFFFF;

/// Marker value for Zip64 (0xFFFFFFFF for 32-bit fields).
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Marker value for Zip64 (0xFFFF for 16-bit fields).
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// General purpose flag: sizes and CRC follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Version needed to extract a stored entry.
pub const VERSION_STORED: u16 = 10;

/// Version needed to extract a deflated entry.
pub const VERSION_DEFLATED: u16 = 20;

/// Version needed to extract a ZIP64 entry.
pub const VERSION_ZIP64: u16 = 45;

/// Version made by: Unix, ZIP 3.0.
pub const VERSION_MADE_BY: u16 = 0x031E;

/// Little-endian `u16` at `pos`.
pub(crate) fn u16_at(buf: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([buf[pos], buf[pos + 1]])
}

/// Little-endian `u32` at `pos`.
pub(crate) fn u32_at(buf: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([buf[pos], buf[pos + 1], buf[pos + 2], buf[pos + 3]])
}

/// Little-endian `u64` at `pos`.
pub(crate) fn u64_at(buf: &[u8], pos: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[pos..pos + 8]);
    u64::from_le_bytes(bytes)
}

/// Clamp a 64-bit value into a 32-bit field, using the ZIP64 marker on overflow.
pub(crate) fn clamp32(value: u64) -> u32 {
    if value >= u64::from(ZIP64_MARKER_32) {
        ZIP64_MARKER_32
    } else {
        value as u32
    }
}

fn check_signature(buf: &[u8], expected: u32, offset: u64) -> Result<()> {
    let found = u32_at(buf, 0);
    if found != expected {
        return Err(OxiZipError::invalid_magic(
            offset,
            expected.to_le_bytes().to_vec(),
            found.to_le_bytes().to_vec(),
        ));
    }
    Ok(())
}

/// Fixed part of a ZIP local file header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time and date (DOS format, date in the high half).
    pub dos_time: u32,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size (or ZIP64 marker).
    pub compressed_size: u32,
    /// Uncompressed size (or ZIP64 marker).
    pub uncompressed_size: u32,
    /// File name length.
    pub name_len: u16,
    /// Extra field length.
    pub extra_len: u16,
}

impl LocalFileHeader {
    /// Parse the fixed 30-byte part. `offset` is only used for error reporting.
    pub fn parse(buf: &[u8], offset: u64) -> Result<Self> {
        if buf.len() < LOCAL_HEADER_LEN {
            return Err(OxiZipError::unexpected_eof("local file header"));
        }
        check_signature(buf, LOCAL_FILE_HEADER_SIG, offset)?;

        Ok(Self {
            version_needed: u16_at(buf, 4),
            flags: u16_at(buf, 6),
            method: u16_at(buf, 8),
            dos_time: u32_at(buf, 10),
            crc32: u32_at(buf, 14),
            compressed_size: u32_at(buf, 18),
            uncompressed_size: u32_at(buf, 22),
            name_len: u16_at(buf, 26),
            extra_len: u16_at(buf, 28),
        })
    }

    /// Write the fixed part followed by the name and extra field.
    pub fn write<W: Write>(&self, writer: &mut W, name: &[u8], extra: &[u8]) -> Result<()> {
        let mut buf = [0u8; LOCAL_HEADER_LEN];
        buf[0..4].copy_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version_needed.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..10].copy_from_slice(&self.method.to_le_bytes());
        buf[10..14].copy_from_slice(&self.dos_time.to_le_bytes());
        buf[14..18].copy_from_slice(&self.crc32.to_le_bytes());
        buf[18..22].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[22..26].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[26..28].copy_from_slice(&(name.len() as u16).to_le_bytes());
        buf[28..30].copy_from_slice(&(extra.len() as u16).to_le_bytes());

        writer.write_all(&buf)?;
        writer.write_all(name)?;
        writer.write_all(extra)?;
        Ok(())
    }

    /// Size of the name and extra field that follow the fixed part.
    pub fn variable_len(&self) -> u64 {
        u64::from(self.name_len) + u64::from(self.extra_len)
    }

    /// Check if this entry has a data descriptor following the compressed data.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Check if the encryption bit is set.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }
}

/// Fixed part of a central directory record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CentralDirectoryRecord {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time and date (DOS format, date in the high half).
    pub dos_time: u32,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size (or ZIP64 marker).
    pub compressed_size: u32,
    /// Uncompressed size (or ZIP64 marker).
    pub uncompressed_size: u32,
    /// File name length.
    pub name_len: u16,
    /// Extra field length.
    pub extra_len: u16,
    /// File comment length.
    pub comment_len: u16,
    /// Disk number start.
    pub disk_start: u16,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes.
    pub external_attr: u32,
    /// Relative offset of local header (or ZIP64 marker).
    pub local_header_offset: u32,
}

impl CentralDirectoryRecord {
    /// Parse the fixed 46-byte record at `pos` within a central directory buffer.
    pub fn parse(cen: &[u8], pos: usize) -> Result<Self> {
        if pos + CENTRAL_HEADER_LEN > cen.len() {
            return Err(OxiZipError::format(
                pos as u64,
                "central directory record runs past the directory end",
            ));
        }
        let buf = &cen[pos..pos + CENTRAL_HEADER_LEN];
        check_signature(buf, CENTRAL_DIR_HEADER_SIG, pos as u64)?;

        Ok(Self {
            version_made_by: u16_at(buf, 4),
            version_needed: u16_at(buf, 6),
            flags: u16_at(buf, 8),
            method: u16_at(buf, 10),
            dos_time: u32_at(buf, 12),
            crc32: u32_at(buf, 16),
            compressed_size: u32_at(buf, 20),
            uncompressed_size: u32_at(buf, 24),
            name_len: u16_at(buf, 28),
            extra_len: u16_at(buf, 30),
            comment_len: u16_at(buf, 32),
            disk_start: u16_at(buf, 34),
            internal_attr: u16_at(buf, 36),
            external_attr: u32_at(buf, 38),
            local_header_offset: u32_at(buf, 42),
        })
    }

    /// Write the fixed part followed by name, extra field and comment.
    pub fn write<W: Write>(
        &self,
        writer: &mut W,
        name: &[u8],
        extra: &[u8],
        comment: &[u8],
    ) -> Result<()> {
        let mut buf = [0u8; CENTRAL_HEADER_LEN];
        buf[0..4].copy_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version_made_by.to_le_bytes());
        buf[6..8].copy_from_slice(&self.version_needed.to_le_bytes());
        buf[8..10].copy_from_slice(&self.flags.to_le_bytes());
        buf[10..12].copy_from_slice(&self.method.to_le_bytes());
        buf[12..16].copy_from_slice(&self.dos_time.to_le_bytes());
        buf[16..20].copy_from_slice(&self.crc32.to_le_bytes());
        buf[20..24].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[28..30].copy_from_slice(&(name.len() as u16).to_le_bytes());
        buf[30..32].copy_from_slice(&(extra.len() as u16).to_le_bytes());
        buf[32..34].copy_from_slice(&(comment.len() as u16).to_le_bytes());
        buf[34..36].copy_from_slice(&self.disk_start.to_le_bytes());
        buf[36..38].copy_from_slice(&self.internal_attr.to_le_bytes());
        buf[38..42].copy_from_slice(&self.external_attr.to_le_bytes());
        buf[42..46].copy_from_slice(&self.local_header_offset.to_le_bytes());

        writer.write_all(&buf)?;
        writer.write_all(name)?;
        writer.write_all(extra)?;
        writer.write_all(comment)?;
        Ok(())
    }

    /// Total length of this record including its variable-length tail.
    pub fn total_len(&self) -> usize {
        CENTRAL_HEADER_LEN
            + usize::from(self.name_len)
            + usize::from(self.extra_len)
            + usize::from(self.comment_len)
    }
}

/// Classic end of central directory record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub cd_disk: u16,
    /// Entries on this disk.
    pub entries_on_disk: u16,
    /// Total entries.
    pub total_entries: u16,
    /// Size of the central directory.
    pub cd_size: u32,
    /// Offset of the central directory.
    pub cd_offset: u32,
    /// Archive comment length.
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    /// Parse the fixed 22-byte record.
    pub fn parse(buf: &[u8], offset: u64) -> Result<Self> {
        if buf.len() < END_RECORD_LEN {
            return Err(OxiZipError::format(offset, "end of central directory too short"));
        }
        check_signature(buf, END_OF_CENTRAL_DIR_SIG, offset)?;

        Ok(Self {
            disk_number: u16_at(buf, 4),
            cd_disk: u16_at(buf, 6),
            entries_on_disk: u16_at(buf, 8),
            total_entries: u16_at(buf, 10),
            cd_size: u32_at(buf, 12),
            cd_offset: u32_at(buf, 16),
            comment_len: u16_at(buf, 20),
        })
    }

    /// Write the record followed by the archive comment.
    pub fn write<W: Write>(&self, writer: &mut W, comment: &[u8]) -> Result<()> {
        let mut buf = [0u8; END_RECORD_LEN];
        buf[0..4].copy_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        buf[4..6].copy_from_slice(&self.disk_number.to_le_bytes());
        buf[6..8].copy_from_slice(&self.cd_disk.to_le_bytes());
        buf[8..10].copy_from_slice(&self.entries_on_disk.to_le_bytes());
        buf[10..12].copy_from_slice(&self.total_entries.to_le_bytes());
        buf[12..16].copy_from_slice(&self.cd_size.to_le_bytes());
        buf[16..20].copy_from_slice(&self.cd_offset.to_le_bytes());
        buf[20..22].copy_from_slice(&(comment.len() as u16).to_le_bytes());

        writer.write_all(&buf)?;
        writer.write_all(comment)?;
        Ok(())
    }
}

/// ZIP64 end of central directory record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk_number: u32,
    /// Disk where the central directory starts.
    pub cd_disk: u32,
    /// Entries on this disk.
    pub entries_on_disk: u64,
    /// Total entries.
    pub total_entries: u64,
    /// Size of the central directory.
    pub cd_size: u64,
    /// Offset of the central directory.
    pub cd_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    /// Parse the fixed 56-byte record.
    pub fn parse(buf: &[u8], offset: u64) -> Result<Self> {
        if buf.len() < ZIP64_END_RECORD_LEN {
            return Err(OxiZipError::format(offset, "ZIP64 end record too short"));
        }
        check_signature(buf, ZIP64_END_OF_CENTRAL_DIR_SIG, offset)?;

        Ok(Self {
            version_made_by: u16_at(buf, 12),
            version_needed: u16_at(buf, 14),
            disk_number: u32_at(buf, 16),
            cd_disk: u32_at(buf, 20),
            entries_on_disk: u64_at(buf, 24),
            total_entries: u64_at(buf, 32),
            cd_size: u64_at(buf, 40),
            cd_offset: u64_at(buf, 48),
        })
    }

    /// Write the record (no extensible data sector).
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = [0u8; ZIP64_END_RECORD_LEN];
        buf[0..4].copy_from_slice(&ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        // Size of the record after this field.
        buf[4..12].copy_from_slice(&((ZIP64_END_RECORD_LEN - 12) as u64).to_le_bytes());
        buf[12..14].copy_from_slice(&self.version_made_by.to_le_bytes());
        buf[14..16].copy_from_slice(&self.version_needed.to_le_bytes());
        buf[16..20].copy_from_slice(&self.disk_number.to_le_bytes());
        buf[20..24].copy_from_slice(&self.cd_disk.to_le_bytes());
        buf[24..32].copy_from_slice(&self.entries_on_disk.to_le_bytes());
        buf[32..40].copy_from_slice(&self.total_entries.to_le_bytes());
        buf[40..48].copy_from_slice(&self.cd_size.to_le_bytes());
        buf[48..56].copy_from_slice(&self.cd_offset.to_le_bytes());
        writer.write_all(&buf)?;
        Ok(())
    }
}

/// ZIP64 end of central directory locator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zip64Locator {
    /// Disk holding the ZIP64 end record.
    pub disk: u32,
    /// Absolute offset of the ZIP64 end record.
    pub end_record_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Zip64Locator {
    /// Parse the 20-byte locator.
    pub fn parse(buf: &[u8], offset: u64) -> Result<Self> {
        if buf.len() < ZIP64_LOCATOR_LEN {
            return Err(OxiZipError::format(offset, "ZIP64 locator too short"));
        }
        check_signature(buf, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG, offset)?;

        Ok(Self {
            disk: u32_at(buf, 4),
            end_record_offset: u64_at(buf, 8),
            total_disks: u32_at(buf, 16),
        })
    }

    /// Write the locator.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buf = [0u8; ZIP64_LOCATOR_LEN];
        buf[0..4].copy_from_slice(&ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG.to_le_bytes());
        buf[4..8].copy_from_slice(&self.disk.to_le_bytes());
        buf[8..16].copy_from_slice(&self.end_record_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.total_disks.to_le_bytes());
        writer.write_all(&buf)?;
        Ok(())
    }
}

/// ZIP data descriptor (appears after compressed data when FLAG_DATA_DESCRIPTOR is set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Read a data descriptor.
    ///
    /// The descriptor may optionally start with a signature (0x08074B50).
    /// Returns (descriptor, bytes_consumed).
    pub fn read<R: Read>(reader: &mut PeekReader<R>, is_zip64: bool) -> Result<(Self, usize)> {
        let size_len = if is_zip64 { 8 } else { 4 };
        let body_len = 4 + 2 * size_len;

        // Signature plus body is the longest form; the signature-less form is
        // recognized by the first word.
        let available = reader.fill(4 + body_len)?;
        if available < body_len {
            return Err(OxiZipError::unexpected_eof("data descriptor"));
        }

        let has_signature = u32_at(reader.buffered(), 0) == DATA_DESCRIPTOR_SIG;
        let start = if has_signature {
            if available < 4 + body_len {
                return Err(OxiZipError::unexpected_eof("data descriptor"));
            }
            4
        } else {
            0
        };

        let buf = reader.buffered();
        let crc32 = u32_at(buf, start);
        let (compressed_size, uncompressed_size) = if is_zip64 {
            (u64_at(buf, start + 4), u64_at(buf, start + 12))
        } else {
            (
                u64::from(u32_at(buf, start + 4)),
                u64::from(u32_at(buf, start + 8)),
            )
        };

        let consumed = start + body_len;
        reader.consume(consumed);

        Ok((
            Self {
                crc32,
                compressed_size,
                uncompressed_size,
            },
            consumed,
        ))
    }

    /// Write the descriptor with its signature.
    pub fn write<W: Write>(&self, writer: &mut W, is_zip64: bool) -> Result<usize> {
        writer.write_all(&DATA_DESCRIPTOR_SIG.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        if is_zip64 {
            writer.write_all(&self.compressed_size.to_le_bytes())?;
            writer.write_all(&self.uncompressed_size.to_le_bytes())?;
            Ok(ZIP64_DATA_DESCRIPTOR_LEN)
        } else {
            writer.write_all(&(self.compressed_size as u32).to_le_bytes())?;
            writer.write_all(&(self.uncompressed_size as u32).to_le_bytes())?;
            Ok(DATA_DESCRIPTOR_LEN)
        }
    }
}
