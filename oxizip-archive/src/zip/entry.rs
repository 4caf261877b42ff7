//! ZIP entry metadata.

use super::extra::{from_unix_seconds, unix_seconds};
use super::spec::{FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED, FLAG_UTF8};
use oxizip_core::error::{OxiZipError, Result};
use std::fmt;
use std::path::{Component, Path};
use std::time::SystemTime;

/// Compression methods a ZIP entry may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ZipMethod {
    /// Stored (no compression).
    Stored,
    /// Deflate compression.
    #[default]
    Deflated,
}

impl ZipMethod {
    /// Method code as stored in headers.
    pub fn code(&self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
        }
    }

    /// Look up a method code.
    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            0 => Ok(Self::Stored),
            8 => Ok(Self::Deflated),
            other => Err(OxiZipError::unsupported_method(format!("ZIP method {other}"))),
        }
    }

    /// Get the method name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stored => "Stored",
            Self::Deflated => "Deflated",
        }
    }
}

impl fmt::Display for ZipMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One member of a ZIP archive.
///
/// Sizes and CRC are `None` until known. Entries read from an archive
/// always have them; entries handed to a writer may leave them unset, in
/// which case a data descriptor carries them after the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    /// Name within the archive; directories end in `/`.
    pub name: String,
    /// Compression method.
    pub method: ZipMethod,
    /// Uncompressed size in bytes.
    pub size: Option<u64>,
    /// Compressed size in bytes.
    pub compressed_size: Option<u64>,
    /// CRC-32 of the uncompressed data.
    pub crc32: Option<u32>,
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Last access time (extended timestamp or NTFS extra).
    pub accessed: Option<SystemTime>,
    /// Creation time (extended timestamp or NTFS extra).
    pub created: Option<SystemTime>,
    /// Extra field bytes.
    pub extra: Vec<u8>,
    /// Entry comment.
    pub comment: Option<String>,
    /// External file attributes (Unix mode in the high 16 bits).
    pub external_attributes: u32,
    pub(crate) flags: u16,
    pub(crate) dos_time: Option<u32>,
    pub(crate) header_offset: Option<u64>,
}

impl ZipEntry {
    /// Create a file entry with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: ZipMethod::Deflated,
            size: None,
            compressed_size: None,
            crc32: None,
            modified: None,
            accessed: None,
            created: None,
            extra: Vec::new(),
            comment: None,
            external_attributes: 0,
            flags: 0,
            dos_time: None,
            header_offset: None,
        }
    }

    /// Create a directory entry; a trailing `/` is added if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self::new(name)
            .with_method(ZipMethod::Stored)
            .with_size(0)
            .with_compressed_size(0)
            .with_crc32(0)
            .with_unix_mode(0o40755)
    }

    /// Builder method to set compression method.
    pub fn with_method(mut self, method: ZipMethod) -> Self {
        self.method = method;
        self
    }

    /// Builder method to set uncompressed size.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Builder method to set compressed size.
    pub fn with_compressed_size(mut self, size: u64) -> Self {
        self.compressed_size = Some(size);
        self
    }

    /// Builder method to set CRC-32.
    pub fn with_crc32(mut self, crc: u32) -> Self {
        self.crc32 = Some(crc);
        self
    }

    /// Builder method to set modification time.
    pub fn with_modified(mut self, time: SystemTime) -> Self {
        self.modified = Some(time);
        self
    }

    /// Builder method to set access time.
    pub fn with_accessed(mut self, time: SystemTime) -> Self {
        self.accessed = Some(time);
        self
    }

    /// Builder method to set creation time.
    pub fn with_created(mut self, time: SystemTime) -> Self {
        self.created = Some(time);
        self
    }

    /// Builder method to set comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Builder method to set extra field bytes.
    pub fn with_extra(mut self, extra: Vec<u8>) -> Self {
        self.extra = extra;
        self
    }

    /// Builder method to set Unix mode bits (file type included).
    pub fn with_unix_mode(mut self, mode: u32) -> Self {
        self.external_attributes = (mode & 0xFFFF) << 16;
        self
    }

    /// Unix mode bits, if the entry carries them.
    pub fn unix_mode(&self) -> Option<u32> {
        match self.external_attributes >> 16 {
            0 => None,
            mode => Some(mode),
        }
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }

    /// General purpose bit flags.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Check if sizes and CRC follow the data in a data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Check if the name and comment are flagged as UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.flags & FLAG_UTF8 != 0
    }

    /// Check if the encryption bit is set.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Raw DOS date/time (date in the high 16 bits), if known.
    pub fn dos_time(&self) -> Option<u32> {
        self.dos_time
    }

    /// Get the compression ratio (compressed/uncompressed).
    pub fn compression_ratio(&self) -> f64 {
        match (self.size, self.compressed_size) {
            (Some(size), Some(compressed)) if size > 0 => compressed as f64 / size as f64,
            _ => 1.0,
        }
    }

    /// Get the space savings as a percentage.
    pub fn space_savings(&self) -> f64 {
        (1.0 - self.compression_ratio()) * 100.0
    }

    /// Validate the entry path for extraction.
    ///
    /// Rejects absolute paths, `..` components and embedded NUL bytes.
    pub fn validate_path(&self) -> Result<()> {
        let path = Path::new(&self.name);
        if path.is_absolute() || self.name.starts_with('/') || self.name.starts_with('\\') {
            return Err(OxiZipError::path_traversal(&self.name));
        }

        for component in path.components() {
            match component {
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(OxiZipError::path_traversal(&self.name));
                }
                Component::Normal(s) if s.to_string_lossy().contains('\0') => {
                    return Err(OxiZipError::path_traversal(&self.name));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Get a relative path that is safe to extract to.
    ///
    /// Drops `.`, `..` and root components and replaces NUL bytes.
    pub fn sanitized_name(&self) -> String {
        let mut result = String::new();
        for component in Path::new(&self.name).components() {
            if let Component::Normal(s) = component {
                if !result.is_empty() {
                    result.push('/');
                }
                result.push_str(&s.to_string_lossy().replace('\0', "_"));
            }
        }
        result
    }
}

impl fmt::Display for ZipEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let type_char = if self.is_dir() { 'd' } else { '-' };
        write!(
            f,
            "{}{:>10} {:>10} {:>6.1}% {:<8} {}",
            type_char,
            self.size.unwrap_or(0),
            self.compressed_size.unwrap_or(0),
            self.space_savings(),
            self.method,
            self.name
        )
    }
}

/// DOS date/time of 1980-01-01 00:00:00, the earliest representable value.
pub const DOS_EPOCH: u32 = (1 << 5 | 1) << 16;

/// Largest DOS date/time: 2107-12-31 23:59:58.
const DOS_MAX: u32 = ((127 << 9 | 12 << 5 | 31) << 16) | (23 << 11 | 59 << 5 | 29);

/// Convert a time to packed DOS date/time (UTC), clamped to the DOS range.
pub fn to_dos_time(time: SystemTime) -> u32 {
    let secs = unix_seconds(time);
    let days = secs.div_euclid(86_400);
    let of_day = secs.rem_euclid(86_400);
    let (year, month, day) = civil_from_days(days);

    if year < 1980 {
        return DOS_EPOCH;
    }
    if year > 2107 {
        return DOS_MAX;
    }

    let date = ((year - 1980) as u32) << 9 | month << 5 | day;
    let hour = (of_day / 3600) as u32;
    let minute = (of_day % 3600 / 60) as u32;
    let second = (of_day % 60) as u32;
    date << 16 | hour << 11 | minute << 5 | second / 2
}

/// Convert packed DOS date/time (UTC) to a time. Out-of-range fields are clamped.
pub fn from_dos_time(dos: u32) -> SystemTime {
    let date = dos >> 16;
    let time = dos & 0xFFFF;

    let year = 1980 + i64::from((date >> 9) & 0x7F);
    let month = ((date >> 5) & 0x0F).clamp(1, 12);
    let day = (date & 0x1F).max(1);
    let hour = i64::from(((time >> 11) & 0x1F).min(23));
    let minute = i64::from(((time >> 5) & 0x3F).min(59));
    let second = i64::from(((time & 0x1F) * 2).min(59));

    let days = days_from_civil(year, month, day);
    from_unix_seconds(days * 86_400 + hour * 3600 + minute * 60 + second)
}

/// Whether `time` survives a DOS date/time round trip unchanged.
pub fn is_dos_exact(time: SystemTime) -> bool {
    from_dos_time(to_dos_time(time)) == time
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year - era * 400;
    let month = i64::from(month);
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Proleptic Gregorian date for days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_method_codes() {
        assert_eq!(ZipMethod::from_code(0).unwrap(), ZipMethod::Stored);
        assert_eq!(ZipMethod::from_code(8).unwrap(), ZipMethod::Deflated);
        assert_eq!(ZipMethod::Deflated.code(), 8);
        assert!(ZipMethod::from_code(12).is_err());
    }

    #[test]
    fn test_directory_entry() {
        let entry = ZipEntry::directory("assets");
        assert_eq!(entry.name, "assets/");
        assert!(entry.is_dir());
        assert_eq!(entry.method, ZipMethod::Stored);
        assert_eq!(entry.size, Some(0));
        assert_eq!(entry.crc32, Some(0));
        assert_eq!(entry.unix_mode(), Some(0o40755));
    }

    #[test]
    fn test_compression_ratio() {
        let entry = ZipEntry::new("a.txt").with_size(1000).with_compressed_size(250);
        assert_eq!(entry.compression_ratio(), 0.25);
        assert_eq!(entry.space_savings(), 75.0);
        assert_eq!(ZipEntry::new("unknown").compression_ratio(), 1.0);
    }

    #[test]
    fn test_validate_path() {
        assert!(ZipEntry::new("dir/file.txt").validate_path().is_ok());
        assert!(ZipEntry::new("../etc/passwd").validate_path().is_err());
        assert!(ZipEntry::new("a/../../b").validate_path().is_err());
        assert!(ZipEntry::new("/etc/passwd").validate_path().is_err());
        assert!(ZipEntry::new("bad\0name").validate_path().is_err());
    }

    #[test]
    fn test_sanitized_name() {
        assert_eq!(ZipEntry::new("../../etc/passwd").sanitized_name(), "etc/passwd");
        assert_eq!(ZipEntry::new("/abs/./path").sanitized_name(), "abs/path");
        assert_eq!(ZipEntry::new("dir/").sanitized_name(), "dir");
    }

    #[test]
    fn test_dos_time_known_value() {
        // 2024-03-15 13:45:30 UTC
        let time = UNIX_EPOCH + Duration::from_secs(1_710_510_330);
        let dos = to_dos_time(time);
        let date = dos >> 16;
        let tod = dos & 0xFFFF;
        assert_eq!(date >> 9, 44);
        assert_eq!((date >> 5) & 0x0F, 3);
        assert_eq!(date & 0x1F, 15);
        assert_eq!(tod >> 11, 13);
        assert_eq!((tod >> 5) & 0x3F, 45);
        assert_eq!((tod & 0x1F) * 2, 30);

        assert_eq!(from_dos_time(dos), time);
        assert!(is_dos_exact(time));
    }

    #[test]
    fn test_dos_time_odd_seconds_are_not_exact() {
        let time = UNIX_EPOCH + Duration::from_secs(1_710_510_331);
        assert!(!is_dos_exact(time));
        assert!(!is_dos_exact(UNIX_EPOCH + Duration::from_millis(1_710_510_330_500)));
    }

    #[test]
    fn test_dos_time_clamps() {
        assert_eq!(to_dos_time(UNIX_EPOCH), DOS_EPOCH);
        assert_eq!(from_dos_time(DOS_EPOCH), UNIX_EPOCH + Duration::from_secs(315_532_800));
        // Leap day survives the round trip.
        let leap = UNIX_EPOCH + Duration::from_secs(951_782_400); // 2000-02-29
        assert_eq!(from_dos_time(to_dos_time(leap)), leap);
    }
}
