//! Extra field sub-records.
//!
//! The extra field is a sequence of `(id: u16, len: u16, data)` records.
//! Three of them are interpreted here: ZIP64 extended information, the
//! Info-ZIP extended timestamp and the NTFS timestamp. Everything else is
//! carried through untouched.

use super::spec::{u16_at, u32_at, u64_at};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// ZIP64 extended information extra field ID.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// NTFS timestamps extra field ID.
pub const NTFS_EXTRA_ID: u16 = 0x000A;

/// Info-ZIP extended timestamp extra field ID ("UT").
pub const EXTENDED_TIMESTAMP_ID: u16 = 0x5455;

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
const FILETIME_UNIX_DIFF_SECS: u64 = 11_644_473_600;

/// FILETIME ticks per second (100 ns resolution).
const FILETIME_TICKS_PER_SEC: u64 = 10_000_000;

/// Iterator over the records of an extra field.
///
/// Iteration stops at the first record whose declared length runs past the
/// end of the data.
#[derive(Debug, Clone)]
pub struct ExtraFields<'a> {
    data: &'a [u8],
}

impl<'a> ExtraFields<'a> {
    /// Iterate over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for ExtraFields<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.len() < 4 {
            return None;
        }
        let id = u16_at(self.data, 0);
        let len = usize::from(u16_at(self.data, 2));
        if 4 + len > self.data.len() {
            self.data = &[];
            return None;
        }
        let body = &self.data[4..4 + len];
        self.data = &self.data[4 + len..];
        Some((id, body))
    }
}

/// Find the body of the first record with the given ID.
pub fn find(extra: &[u8], id: u16) -> Option<&[u8]> {
    ExtraFields::new(extra).find(|(field, _)| *field == id).map(|(_, body)| body)
}

/// Copy `extra` without the records whose IDs are listed.
pub fn strip(extra: &[u8], ids: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(extra.len());
    for (id, body) in ExtraFields::new(extra) {
        if !ids.contains(&id) {
            push_field(&mut out, id, body);
        }
    }
    out
}

fn push_field(out: &mut Vec<u8>, id: u16, body: &[u8]) {
    out.extend_from_slice(&id.to_le_bytes());
    out.extend_from_slice(&(body.len() as u16).to_le_bytes());
    out.extend_from_slice(body);
}

/// Values taken from a ZIP64 extended information record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Values {
    /// Uncompressed size.
    pub size: Option<u64>,
    /// Compressed size.
    pub compressed_size: Option<u64>,
    /// Local header offset.
    pub header_offset: Option<u64>,
}

impl Zip64Values {
    /// Read the ZIP64 record from `extra`.
    ///
    /// Only the fields whose header counterpart held the sentinel are
    /// present, in the fixed order size, compressed size, header offset.
    pub fn read(extra: &[u8], need_size: bool, need_compressed: bool, need_offset: bool) -> Self {
        let mut values = Self::default();
        let Some(body) = find(extra, ZIP64_EXTRA_ID) else {
            return values;
        };

        let mut pos = 0;
        let mut next = |wanted: bool| -> Option<u64> {
            if !wanted || pos + 8 > body.len() {
                return None;
            }
            let value = u64_at(body, pos);
            pos += 8;
            Some(value)
        };
        values.size = next(need_size);
        values.compressed_size = next(need_compressed);
        values.header_offset = next(need_offset);
        values
    }

    /// Encode the present fields as a ZIP64 record (empty if none are present).
    pub fn to_extra(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(24);
        for value in [self.size, self.compressed_size, self.header_offset]
            .into_iter()
            .flatten()
        {
            body.extend_from_slice(&value.to_le_bytes());
        }

        let mut out = Vec::new();
        if !body.is_empty() {
            push_field(&mut out, ZIP64_EXTRA_ID, &body);
        }
        out
    }
}

/// Timestamps carried in extra fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtraTimes {
    /// Last modification time.
    pub modified: Option<SystemTime>,
    /// Last access time.
    pub accessed: Option<SystemTime>,
    /// Creation time.
    pub created: Option<SystemTime>,
}

impl ExtraTimes {
    /// Parse extended timestamp and NTFS records. NTFS values win when both exist.
    pub fn read(extra: &[u8]) -> Self {
        let mut times = Self::default();

        if let Some(body) = find(extra, EXTENDED_TIMESTAMP_ID) {
            if let Some((&flags, mut rest)) = body.split_first() {
                let mut slots = [
                    (0x01, &mut times.modified),
                    (0x02, &mut times.accessed),
                    (0x04, &mut times.created),
                ];
                for (bit, slot) in slots.iter_mut() {
                    if flags & *bit == 0 || rest.len() < 4 {
                        continue;
                    }
                    let secs = u32_at(rest, 0) as i32;
                    **slot = Some(from_unix_seconds(i64::from(secs)));
                    rest = &rest[4..];
                }
            }
        }

        if let Some(body) = find(extra, NTFS_EXTRA_ID) {
            // 4 reserved bytes, then tagged attributes; tag 1 holds the times.
            let attrs = body.get(4..).unwrap_or_default();
            for (tag, data) in ExtraFields::new(attrs) {
                if tag != 0x0001 || data.len() < 24 {
                    continue;
                }
                let filetimes = [u64_at(data, 0), u64_at(data, 8), u64_at(data, 16)];
                let slots = [&mut times.modified, &mut times.accessed, &mut times.created];
                for (ticks, slot) in filetimes.into_iter().zip(slots) {
                    if ticks != 0 {
                        *slot = Some(from_filetime(ticks));
                    }
                }
            }
        }

        times
    }

    /// Whether any timestamp is set.
    pub fn is_empty(&self) -> bool {
        self.modified.is_none() && self.accessed.is_none() && self.created.is_none()
    }

    /// Encode as an extra record.
    ///
    /// Uses the extended timestamp when every value fits in 32-bit Unix
    /// seconds, the NTFS record otherwise. The central copy of an extended
    /// timestamp keeps all flag bits but only the modification time value.
    pub fn to_extra(&self, central: bool) -> Vec<u8> {
        let mut out = Vec::new();
        if self.is_empty() {
            return out;
        }

        let fits_i32 = [self.modified, self.accessed, self.created]
            .into_iter()
            .flatten()
            .all(|t| i32::try_from(unix_seconds(t)).is_ok());

        if fits_i32 {
            let mut flags = 0u8;
            let mut body = vec![0u8];
            for (bit, time) in [(0x01, self.modified), (0x02, self.accessed), (0x04, self.created)] {
                if let Some(time) = time {
                    flags |= bit;
                    if !central || bit == 0x01 {
                        body.extend_from_slice(&(unix_seconds(time) as i32).to_le_bytes());
                    }
                }
            }
            body[0] = flags;
            push_field(&mut out, EXTENDED_TIMESTAMP_ID, &body);
        } else {
            let mut body = vec![0u8; 4];
            body.extend_from_slice(&0x0001u16.to_le_bytes());
            body.extend_from_slice(&24u16.to_le_bytes());
            for time in [self.modified, self.accessed, self.created] {
                let ticks = time.map(to_filetime).unwrap_or(0);
                body.extend_from_slice(&ticks.to_le_bytes());
            }
            push_field(&mut out, NTFS_EXTRA_ID, &body);
        }
        out
    }
}

/// Seconds since the Unix epoch, negative for earlier times. Sub-second parts are truncated toward negative infinity.
pub(crate) fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => {
            let before = before.duration();
            let secs = before.as_secs() as i64;
            if before.subsec_nanos() > 0 { -secs - 1 } else { -secs }
        }
    }
}

pub(crate) fn from_unix_seconds(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

fn from_filetime(ticks: u64) -> SystemTime {
    let secs = ticks / FILETIME_TICKS_PER_SEC;
    let nanos = (ticks % FILETIME_TICKS_PER_SEC) * 100;
    let since_1601 = Duration::new(secs, nanos as u32);
    let epoch_gap = Duration::from_secs(FILETIME_UNIX_DIFF_SECS);
    if since_1601 >= epoch_gap {
        UNIX_EPOCH + (since_1601 - epoch_gap)
    } else {
        UNIX_EPOCH - (epoch_gap - since_1601)
    }
}

fn to_filetime(time: SystemTime) -> u64 {
    let epoch_gap = Duration::from_secs(FILETIME_UNIX_DIFF_SECS);
    let since_1601 = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => epoch_gap + after,
        Err(before) => epoch_gap.saturating_sub(before.duration()),
    };
    since_1601.as_secs() * FILETIME_TICKS_PER_SEC + u64::from(since_1601.subsec_nanos() / 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterate_and_stop_on_truncation() {
        let mut extra = Vec::new();
        push_field(&mut extra, 0xCAFE, &[1, 2, 3]);
        push_field(&mut extra, 0x0001, &[0; 8]);
        extra.extend_from_slice(&[0x34, 0x12, 0xFF, 0x00]); // claims 255 bytes

        let ids: Vec<u16> = ExtraFields::new(&extra).map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0xCAFE, 0x0001]);
        assert_eq!(find(&extra, 0xCAFE), Some(&[1u8, 2, 3][..]));
        assert_eq!(find(&extra, 0x1234), None);
    }

    #[test]
    fn test_strip_keeps_unknown_records() {
        let mut extra = Vec::new();
        push_field(&mut extra, ZIP64_EXTRA_ID, &[0; 16]);
        push_field(&mut extra, 0xCAFE, &[9]);
        push_field(&mut extra, EXTENDED_TIMESTAMP_ID, &[1, 0, 0, 0, 0]);

        let stripped = strip(&extra, &[ZIP64_EXTRA_ID, EXTENDED_TIMESTAMP_ID]);
        assert_eq!(stripped, vec![0xFE, 0xCA, 1, 0, 9]);
    }

    #[test]
    fn test_zip64_only_reads_needed_fields() {
        let values = Zip64Values {
            size: None,
            compressed_size: Some(0x1_0000_0000),
            header_offset: Some(42),
        };
        let extra = values.to_extra();
        assert_eq!(extra.len(), 4 + 16);

        let read = Zip64Values::read(&extra, false, true, true);
        assert_eq!(read, values);

        // Field not present in the record even though it was asked for.
        let read = Zip64Values::read(&extra, true, true, true);
        assert_eq!(read.size, Some(0x1_0000_0000));
        assert_eq!(read.compressed_size, Some(42));
        assert_eq!(read.header_offset, None);
    }

    #[test]
    fn test_extended_timestamp_local_and_central() {
        let times = ExtraTimes {
            modified: Some(from_unix_seconds(1_700_000_001)),
            accessed: Some(from_unix_seconds(1_700_000_100)),
            created: None,
        };

        let local = times.to_extra(false);
        assert_eq!(local.len(), 4 + 1 + 8);
        assert_eq!(ExtraTimes::read(&local), times);

        let central = times.to_extra(true);
        assert_eq!(central.len(), 4 + 1 + 4);
        let read = ExtraTimes::read(&central);
        assert_eq!(read.modified, times.modified);
        assert_eq!(read.accessed, None);
    }

    #[test]
    fn test_ntfs_for_out_of_range_times() {
        let far = UNIX_EPOCH + Duration::new(5_000_000_000, 123_456_700);
        let times = ExtraTimes {
            modified: Some(far),
            accessed: None,
            created: Some(from_unix_seconds(-5_000_000_000)),
        };

        let extra = times.to_extra(false);
        assert!(find(&extra, NTFS_EXTRA_ID).is_some());
        assert_eq!(ExtraTimes::read(&extra), times);
    }

    #[test]
    fn test_unix_seconds_before_epoch() {
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_millis(500)), -1);
        assert_eq!(unix_seconds(from_unix_seconds(-86_400)), -86_400);
        assert_eq!(unix_seconds(from_unix_seconds(86_400)), 86_400);
    }
}
