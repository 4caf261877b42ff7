//! Central directory discovery and indexing.
//!
//! The end record is found by scanning backward from the end of the file,
//! since a comment of up to 65535 bytes may follow it. The central directory
//! is then read in one piece and indexed by name hash into a flat table of
//! `(hash, next, offset)` triples; entries are only materialized on lookup.

use super::entry::{from_dos_time, ZipEntry, ZipMethod};
use super::extra::{ExtraTimes, Zip64Values};
use super::shared::Source;
use super::spec::{
    u32_at, CentralDirectoryRecord, EndOfCentralDirectory, Zip64EndOfCentralDirectory,
    Zip64Locator, CENTRAL_DIR_HEADER_SIG, CENTRAL_HEADER_LEN, END_OF_CENTRAL_DIR_SIG,
    END_RECORD_LEN, FLAG_ENCRYPTED, FLAG_UTF8, LOCAL_FILE_HEADER_SIG, MAX_COMMENT_LEN,
    ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG, ZIP64_END_RECORD_LEN, ZIP64_LOCATOR_LEN, ZIP64_MARKER_16,
    ZIP64_MARKER_32,
};
use log::{debug, warn};
use oxizip_core::charset::NameCodec;
use oxizip_core::error::{OxiZipError, Result};
use std::borrow::Cow;

/// Block size of the backward end-record scan.
const READ_BLOCK_LEN: usize = 1024;

/// End of a hash chain.
const END_OF_CHAIN: u32 = u32::MAX;

/// Prefix of entries listed by `metadata_names`.
const METADATA_PREFIX: &[u8] = b"META-INF/";

/// Location of the central directory, from the end record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndLocation {
    /// Declared number of entries.
    pub total: u64,
    /// Absolute offset of the central directory.
    pub cen_pos: u64,
    /// Length of the central directory.
    pub cen_len: u64,
    /// Absolute offset of the classic end record.
    pub end_pos: u64,
    /// Bytes preceding the archive proper (self-extracting stubs).
    pub base: u64,
    /// Raw archive comment.
    pub comment: Vec<u8>,
    /// Whether the ZIP64 end record was adopted.
    pub zip64: bool,
}

/// Locate and validate the end of central directory record.
pub(crate) fn find_end(source: &Source) -> Result<EndLocation> {
    let len = source.len();
    if len < END_RECORD_LEN as u64 {
        return Err(OxiZipError::format(len, "end of central directory not found"));
    }

    let min_pos = len.saturating_sub((MAX_COMMENT_LEN + END_RECORD_LEN) as u64);
    // Candidates at or above this position have been looked at.
    let mut checked_from = len - END_RECORD_LEN as u64 + 1;
    let mut block = [0u8; READ_BLOCK_LEN];
    let mut block_end = len;

    loop {
        let block_start = block_end.saturating_sub(READ_BLOCK_LEN as u64);
        let buf = &mut block[..(block_end - block_start) as usize];
        source.read_at(buf, block_start)?;

        for i in (0..=buf.len() - END_RECORD_LEN).rev() {
            let pos = block_start + i as u64;
            if pos >= checked_from {
                continue;
            }
            if pos < min_pos {
                break;
            }
            checked_from = pos;

            if u32_at(buf, i) != END_OF_CENTRAL_DIR_SIG {
                continue;
            }
            if let Some(end) = check_candidate(source, &buf[i..i + END_RECORD_LEN], pos)? {
                return Ok(end);
            }
        }

        if block_start <= min_pos {
            break;
        }
        // Overlap so a record straddling the boundary is seen whole.
        block_end = block_start + END_RECORD_LEN as u64;
    }

    Err(OxiZipError::format(len, "end of central directory not found"))
}

fn check_candidate(source: &Source, record: &[u8], pos: u64) -> Result<Option<EndLocation>> {
    let end = EndOfCentralDirectory::parse(record, pos)?;
    let len = source.len();
    if pos + END_RECORD_LEN as u64 + u64::from(end.comment_len) != len {
        debug!("end signature at {pos} rejected: comment length does not reach end of file");
        return Ok(None);
    }

    let mut total = u64::from(end.total_entries);
    let mut cen_len = u64::from(end.cd_size);
    let mut cen_off = u64::from(end.cd_offset);
    let mut dir_end = pos;
    let mut zip64 = false;

    if let Some(end64) = read_zip64_end(source, pos)? {
        let consistent = (end.cd_size == ZIP64_MARKER_32 || cen_len == end64.1.cd_size)
            && (end.cd_offset == ZIP64_MARKER_32 || cen_off == end64.1.cd_offset)
            && (end.total_entries == ZIP64_MARKER_16 || total == end64.1.total_entries);
        if consistent {
            debug!("using ZIP64 end record at {}", end64.0);
            total = end64.1.total_entries;
            cen_len = end64.1.cd_size;
            cen_off = end64.1.cd_offset;
            dir_end = end64.0;
            zip64 = true;
        } else {
            warn!("ignoring ZIP64 end record at {} that disagrees with the end record", end64.0);
        }
    }

    let Some(cen_pos) = dir_end.checked_sub(cen_len) else {
        debug!("end signature at {pos} rejected: directory length exceeds its position");
        return Ok(None);
    };
    let Some(base) = cen_pos.checked_sub(cen_off) else {
        debug!("end signature at {pos} rejected: directory offset exceeds its position");
        return Ok(None);
    };

    let non_empty = total > 0 || cen_len > 0;
    if non_empty
        && (!signature_at(source, cen_pos, CENTRAL_DIR_HEADER_SIG)?
            || !signature_at(source, base, LOCAL_FILE_HEADER_SIG)?)
    {
        debug!("end signature at {pos} rejected: no headers where it points");
        return Ok(None);
    }

    let mut comment = vec![0u8; usize::from(end.comment_len)];
    source.read_at(&mut comment, pos + END_RECORD_LEN as u64)?;

    debug!("end of central directory at {pos}: {total} entries, directory at {cen_pos}");
    Ok(Some(EndLocation {
        total,
        cen_pos,
        cen_len,
        end_pos: pos,
        base,
        comment,
        zip64,
    }))
}

/// Read the ZIP64 locator just before `end_pos` and the record it points to.
fn read_zip64_end(source: &Source, end_pos: u64) -> Result<Option<(u64, Zip64EndOfCentralDirectory)>> {
    let Some(locator_pos) = end_pos.checked_sub(ZIP64_LOCATOR_LEN as u64) else {
        return Ok(None);
    };
    if !signature_at(source, locator_pos, ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG)? {
        return Ok(None);
    }

    let mut buf = [0u8; ZIP64_LOCATOR_LEN];
    source.read_at(&mut buf, locator_pos)?;
    let locator = Zip64Locator::parse(&buf, locator_pos)?;

    let end64_pos = locator.end_record_offset;
    if end64_pos.checked_add(ZIP64_END_RECORD_LEN as u64).is_none_or(|e| e > locator_pos) {
        return Ok(None);
    }
    let mut buf = [0u8; ZIP64_END_RECORD_LEN];
    source.read_at(&mut buf, end64_pos)?;
    Ok(Zip64EndOfCentralDirectory::parse(&buf, end64_pos)
        .ok()
        .map(|record| (end64_pos, record)))
}

fn signature_at(source: &Source, pos: u64, signature: u32) -> Result<bool> {
    if pos.checked_add(4).is_none_or(|e| e > source.len()) {
        return Ok(false);
    }
    let mut buf = [0u8; 4];
    source.read_at(&mut buf, pos)?;
    Ok(u32::from_le_bytes(buf) == signature)
}

/// Rolling name hash (`h = 31 * h + b`) over UTF-8 bytes.
pub fn name_hash(name: &[u8]) -> u32 {
    name.iter()
        .fold(0u32, |h, &b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// Hash-indexed central directory.
#[derive(Debug)]
pub struct CentralDirectory {
    cen: Vec<u8>,
    /// `(hash, next, cen offset)` per entry, in directory order.
    slots: Vec<u32>,
    /// Chain heads, `END_OF_CHAIN` when empty.
    table: Vec<u32>,
    total: usize,
    base: u64,
    comment: Vec<u8>,
    metadata: Vec<u32>,
    codec: NameCodec,
    zip64: bool,
}

impl CentralDirectory {
    /// Find the end record, read the central directory and index it.
    pub(crate) fn read(source: &Source, codec: NameCodec) -> Result<Self> {
        let end = find_end(source)?;
        if end.cen_len > u64::from(u32::MAX) {
            return Err(OxiZipError::format(end.cen_pos, "central directory too large"));
        }
        if end.total > end.cen_len / CENTRAL_HEADER_LEN as u64 {
            return Err(OxiZipError::format(
                end.end_pos,
                format!("invalid END header: {} entries cannot fit in {} bytes", end.total, end.cen_len),
            ));
        }

        let mut cen = vec![0u8; end.cen_len as usize];
        source.read_at(&mut cen, end.cen_pos)?;
        Self::from_parts(cen, end.total as usize, end.base, end.comment, codec, end.zip64)
    }

    /// Index raw central directory bytes.
    pub fn from_parts(
        cen: Vec<u8>,
        declared_total: usize,
        base: u64,
        comment: Vec<u8>,
        codec: NameCodec,
        zip64: bool,
    ) -> Result<Self> {
        let mut directory = Self {
            cen,
            slots: Vec::new(),
            table: Vec::new(),
            total: 0,
            base,
            comment,
            metadata: Vec::new(),
            codec,
            zip64,
        };

        if !directory.index(declared_total)? {
            let counted = count_records(&directory.cen);
            warn!("end record declares {declared_total} entries, directory holds {counted}; reindexing");
            if !directory.index(counted)? {
                return Err(OxiZipError::format(0, "central directory entry count is inconsistent"));
            }
        }
        Ok(directory)
    }

    /// One indexing pass. Returns `false` if more records exist than `total`.
    fn index(&mut self, total: usize) -> Result<bool> {
        let table_len = total / 2 | 1;
        self.slots = vec![0; total * 3];
        self.table = vec![END_OF_CHAIN; table_len];
        self.metadata.clear();

        let limit = self.cen.len();
        let mut pos = 0usize;
        let mut count = 0usize;

        while pos + CENTRAL_HEADER_LEN <= limit {
            if count >= total {
                return Ok(false);
            }
            let record = CentralDirectoryRecord::parse(&self.cen, pos).map_err(|_| {
                OxiZipError::format(pos as u64, "invalid CEN header (bad signature)")
            })?;
            let next = pos + record.total_len();
            if next > limit {
                return Err(OxiZipError::format(pos as u64, "invalid CEN header (bad header size)"));
            }

            let name_start = pos + CENTRAL_HEADER_LEN;
            let raw_name = &self.cen[name_start..name_start + usize::from(record.name_len)];
            if record.flags & FLAG_ENCRYPTED != 0 {
                let name = String::from_utf8_lossy(raw_name).into_owned();
                return Err(OxiZipError::encrypted(name));
            }
            if record.method != ZipMethod::Stored.code() && record.method != ZipMethod::Deflated.code() {
                return Err(OxiZipError::format(
                    pos as u64,
                    format!("invalid CEN header (bad compression method: {})", record.method),
                ));
            }
            self.check_zip64(&record, pos)?;

            let hash = match self.decode(raw_name, record.flags) {
                Ok(name) => name_hash(name.as_bytes()),
                Err(_) => {
                    return Err(OxiZipError::format(pos as u64, "invalid CEN header (bad entry name)"));
                }
            };

            if is_metadata_name(raw_name) {
                self.metadata.push(pos as u32);
            }

            let bucket = (hash % table_len as u32) as usize;
            let slot = count * 3;
            self.slots[slot] = hash;
            self.slots[slot + 1] = self.table[bucket];
            self.slots[slot + 2] = pos as u32;
            self.table[bucket] = count as u32;

            count += 1;
            pos = next;
        }

        if pos != limit {
            return Err(OxiZipError::format(pos as u64, "invalid CEN header (bad header size)"));
        }
        if count != total {
            return Err(OxiZipError::format(
                pos as u64,
                format!("end record declares {total} entries, found {count}"),
            ));
        }
        self.total = count;
        Ok(true)
    }

    /// 32-bit sentinels must be backed by a ZIP64 extra field.
    fn check_zip64(&self, record: &CentralDirectoryRecord, pos: usize) -> Result<()> {
        let need_size = record.uncompressed_size == ZIP64_MARKER_32;
        let need_compressed = record.compressed_size == ZIP64_MARKER_32;
        let need_offset = record.local_header_offset == ZIP64_MARKER_32;
        if !(need_size || need_compressed || need_offset) {
            return Ok(());
        }

        let values = Zip64Values::read(self.extra_at(pos, record), need_size, need_compressed, need_offset);
        if (need_size && values.size.is_none())
            || (need_compressed && values.compressed_size.is_none())
            || (need_offset && values.header_offset.is_none())
        {
            return Err(OxiZipError::format(pos as u64, "invalid CEN header (bad zip64 extra)"));
        }
        Ok(())
    }

    fn extra_at(&self, pos: usize, record: &CentralDirectoryRecord) -> &[u8] {
        let start = pos + CENTRAL_HEADER_LEN + usize::from(record.name_len);
        &self.cen[start..start + usize::from(record.extra_len)]
    }

    fn decode<'a>(&self, raw: &'a [u8], flags: u16) -> Result<Cow<'a, str>> {
        if flags & FLAG_UTF8 != 0 {
            NameCodec::utf8().decode(raw)
        } else {
            self.codec.decode(raw)
        }
    }

    fn name_matches(&self, pos: usize, name: &str) -> Result<bool> {
        let record = CentralDirectoryRecord::parse(&self.cen, pos)?;
        let start = pos + CENTRAL_HEADER_LEN;
        let raw = &self.cen[start..start + usize::from(record.name_len)];
        if record.flags & FLAG_UTF8 != 0 || self.codec.is_utf8() {
            return Ok(raw == name.as_bytes());
        }
        Ok(self.codec.decode(raw)? == name)
    }

    fn find_exact(&self, name: &str) -> Result<Option<usize>> {
        if self.total == 0 {
            return Ok(None);
        }
        let hash = name_hash(name.as_bytes());
        let mut index = self.table[(hash % self.table.len() as u32) as usize];
        while index != END_OF_CHAIN {
            let slot = index as usize * 3;
            let pos = self.slots[slot + 2] as usize;
            if self.slots[slot] == hash && self.name_matches(pos, name)? {
                return Ok(Some(pos));
            }
            index = self.slots[slot + 1];
        }
        Ok(None)
    }

    /// Directory offset of the record named `name`.
    ///
    /// On a miss, a name without a trailing `/` is retried once with one
    /// appended so directories can be looked up by their bare name.
    pub fn find(&self, name: &str) -> Result<Option<usize>> {
        if let Some(pos) = self.find_exact(name)? {
            return Ok(Some(pos));
        }
        if name.is_empty() || name.ends_with('/') {
            return Ok(None);
        }
        self.find_exact(&format!("{name}/"))
    }

    /// Look up an entry by name.
    pub fn entry(&self, name: &str) -> Result<Option<ZipEntry>> {
        match self.find(name)? {
            Some(pos) => self.entry_at(pos).map(Some),
            None => Ok(None),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.total
    }

    /// Check if the directory has no entries.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Directory offset of the `index`-th entry in directory order.
    pub fn position(&self, index: usize) -> Option<usize> {
        (index < self.total).then(|| self.slots[index * 3 + 2] as usize)
    }

    /// Whether the ZIP64 end record was used.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Archive comment, decoded with the archive charset.
    pub fn comment(&self) -> Result<Option<String>> {
        if self.comment.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.codec.decode(&self.comment)?.into_owned()))
    }

    /// Names of non-directory entries under `META-INF/`.
    pub fn metadata_names(&self) -> Result<Vec<String>> {
        self.metadata
            .iter()
            .map(|&pos| {
                let pos = pos as usize;
                let record = CentralDirectoryRecord::parse(&self.cen, pos)?;
                let start = pos + CENTRAL_HEADER_LEN;
                let raw = &self.cen[start..start + usize::from(record.name_len)];
                Ok(self.decode(raw, record.flags)?.into_owned())
            })
            .collect()
    }

    /// Materialize the entry whose record starts at `pos`.
    pub fn entry_at(&self, pos: usize) -> Result<ZipEntry> {
        let record = CentralDirectoryRecord::parse(&self.cen, pos)?;
        let name_start = pos + CENTRAL_HEADER_LEN;
        let extra_start = name_start + usize::from(record.name_len);
        let comment_start = extra_start + usize::from(record.extra_len);
        let comment_end = comment_start + usize::from(record.comment_len);

        let name = self.decode(&self.cen[name_start..extra_start], record.flags)?.into_owned();
        let extra = self.cen[extra_start..comment_start].to_vec();
        let comment = match record.comment_len {
            0 => None,
            _ => Some(self.decode(&self.cen[comment_start..comment_end], record.flags)?.into_owned()),
        };

        let zip64 = Zip64Values::read(
            &extra,
            record.uncompressed_size == ZIP64_MARKER_32,
            record.compressed_size == ZIP64_MARKER_32,
            record.local_header_offset == ZIP64_MARKER_32,
        );
        let size = zip64.size.unwrap_or(u64::from(record.uncompressed_size));
        let compressed_size = zip64.compressed_size.unwrap_or(u64::from(record.compressed_size));
        let offset = zip64.header_offset.unwrap_or(u64::from(record.local_header_offset));

        let times = ExtraTimes::read(&extra);
        let modified = times.modified.or(Some(from_dos_time(record.dos_time)));

        Ok(ZipEntry {
            name,
            method: ZipMethod::from_code(record.method)?,
            size: Some(size),
            compressed_size: Some(compressed_size),
            crc32: Some(record.crc32),
            modified,
            accessed: times.accessed,
            created: times.created,
            extra,
            comment,
            external_attributes: record.external_attr,
            flags: record.flags,
            dos_time: Some(record.dos_time),
            header_offset: Some(self.base + offset),
        })
    }
}

/// Count records by walking their declared lengths.
fn count_records(cen: &[u8]) -> usize {
    let mut pos = 0;
    let mut count = 0;
    while pos + CENTRAL_HEADER_LEN <= cen.len() {
        match CentralDirectoryRecord::parse(cen, pos) {
            Ok(record) => pos += record.total_len(),
            Err(_) => break,
        }
        count += 1;
    }
    count
}

fn is_metadata_name(raw: &[u8]) -> bool {
    raw.len() > METADATA_PREFIX.len()
        && raw[..METADATA_PREFIX.len()].eq_ignore_ascii_case(METADATA_PREFIX)
        && raw.last() != Some(&b'/')
}
