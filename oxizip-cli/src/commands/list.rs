//! List command implementation.

use super::open_detected;
use crate::utils::{matches_filters, name_codec, print_entries, read_options, unix_time};
use oxizip_archive::{ArchiveFormat, GzipReader, ZipArchive, ZipEntry, ZipStreamReader};
use serde::Serialize;
use std::path::Path;

/// JSON serializable entry data for archive listings.
#[derive(Debug, Serialize)]
struct EntryJson {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compressed_size: Option<u64>,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    crc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    is_dir: bool,
}

impl EntryJson {
    fn from_entry(entry: &ZipEntry) -> Self {
        Self {
            name: entry.name.clone(),
            size: entry.size,
            compressed_size: entry.compressed_size,
            method: entry.method.name().to_string(),
            crc: entry.crc32,
            mtime: unix_time(entry.modified),
            comment: entry.comment.clone(),
            is_dir: entry.is_dir(),
        }
    }
}

/// JSON output for archive listing.
#[derive(Debug, Serialize)]
struct ArchiveListJson {
    archive: String,
    format: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entries: Option<Vec<EntryJson>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    header: Option<serde_json::Value>,
}

/// Options for listing archive contents.
pub struct ListOptions<'a> {
    pub long: bool,
    pub json: bool,
    pub stream: bool,
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub charset: Option<&'a str>,
}

pub fn cmd_list(archive: &Path, options: &ListOptions) -> Result<(), Box<dyn std::error::Error>> {
    let (format, reader) = open_detected(archive)?;

    if format == ArchiveFormat::Gzip {
        let gzip = GzipReader::new(reader)?;
        let header = gzip.header();
        if options.json {
            let output = ArchiveListJson {
                archive: archive.display().to_string(),
                format: format.to_string(),
                comment: header.comment.clone(),
                entries: None,
                header: Some(serde_json::json!({
                    "filename": header.filename,
                    "mtime": header.mtime,
                    "os": header.os,
                    "xfl": header.xfl,
                    "text": header.is_text(),
                    "header_crc": header.header_crc,
                })),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("{}", header.filename.as_deref().unwrap_or("<unnamed>"));
        }
        return Ok(());
    }

    let mut comment = None;
    let entries: Vec<ZipEntry> = if options.stream {
        let mut stream = ZipStreamReader::with_codec(reader, name_codec(options.charset)?);
        let mut entries = Vec::new();
        while let Some(entry) = stream.next_entry()? {
            // Skipping the body resolves sizes carried by a data descriptor.
            std::io::copy(&mut stream, &mut std::io::sink())?;
            entries.push(stream.entry().cloned().unwrap_or(entry));
        }
        entries
    } else {
        drop(reader);
        let zip = ZipArchive::open_with_options(archive, read_options(options.charset)?)?;
        comment = zip.comment()?;
        zip.entries()?.collect::<Result<_, _>>()?
    };

    let entries: Vec<ZipEntry> = entries
        .into_iter()
        .filter(|e| matches_filters(&e.name, options.include, options.exclude))
        .collect();

    if options.json {
        let output = ArchiveListJson {
            archive: archive.display().to_string(),
            format: format.to_string(),
            comment,
            entries: Some(entries.iter().map(EntryJson::from_entry).collect()),
            header: None,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_entries(&entries, options.long);
        if let Some(comment) = comment.filter(|_| options.long) {
            println!("Comment: {}", comment);
        }
    }
    Ok(())
}
