//! Info command implementation.

use super::open_detected;
use crate::utils::read_options;
use oxizip_archive::{ArchiveFormat, GzipReader, ZipArchive, ZipEntry};
use std::path::Path;

pub fn cmd_info(archive: &Path, charset: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let (format, reader) = open_detected(archive)?;
    let metadata = std::fs::metadata(archive)?;

    println!("Archive Information");
    println!("===================");
    println!("File: {}", archive.display());
    println!("Format: {}", format);
    println!("Size: {} bytes", metadata.len());
    println!("MIME type: {}", format.mime_type());

    match format {
        ArchiveFormat::Gzip => {
            let gzip = GzipReader::new(reader)?;
            let header = gzip.header();
            println!();
            println!("Header:");
            println!("  Original name: {}", header.filename.as_deref().unwrap_or("-"));
            if let Some(comment) = &header.comment {
                println!("  Comment: {}", comment);
            }
            println!("  Modified: {} (Unix time)", header.mtime);
            println!("  OS: {}", header.os);
            println!("  Extra flags: {}", header.xfl);
            println!("  Text: {}", header.is_text());
            if let Some(crc) = header.header_crc {
                println!("  Header CRC16: {:04x}", crc);
            }
        }
        _ => {
            drop(reader);
            let zip = ZipArchive::open_with_options(archive, read_options(charset)?)?;
            let entries: Vec<ZipEntry> = zip.entries()?.collect::<Result<_, _>>()?;
            let total_size: u64 = entries.iter().filter_map(|e| e.size).sum();
            let total_compressed: u64 = entries.iter().filter_map(|e| e.compressed_size).sum();

            println!("ZIP64: {}", if zip.is_zip64() { "yes" } else { "no" });
            if let Some(comment) = zip.comment()? {
                println!("Comment: {}", comment);
            }

            println!();
            println!("Contents:");
            println!("  Files: {}", entries.iter().filter(|e| e.is_file()).count());
            println!("  Directories: {}", entries.iter().filter(|e| e.is_dir()).count());
            println!("  Deferred sizes: {}", entries.iter().filter(|e| e.has_data_descriptor()).count());
            println!("  Total size: {} bytes", total_size);
            println!("  Compressed size: {} bytes", total_compressed);
            if total_size > 0 {
                let ratio = (1.0 - total_compressed as f64 / total_size as f64) * 100.0;
                println!("  Space savings: {:.1}%", ratio);
            }
        }
    }
    Ok(())
}
