//! Test command implementation.

use super::open_detected;
use crate::utils::read_options;
use oxizip_archive::{ArchiveFormat, GzipReader, ZipArchive};
use std::io;
use std::path::Path;

pub fn cmd_test(
    archive: &Path,
    verbose: bool,
    charset: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (format, reader) = open_detected(archive)?;
    println!("Testing {} ({})", archive.display(), format);

    let mut total_files = 0usize;
    let mut errors: Vec<(String, String)> = Vec::new();

    match format {
        ArchiveFormat::Gzip => {
            total_files = 1;
            let mut gzip = GzipReader::new(reader)?;
            let name = gzip
                .header()
                .filename
                .clone()
                .unwrap_or_else(|| "<unnamed>".to_string());
            match io::copy(&mut gzip, &mut io::sink()) {
                Ok(_) => {
                    if verbose {
                        println!("  OK: {} ({} member(s))", name, gzip.members());
                    }
                }
                Err(e) => {
                    if verbose {
                        println!("  FAILED: {} - {}", name, e);
                    }
                    errors.push((name, e.to_string()));
                }
            }
        }
        _ => {
            drop(reader);
            let zip = ZipArchive::open_with_options(archive, read_options(charset)?)?;
            for entry in zip.entries()? {
                let entry = entry?;
                if entry.is_dir() {
                    continue;
                }
                total_files += 1;

                let result = zip
                    .open_entry_stream(&entry)
                    .map_err(io::Error::from)
                    .and_then(|mut stream| io::copy(&mut stream, &mut io::sink()));
                match result {
                    Ok(_) => {
                        if verbose {
                            println!("  OK: {}", entry.name);
                        }
                    }
                    Err(e) => {
                        if verbose {
                            println!("  FAILED: {} - {}", entry.name, e);
                        }
                        errors.push((entry.name, e.to_string()));
                    }
                }
            }
        }
    }

    println!();
    if errors.is_empty() {
        println!("All {} files OK", total_files);
        Ok(())
    } else {
        if !verbose {
            for (name, error) in &errors {
                println!("  FAILED: {} - {}", name, error);
            }
        }
        println!("{} of {} files FAILED", errors.len(), total_files);
        Err(format!("{} integrity error(s) in {}", errors.len(), archive.display()).into())
    }
}
