//! Extract command implementation.

use super::open_detected;
use crate::utils::{create_progress_bar, matches_filters, read_options};
use filetime::FileTime;
use log::{debug, warn};
use oxizip_archive::{ArchiveFormat, GzipReader, ZipArchive, ZipEntry};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Options for extracting archive contents.
pub struct ExtractOptions<'a> {
    pub output: &'a Path,
    pub files: &'a [String],
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub verbose: bool,
    pub progress: bool,
    pub charset: Option<&'a str>,
}

pub fn cmd_extract(
    archive: &Path,
    options: &ExtractOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let (format, reader) = open_detected(archive)?;
    fs::create_dir_all(options.output)?;

    if format == ArchiveFormat::Gzip {
        let mut gzip = GzipReader::new(reader)?;
        let name = gzip_output_name(gzip.header().filename.as_deref(), archive);
        let path = options.output.join(&name);
        let modified = gzip.header().modified();

        let mut out = BufWriter::new(File::create(&path)?);
        let size = io::copy(&mut gzip, &mut out)?;
        out.flush()?;
        drop(out);
        restore_mtime(&path, modified);

        if options.verbose {
            println!("  {} ({} bytes, {} member(s))", name.display(), size, gzip.members());
        }
        println!("Extracted {} to {}", name.display(), options.output.display());
        return Ok(());
    }

    drop(reader);
    let zip = ZipArchive::open_with_options(archive, read_options(options.charset)?)?;
    let selected: Vec<ZipEntry> = zip
        .entries()?
        .filter(|entry| match entry {
            Ok(e) => {
                (options.files.is_empty() || options.files.iter().any(|f| f == &e.name))
                    && matches_filters(&e.name, options.include, options.exclude)
            }
            Err(_) => true,
        })
        .collect::<Result<_, _>>()?;

    let pb = create_progress_bar(selected.len() as u64, options.progress && !options.verbose);
    let mut extracted = 0usize;
    for entry in &selected {
        pb.set_message(entry.name.clone());
        entry.validate_path()?;
        let path = options.output.join(entry.sanitized_name());

        if entry.is_dir() {
            fs::create_dir_all(&path)?;
        } else {
            extract_entry(&zip, entry, &path)?;
            extracted += 1;
            if options.verbose {
                println!("  {} ({} bytes)", entry.name, entry.size.unwrap_or(0));
            }
        }
        restore_mtime(&path, entry.modified);
        pb.inc(1);
    }
    pb.finish_with_message("done");

    println!("Extracted {} files to {}", extracted, options.output.display());
    Ok(())
}

/// Stream one entry to `path`, creating parent directories.
fn extract_entry(
    zip: &ZipArchive,
    entry: &ZipEntry,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut stream = zip.open_entry_stream(entry)?;
    let mut out = BufWriter::new(File::create(path)?);
    io::copy(&mut stream, &mut out)?;
    out.flush()?;
    debug!("extracted {} to {}", entry.name, path.display());
    Ok(())
}

/// Name for the decompressed output of a GZIP file.
///
/// Uses the header's file name when it is a plain name, otherwise the
/// archive name without its extension.
fn gzip_output_name(header_name: Option<&str>, archive: &Path) -> PathBuf {
    if let Some(name) = header_name {
        let candidate = Path::new(name);
        let plain = candidate.components().count() == 1;
        if let Some(file_name) = candidate.file_name().filter(|_| plain) {
            return PathBuf::from(file_name);
        }
        warn!("ignoring unsafe GZIP file name {:?}", name);
    }

    let stem = archive
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let stem = PathBuf::from(stem);
    match archive.extension().and_then(|e| e.to_str()) {
        Some("tgz") => stem.with_extension("tar"),
        Some("gz") | Some("gzip") => stem,
        _ => stem.with_extension("out"),
    }
}

fn restore_mtime(path: &Path, modified: Option<SystemTime>) {
    let Some(modified) = modified else {
        return;
    };
    if let Err(e) = filetime::set_file_mtime(path, FileTime::from_system_time(modified)) {
        warn!("could not set modification time of {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gzip_output_name() {
        let archive = Path::new("dir/data.txt.gz");
        assert_eq!(gzip_output_name(Some("inner.txt"), archive), PathBuf::from("inner.txt"));
        assert_eq!(gzip_output_name(None, archive), PathBuf::from("data.txt"));
        assert_eq!(gzip_output_name(Some("../evil"), archive), PathBuf::from("data.txt"));
        assert_eq!(gzip_output_name(Some("/etc/passwd"), archive), PathBuf::from("data.txt"));
        assert_eq!(gzip_output_name(None, Path::new("pkg.tgz")), PathBuf::from("pkg.tar"));
        assert_eq!(gzip_output_name(None, Path::new("blob")), PathBuf::from("blob.out"));
    }

    #[test]
    fn test_extract_gzip_uses_header_name() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("packed.gz");
        let bytes = oxizip_archive::gzip::compress_with_filename(
            b"restored contents",
            "original.txt",
            oxizip_core::CompressionLevel::DEFAULT,
        )
        .unwrap();
        fs::write(&archive, bytes).unwrap();

        let output = dir.path().join("out");
        let options = ExtractOptions {
            output: &output,
            files: &[],
            include: &[],
            exclude: &[],
            verbose: true,
            progress: false,
            charset: None,
        };
        cmd_extract(&archive, &options).unwrap();
        assert_eq!(fs::read(output.join("original.txt")).unwrap(), b"restored contents");
    }
}
