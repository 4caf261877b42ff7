//! Create command implementation.

use crate::utils::{name_codec, unix_time};
use log::info;
use oxizip_archive::{
    ArchiveFormat, GzipHeader, GzipWriter, ZipEntry, ZipMethod, ZipWriteOptions, ZipWriter,
};
use oxizip_core::{CompressionLevel, Crc32};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Options for creating an archive.
pub struct CreateOptions<'a> {
    pub level: u8,
    pub store: bool,
    pub comment: Option<&'a str>,
    pub charset: Option<&'a str>,
    pub verbose: bool,
}

pub fn cmd_create(
    archive: &Path,
    files: &[impl AsRef<Path>],
    options: &CreateOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if files.is_empty() {
        return Err("No files specified".into());
    }
    let level = CompressionLevel::new(options.level);

    if ArchiveFormat::from_extension(archive) == ArchiveFormat::Gzip {
        let [file] = files else {
            return Err("GZIP holds a single file; pass exactly one input".into());
        };
        return create_gzip(archive, file.as_ref(), level, options);
    }

    let mut zip_options = ZipWriteOptions::new()
        .with_level(level)
        .with_codec(name_codec(options.charset)?);
    if options.store {
        zip_options = zip_options.with_method(ZipMethod::Stored);
    }
    if let Some(comment) = options.comment {
        zip_options = zip_options.with_comment(comment);
    }

    let out = BufWriter::new(File::create(archive)?);
    let mut zip = ZipWriter::with_options(out, zip_options);
    for path in files {
        let path = path.as_ref();
        add_path_to_zip(&mut zip, path, path, options)?;
    }
    let count = zip.len();
    let mut out = zip.into_inner()?;
    out.flush()?;

    println!("Created {} with {} entries", archive.display(), count);
    Ok(())
}

fn create_gzip(
    archive: &Path,
    path: &Path,
    level: CompressionLevel,
    options: &CreateOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    if path.is_dir() {
        return Err(format!("{}: GZIP cannot hold a directory", path.display()).into());
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut header = GzipHeader::with_filename(&name);
    if let Some(comment) = options.comment {
        header = header.with_comment(comment);
    }
    let mtime = unix_time(fs::metadata(path)?.modified().ok()).unwrap_or(0);
    header = header.with_mtime(u32::try_from(mtime).unwrap_or(0));

    let mut input = BufReader::new(File::open(path)?);
    let out = BufWriter::new(File::create(archive)?);
    let mut gzip = GzipWriter::with_header(out, header).level(level);
    io::copy(&mut input, &mut gzip)?;
    let total = gzip.total_in();
    gzip.finish()?.flush()?;

    if options.verbose {
        println!("  Added: {} ({} bytes)", name, total);
    }
    println!("Created {}", archive.display());
    Ok(())
}

/// Entry name of `path` relative to the parent of the top-level input.
fn entry_name(path: &Path, base: &Path) -> String {
    path.strip_prefix(base.parent().unwrap_or(base))
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn add_path_to_zip<W: Write>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    base: &Path,
    options: &CreateOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let name = entry_name(path, base);
    let metadata = fs::metadata(path)?;
    let modified = metadata.modified().ok();

    if metadata.is_dir() {
        let mut entry = ZipEntry::directory(name.as_str());
        if let Some(modified) = modified {
            entry = entry.with_modified(modified);
        }
        zip.begin_entry(entry)?;
        zip.close_entry()?;
        if options.verbose {
            println!("  Added: {}/", name.trim_end_matches('/'));
        }

        let mut children: Vec<_> = fs::read_dir(path)?.collect::<Result<_, _>>()?;
        children.sort_by_key(|e| e.file_name());
        for child in children {
            add_path_to_zip(zip, &child.path(), base, options)?;
        }
        return Ok(());
    }

    let mut entry = ZipEntry::new(name.as_str());
    if let Some(modified) = modified {
        entry = entry.with_modified(modified);
    }

    if options.store {
        // Stored entries need their size and CRC before the data.
        let data = fs::read(path)?;
        entry = entry
            .with_method(ZipMethod::Stored)
            .with_size(data.len() as u64)
            .with_crc32(Crc32::compute(&data));
        zip.begin_entry(entry)?;
        zip.write_all(&data)?;
    } else {
        zip.begin_entry(entry)?;
        let mut input = BufReader::new(File::open(path)?);
        io::copy(&mut input, zip)?;
    }
    zip.close_entry()?;

    info!("added {} ({} bytes)", name, metadata.len());
    if options.verbose {
        println!("  Added: {} ({} bytes)", name, metadata.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxizip_archive::{GzipReader, ZipArchive};
    use std::io::Read;

    fn options(store: bool) -> CreateOptions<'static> {
        CreateOptions {
            level: 6,
            store,
            comment: Some("cli test"),
            charset: None,
            verbose: false,
        }
    }

    #[test]
    fn test_create_zip_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        fs::create_dir_all(input.join("nested")).unwrap();
        fs::write(input.join("a.txt"), "alpha ".repeat(100)).unwrap();
        fs::write(input.join("nested/b.txt"), "beta").unwrap();

        for store in [false, true] {
            let archive = dir.path().join(format!("out-{store}.zip"));
            cmd_create(&archive, &[&input], &options(store)).unwrap();

            let zip = ZipArchive::open(&archive).unwrap();
            assert_eq!(zip.comment().unwrap().as_deref(), Some("cli test"));
            assert_eq!(zip.read_entry("input/a.txt").unwrap(), "alpha ".repeat(100).as_bytes());
            assert_eq!(zip.read_entry("input/nested/b.txt").unwrap(), b"beta");
            assert!(zip.entry("input/nested").unwrap().is_some_and(|e| e.is_dir()));

            let method = zip.entry("input/a.txt").unwrap().map(|e| e.method);
            let expected = if store { ZipMethod::Stored } else { ZipMethod::Deflated };
            assert_eq!(method, Some(expected));
        }
    }

    #[test]
    fn test_create_gzip_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        fs::write(&input, "gzip me ".repeat(50)).unwrap();
        let archive = dir.path().join("notes.txt.gz");

        cmd_create(&archive, &[&input], &options(false)).unwrap();

        let mut reader = GzipReader::new(File::open(&archive).unwrap()).unwrap();
        assert_eq!(reader.header().filename.as_deref(), Some("notes.txt"));
        assert_eq!(reader.header().comment.as_deref(), Some("cli test"));
        let mut data = String::new();
        reader.read_to_string(&mut data).unwrap();
        assert_eq!(data, "gzip me ".repeat(50));

        let err = cmd_create(&archive, &[&input, &input], &options(false)).unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }
}
