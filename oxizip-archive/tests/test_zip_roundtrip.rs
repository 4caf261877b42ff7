use oxizip_archive::zip::{
    ZipArchive, ZipEntry, ZipMethod, ZipReadOptions, ZipStreamReader, ZipWriteOptions, ZipWriter,
};
use oxizip_core::{CompressionLevel, Crc32, ErrorKind};
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::time::{Duration, UNIX_EPOCH};

fn sample_files() -> Vec<(String, Vec<u8>)> {
    vec![
        ("file1.txt".to_string(), "Test data file 1. ".repeat(100).into_bytes()),
        ("dir/file2.txt".to_string(), "File 2 with different content. ".repeat(100).into_bytes()),
        ("empty.bin".to_string(), Vec::new()),
        ("dir/ünïcode.txt".to_string(), b"utf-8 names".to_vec()),
        ("random.bin".to_string(), (0..5000u32).map(|i| (i * 7919 % 251) as u8).collect()),
    ]
}

#[test]
fn test_multifile_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
    let files = sample_files();
    let modified = UNIX_EPOCH + Duration::from_secs(1_700_000_001);

    let mut writer = ZipWriter::with_options(
        Vec::new(),
        ZipWriteOptions::new().with_level(CompressionLevel::BEST).with_comment("archive comment"),
    );
    for (i, (name, data)) in files.iter().enumerate() {
        let mut entry = ZipEntry::new(name.as_str()).with_modified(modified);
        if i % 2 == 1 {
            entry = entry
                .with_method(ZipMethod::Stored)
                .with_size(data.len() as u64)
                .with_crc32(Crc32::compute(data));
        }
        writer.begin_entry(entry)?;
        writer.write_all(data)?;
        writer.close_entry()?;
    }
    writer.add_directory("dir")?;
    let bytes = writer.into_inner()?;

    let archive = ZipArchive::from_reader(Cursor::new(bytes), ZipReadOptions::default())?;
    assert_eq!(archive.len(), files.len() + 1);
    assert_eq!(archive.comment()?.as_deref(), Some("archive comment"));

    let entries: Vec<ZipEntry> = archive.entries()?.collect::<Result<_, _>>()?;
    for ((name, data), entry) in files.iter().zip(&entries) {
        assert_eq!(&entry.name, name);
        assert_eq!(entry.size, Some(data.len() as u64));
        assert_eq!(entry.crc32, Some(Crc32::compute(data)));
        assert_eq!(entry.modified, Some(modified));
        assert!(entry.is_utf8());
        assert_eq!(&archive.read_entry(name)?, data);
    }
    assert_eq!(entries[1].method, ZipMethod::Stored);
    assert_eq!(entries[0].method, ZipMethod::Deflated);
    assert!(entries.last().is_some_and(|e| e.is_dir()));
    Ok(())
}

#[test]
fn test_reopen_shares_index() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shared.zip");
    let mut writer = ZipWriter::new(File::create(&path)?);
    writer.add_file("a.txt", b"alpha")?;
    writer.add_file("b.txt", b"beta")?;
    writer.finish()?;
    drop(writer);

    let first = ZipArchive::open(&path)?;
    assert_eq!(first.shared_count(), 1);
    let second = ZipArchive::open(&path)?;
    assert_eq!(second.shared_count(), 2);

    let names = |archive: &ZipArchive| -> Vec<String> {
        archive.entries().unwrap().map(|e| e.unwrap().name).collect()
    };
    assert_eq!(names(&first), names(&second));

    // A stream keeps its own reference and outlives the handle.
    let mut stream = second.by_name("b.txt")?;
    assert_eq!(first.shared_count(), 3);
    drop(second);
    let mut data = String::new();
    stream.read_to_string(&mut data)?;
    assert_eq!(data, "beta");
    drop(stream);
    assert_eq!(first.shared_count(), 1);

    // An uncached open gets its own index.
    let private = ZipArchive::open_with_options(&path, ZipReadOptions::new().with_cache(false))?;
    assert_eq!(private.shared_count(), 1);
    assert_eq!(first.shared_count(), 1);
    Ok(())
}

#[test]
fn test_open_missing_file_names_path() {
    let err = ZipArchive::open("/nonexistent/archive.zip").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert!(err.to_string().contains("archive.zip"));
}

#[test]
fn test_maximum_comment() -> Result<(), Box<dyn std::error::Error>> {
    let comment = "c".repeat(65535);
    let mut writer = ZipWriter::new(Vec::new());
    writer.set_comment(comment.clone())?;
    writer.add_file("x", b"payload")?;
    let bytes = writer.into_inner()?;

    let archive = ZipArchive::from_reader(Cursor::new(bytes), ZipReadOptions::default())?;
    assert_eq!(archive.comment()?, Some(comment));
    assert_eq!(archive.read_entry("x")?, b"payload");
    Ok(())
}

#[test]
fn test_directory_lookup_without_slash() -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = ZipWriter::new(Vec::new());
    writer.add_directory("docs")?;
    writer.add_file("docs/readme", b"read me")?;
    let bytes = writer.into_inner()?;

    let archive = ZipArchive::from_reader(Cursor::new(bytes), ZipReadOptions::default())?;
    let entry = archive.entry("docs")?.ok_or("docs not found")?;
    assert_eq!(entry.name, "docs/");
    assert!(entry.is_dir());
    assert!(archive.entry("docs/readme/")?.is_none());
    assert!(archive.entry("missing")?.is_none());
    Ok(())
}

#[test]
fn test_close_ends_streams() -> Result<(), Box<dyn std::error::Error>> {
    let data = "streamed content ".repeat(4000);
    let mut writer = ZipWriter::new(Vec::new());
    writer.add_file("big.txt", data.as_bytes())?;
    let bytes = writer.into_inner()?;

    let mut archive = ZipArchive::from_reader(Cursor::new(bytes), ZipReadOptions::default())?;
    let mut stream = archive.by_name("big.txt")?;
    let mut buf = [0u8; 100];
    stream.read_exact(&mut buf)?;
    assert_eq!(&buf[..], &data.as_bytes()[..100]);

    archive.close();
    archive.close();
    assert!(stream.is_closed());
    let err = stream.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

    let err = archive.entry("big.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(archive.is_empty());
    Ok(())
}

#[test]
fn test_deferred_entries_recovered_by_stream_reader() -> Result<(), Box<dyn std::error::Error>> {
    let files = sample_files();
    let mut writer = ZipWriter::new(Vec::new());
    for (name, data) in &files {
        writer.begin_entry(ZipEntry::new(name.as_str()))?;
        writer.write_all(data)?;
    }
    let bytes = writer.into_inner()?;

    let mut reader = ZipStreamReader::new(Cursor::new(bytes));
    for (name, data) in &files {
        let entry = reader.next_entry()?.ok_or("missing entry")?;
        assert_eq!(&entry.name, name);
        assert!(entry.has_data_descriptor());
        assert_eq!(entry.size, None);

        let mut out = Vec::new();
        reader.read_to_end(&mut out)?;
        assert_eq!(&out, data);

        let resolved = reader.entry().ok_or("no current entry")?;
        assert_eq!(resolved.size, Some(data.len() as u64));
        assert_eq!(resolved.crc32, Some(Crc32::compute(data)));
    }
    assert!(reader.next_entry()?.is_none());
    Ok(())
}

#[test]
fn test_incomplete_archive() -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = ZipWriter::new(Vec::new());
    writer.add_file("one", b"first entry")?;
    writer.add_file("two", b"second entry")?;
    // Never finished: no central directory.
    let bytes = writer.get_ref().clone();

    let err = ZipArchive::from_reader(Cursor::new(bytes.clone()), ZipReadOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);

    let mut reader = ZipStreamReader::new(Cursor::new(bytes));
    let mut recovered = Vec::new();
    while let Some(entry) = reader.next_entry()? {
        let mut data = String::new();
        reader.read_to_string(&mut data)?;
        recovered.push((entry.name, data));
    }
    assert_eq!(
        recovered,
        vec![
            ("one".to_string(), "first entry".to_string()),
            ("two".to_string(), "second entry".to_string()),
        ]
    );
    Ok(())
}

#[test]
fn test_zip64_end_record_for_many_entries() -> Result<(), Box<dyn std::error::Error>> {
    let count = 0x10000;
    let mut writer = ZipWriter::new(Vec::new());
    for i in 0..count {
        writer.add_directory(&format!("d{i}"))?;
    }
    let bytes = writer.into_inner()?;

    let archive = ZipArchive::from_reader(Cursor::new(bytes), ZipReadOptions::default())?;
    assert!(archive.is_zip64());
    assert_eq!(archive.len(), count);
    assert!(archive.entry("d65535")?.is_some());
    Ok(())
}
