//! Utility functions for the CLI.

use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use oxizip_archive::{ZipEntry, ZipReadOptions};
use oxizip_core::NameCodec;
use std::time::{SystemTime, UNIX_EPOCH};

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░ ");
    pb.set_style(style);
    pb
}

/// Check if a filename matches the filter patterns.
/// - If include patterns are specified, the name must match at least one
/// - If exclude patterns are specified, the name must not match any
pub fn matches_filters(name: &str, include: &[String], exclude: &[String]) -> bool {
    let matches = |pattern: &String| Pattern::new(pattern).is_ok_and(|p| p.matches(name));

    if exclude.iter().any(matches) {
        return false;
    }
    include.is_empty() || include.iter().any(matches)
}

/// Read options for an optional `--charset` label.
pub fn read_options(charset: Option<&str>) -> oxizip_core::Result<ZipReadOptions> {
    Ok(ZipReadOptions::new().with_codec(name_codec(charset)?))
}

/// Name codec for an optional `--charset` label, UTF-8 by default.
pub fn name_codec(charset: Option<&str>) -> oxizip_core::Result<NameCodec> {
    match charset {
        Some(label) => NameCodec::for_label(label),
        None => Ok(NameCodec::utf8()),
    }
}

/// Seconds since the Unix epoch, if representable.
pub fn unix_time(time: Option<SystemTime>) -> Option<i64> {
    time.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

/// Format an optional size, `-` when unknown.
fn size_column(size: Option<u64>) -> String {
    size.map_or_else(|| "-".to_string(), |s| s.to_string())
}

/// Print entries in a formatted table.
pub fn print_entries(entries: &[ZipEntry], long: bool) {
    if !long {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!(
        "{:>10} {:>10} {:>6} {:>8} {:>8}  Name",
        "Size", "Compressed", "Ratio", "Method", "CRC32",
    );
    println!("{}", "-".repeat(70));

    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    for entry in entries {
        let ratio = match entry.size {
            Some(size) if size > 0 => format!("{:.1}%", entry.space_savings()),
            _ => "-".to_string(),
        };
        let crc = entry
            .crc32
            .map_or_else(|| "-".to_string(), |c| format!("{c:08x}"));
        let type_prefix = if entry.is_dir() { "d " } else { "  " };

        println!(
            "{:>10} {:>10} {:>6} {:>8} {:>8}  {}{}",
            size_column(entry.size),
            size_column(entry.compressed_size),
            ratio,
            entry.method.name(),
            crc,
            type_prefix,
            entry.name
        );

        total_size += entry.size.unwrap_or(0);
        total_compressed += entry.compressed_size.unwrap_or(0);
    }

    println!("{}", "-".repeat(70));
    let total_ratio = if total_size > 0 {
        (1.0 - total_compressed as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "{:>10} {:>10} {:>5.1}%                   {} files",
        total_size,
        total_compressed,
        total_ratio,
        entries.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_filters() {
        let include = vec!["*.txt".to_string()];
        let exclude = vec!["secret*".to_string()];

        assert!(matches_filters("notes.txt", &include, &[]));
        assert!(!matches_filters("image.png", &include, &[]));
        assert!(!matches_filters("secret.txt", &include, &exclude));
        assert!(matches_filters("anything", &[], &[]));
        assert!(matches_filters("dir/file.rs", &[], &exclude));
    }

    #[test]
    fn test_name_codec_labels() {
        assert!(name_codec(None).unwrap().is_utf8());
        assert!(!name_codec(Some("shift_jis")).unwrap().is_utf8());
        assert!(name_codec(Some("no-such-charset")).is_err());
    }

    #[test]
    fn test_unix_time() {
        assert_eq!(unix_time(None), None);
        assert_eq!(unix_time(Some(UNIX_EPOCH)), Some(0));
    }
}
