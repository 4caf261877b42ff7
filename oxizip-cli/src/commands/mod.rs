//! Command implementations for OxiZip CLI.

pub mod create;
pub mod extract;
pub mod info;
pub mod list;
pub mod test;

pub use create::{CreateOptions, cmd_create};
pub use extract::{ExtractOptions, cmd_extract};
pub use info::cmd_info;
pub use list::{ListOptions, cmd_list};
pub use test::cmd_test;

use oxizip_archive::ArchiveFormat;
use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;

/// Open an archive and detect its format from the magic bytes.
pub(crate) fn open_detected(
    archive: &Path,
) -> Result<(ArchiveFormat, BufReader<File>), Box<dyn std::error::Error>> {
    let file = File::open(archive)?;
    let mut reader = BufReader::new(file);
    let (format, _magic) = ArchiveFormat::detect(&mut reader)?;
    reader.seek(SeekFrom::Start(0))?;

    if format == ArchiveFormat::Unknown {
        return Err(format!("{}: not a ZIP or GZIP file", archive.display()).into());
    }
    Ok((format, reader))
}
