//! OxiZip CLI - ZIP and GZIP archive utility
//!
//! Lists, extracts, tests and creates ZIP archives and GZIP files.

mod commands;
mod utils;

use clap::{Parser, Subcommand};
use commands::{CreateOptions, ExtractOptions, ListOptions};
use log::{LevelFilter, Log, Metadata, Record};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oxizip")]
#[command(author, version, about = "ZIP and GZIP archive utility")]
#[command(long_about = "
OxiZip reads and writes ZIP archives (including ZIP64) and GZIP files.

Examples:
  oxizip list archive.zip
  oxizip list --stream --json archive.zip
  oxizip extract archive.zip -o out/
  oxizip extract data.txt.gz
  oxizip create archive.zip file1.txt dir/
  oxizip create -l 9 data.txt.gz data.txt
  oxizip test archive.zip
  oxizip info archive.zip
")]
struct Cli {
    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List contents of an archive
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Show sizes, methods and checksums
        #[arg(short, long)]
        long: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Read local headers sequentially instead of the central directory
        #[arg(short, long)]
        stream: bool,

        /// Include only files matching pattern (glob syntax: *.txt, src/**/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude files matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Charset of entry names without the UTF-8 flag (e.g. shift_jis)
        #[arg(long)]
        charset: Option<String>,
    },

    /// Extract files from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Files to extract (all if empty)
        files: Vec<String>,

        /// Include only files matching pattern (glob syntax: *.txt, src/**/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude files matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,

        /// Charset of entry names without the UTF-8 flag
        #[arg(long)]
        charset: Option<String>,
    },

    /// Test archive integrity
    #[command(alias = "t")]
    Test {
        /// Archive file to test
        archive: PathBuf,

        /// Charset of entry names without the UTF-8 flag
        #[arg(long)]
        charset: Option<String>,
    },

    /// Create a new archive (ZIP or GZIP, chosen by extension)
    #[command(alias = "c")]
    Create {
        /// Output archive file
        archive: PathBuf,

        /// Files to add to the archive
        files: Vec<PathBuf>,

        /// Compression level (0-9)
        #[arg(short, long, default_value_t = 6, value_parser = clap::value_parser!(u8).range(0..=9))]
        level: u8,

        /// Store entries without compression
        #[arg(long)]
        store: bool,

        /// Archive comment
        #[arg(long)]
        comment: Option<String>,

        /// Charset for entry names (UTF-8 sets the language encoding flag)
        #[arg(long)]
        charset: Option<String>,
    },

    /// Show information about an archive
    #[command(alias = "i")]
    Info {
        /// Archive file to inspect
        archive: PathBuf,

        /// Charset of entry names without the UTF-8 flag
        #[arg(long)]
        charset: Option<String>,
    },
}

/// Writes log records to stderr.
struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, 2) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    let logger: &'static StderrLogger = Box::leak(Box::new(StderrLogger { level }));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let verbose = cli.verbose > 0;

    let result = match cli.command {
        Commands::List {
            archive,
            long,
            json,
            stream,
            include,
            exclude,
            charset,
        } => commands::cmd_list(
            &archive,
            &ListOptions {
                long,
                json,
                stream,
                include: &include,
                exclude: &exclude,
                charset: charset.as_deref(),
            },
        ),
        Commands::Extract {
            archive,
            output,
            files,
            include,
            exclude,
            no_progress,
            charset,
        } => commands::cmd_extract(
            &archive,
            &ExtractOptions {
                output: &output,
                files: &files,
                include: &include,
                exclude: &exclude,
                verbose,
                progress: !no_progress && !cli.quiet,
                charset: charset.as_deref(),
            },
        ),
        Commands::Test { archive, charset } => {
            commands::cmd_test(&archive, verbose, charset.as_deref())
        }
        Commands::Create {
            archive,
            files,
            level,
            store,
            comment,
            charset,
        } => commands::cmd_create(
            &archive,
            &files,
            &CreateOptions {
                level,
                store,
                comment: comment.as_deref(),
                charset: charset.as_deref(),
                verbose,
            },
        ),
        Commands::Info { archive, charset } => commands::cmd_info(&archive, charset.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
