//! OxiZip CLI - The Oxidized ZIP tool
//!
//! A Pure Rust ZIP utility: list, extract, create, test and edit archives,
//! with traditional encryption, Zip64 and legacy code pages.

mod commands;
mod utils;

use clap::{Parser, Subcommand};
use commands::{
    CompressionLevel, CreateOptions, ExtractOptions, ListOptions, Zip64Mode, cmd_cat, cmd_comment, cmd_create,
    cmd_delete, cmd_extract, cmd_list, cmd_test,
};
use oxizip_core::error::OxiZipError;
use std::path::PathBuf;

/// Exit status for a wrong password, so scripts can prompt again.
const EXIT_BAD_PASSWORD: i32 = 2;

#[derive(Parser)]
#[command(name = "oxizip")]
#[command(author, version, about = "The Oxidized ZIP tool - Pure Rust ZIP utility")]
#[command(long_about = "
OxiZip is a Pure Rust implementation of the ZIP archive format with
DEFLATE, traditional encryption and Zip64.

Examples:
  oxizip list archive.zip
  oxizip list --json archive.zip
  oxizip extract archive.zip -o out
  oxizip extract archive.zip --password secret --overwrite
  oxizip create archive.zip file1.txt src/
  oxizip create archive.zip big.iso --zip64 always
  oxizip test archive.zip
  oxizip delete archive.zip old.txt
  oxizip comment archive.zip \"release 1.2\"
")]
struct Cli {
    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

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

        /// Show sizes, method, CRC and timestamps
        #[arg(short, long)]
        verbose: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,

        /// Include only entries matching pattern (glob syntax: *.txt, src/**/*)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Code page for names without the UTF-8 flag (437, 932, cp1252, ...)
        #[arg(long)]
        code_page: Option<String>,
    },

    /// Extract files from an archive
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Entries to extract (all if empty)
        files: Vec<String>,

        /// Include only entries matching pattern (glob syntax)
        #[arg(short = 'I', long)]
        include: Vec<String>,

        /// Exclude entries matching pattern (glob syntax)
        #[arg(short = 'X', long)]
        exclude: Vec<String>,

        /// Password for encrypted entries (prompted for when omitted)
        #[arg(short, long)]
        password: Option<String>,

        /// Replace existing files
        #[arg(long)]
        overwrite: bool,

        /// Code page for names without the UTF-8 flag
        #[arg(long)]
        code_page: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Show progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Write one entry to standard output
    Cat {
        /// Archive file
        archive: PathBuf,

        /// Entry name
        name: String,

        /// Password for an encrypted entry
        #[arg(short, long)]
        password: Option<String>,

        /// Code page for names without the UTF-8 flag
        #[arg(long)]
        code_page: Option<String>,
    },

    /// Test archive integrity
    #[command(alias = "t")]
    Test {
        /// Archive file to test
        archive: PathBuf,

        /// Password for encrypted entries
        #[arg(short, long)]
        password: Option<String>,

        /// Code page for names without the UTF-8 flag
        #[arg(long)]
        code_page: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Create a new archive
    #[command(alias = "c")]
    Create {
        /// Output archive file
        archive: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Compression level
        #[arg(short = 'l', long, value_enum, default_value = "normal")]
        compression: CompressionLevel,

        /// Zip64 policy
        #[arg(long, value_enum, default_value = "as-necessary")]
        zip64: Zip64Mode,

        /// Encrypt entries with this password
        #[arg(short, long)]
        password: Option<String>,

        /// Archive comment
        #[arg(long)]
        comment: Option<String>,

        /// Code page for names that are not plain ASCII
        #[arg(long)]
        code_page: Option<String>,

        /// Directory inside the archive to place the files in
        #[arg(short = 'd', long)]
        directory: Option<String>,

        /// Add to an existing archive, replacing entries of the same name
        #[arg(short, long)]
        update: bool,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Show progress bar
        #[arg(short = 'P', long)]
        progress: bool,
    },

    /// Remove entries from an archive
    #[command(alias = "d")]
    Delete {
        /// Archive file
        archive: PathBuf,

        /// Entries to remove
        #[arg(required = true)]
        names: Vec<String>,

        /// Code page for names without the UTF-8 flag
        #[arg(long)]
        code_page: Option<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show or set the archive comment, or an entry's comment
    Comment {
        /// Archive file
        archive: PathBuf,

        /// New comment (shows the current one if omitted)
        text: Option<String>,

        /// Entry whose comment to show or set
        #[arg(short, long)]
        entry: Option<String>,

        /// Remove the comment
        #[arg(long, conflicts_with = "text")]
        clear: bool,

        /// Code page for names without the UTF-8 flag
        #[arg(long)]
        code_page: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let result = match cli.command {
        Commands::List {
            archive,
            verbose,
            json,
            include,
            exclude,
            code_page,
        } => cmd_list(
            &archive,
            &ListOptions {
                verbose,
                json,
                include: &include,
                exclude: &exclude,
                code_page: code_page.as_deref(),
            },
        ),
        Commands::Extract {
            archive,
            output,
            files,
            include,
            exclude,
            password,
            overwrite,
            code_page,
            verbose,
            progress,
        } => cmd_extract(
            &archive,
            &output,
            ExtractOptions {
                files: &files,
                include: &include,
                exclude: &exclude,
                password,
                overwrite,
                code_page: code_page.as_deref(),
                verbose,
                progress,
            },
        ),
        Commands::Cat {
            archive,
            name,
            password,
            code_page,
        } => cmd_cat(&archive, &name, password, code_page.as_deref()),
        Commands::Test {
            archive,
            password,
            code_page,
            verbose,
        } => cmd_test(&archive, password, code_page.as_deref(), verbose),
        Commands::Create {
            archive,
            files,
            compression,
            zip64,
            password,
            comment,
            code_page,
            directory,
            update,
            verbose,
            progress,
        } => cmd_create(
            &archive,
            &files,
            CreateOptions {
                compression,
                zip64,
                password,
                comment,
                code_page: code_page.as_deref(),
                directory: directory.as_deref(),
                update,
                verbose,
                progress,
            },
        ),
        Commands::Delete {
            archive,
            names,
            code_page,
            verbose,
        } => cmd_delete(&archive, &names, code_page.as_deref(), verbose),
        Commands::Comment {
            archive,
            text,
            entry,
            clear,
            code_page,
        } => cmd_comment(&archive, entry.as_deref(), text, clear, code_page.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(e.as_ref()));
    }
}

fn exit_code(error: &(dyn std::error::Error + 'static)) -> i32 {
    match error.downcast_ref::<OxiZipError>() {
        Some(e) if e.is_bad_password() => EXIT_BAD_PASSWORD,
        _ => 1,
    }
}
