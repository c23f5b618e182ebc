//! Create command implementation.

use crate::utils::{create_progress_bar, encoding};
use clap::ValueEnum;
use log::info;
use oxizip_archive::zip::{WriteOptions, Zip64Policy, ZipArchive};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

/// Compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum CompressionLevel {
    /// Store without compression
    Store,
    /// Fast compression
    Fast,
    /// Normal compression (default)
    #[default]
    Normal,
    /// Best compression
    Best,
}

impl CompressionLevel {
    fn deflate_level(self) -> oxizip_core::CompressionLevel {
        match self {
            Self::Store => oxizip_core::CompressionLevel::NONE,
            Self::Fast => oxizip_core::CompressionLevel::FAST,
            Self::Normal => oxizip_core::CompressionLevel::DEFAULT,
            Self::Best => oxizip_core::CompressionLevel::BEST,
        }
    }
}

/// When to write Zip64 records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum Zip64Mode {
    /// Fail if the archive needs them
    Never,
    /// Always
    Always,
    /// Only where a value does not fit (default)
    #[default]
    AsNecessary,
}

impl From<Zip64Mode> for Zip64Policy {
    fn from(mode: Zip64Mode) -> Self {
        match mode {
            Zip64Mode::Never => Zip64Policy::Never,
            Zip64Mode::Always => Zip64Policy::Always,
            Zip64Mode::AsNecessary => Zip64Policy::AsNecessary,
        }
    }
}

/// Options for creating or extending an archive.
pub struct CreateOptions<'a> {
    pub compression: CompressionLevel,
    pub zip64: Zip64Mode,
    pub password: Option<String>,
    pub comment: Option<String>,
    pub code_page: Option<&'a str>,
    pub directory: Option<&'a str>,
    pub update: bool,
    pub verbose: bool,
    pub progress: bool,
}

/// Create an archive, or add to an existing one when `update` is set.
pub fn cmd_create(
    archive: &Path,
    files: &[PathBuf],
    options: CreateOptions<'_>,
) -> Result<(), Box<dyn std::error::Error>> {
    let write_options = WriteOptions::new()
        .with_zip64(options.zip64.into())
        .with_force_no_compression(options.compression == CompressionLevel::Store)
        .with_level(options.compression.deflate_level())
        .with_encoding(encoding(options.code_page)?);

    let mut zip = if options.update && archive.exists() {
        let mut zip = ZipArchive::open(archive, crate::utils::read_options(options.code_page)?)?;
        zip.set_options(write_options);
        zip
    } else {
        ZipArchive::with_options(write_options)
    };

    println!("Creating {}", archive.display());
    for path in files {
        if path.is_dir() {
            let first = zip.len();
            zip.add_directory_tree(path, options.directory)?;
            apply_password(&mut zip, first, options.password.as_deref())?;
        } else {
            let entry = if options.update && zip.entry(&entry_name(path, options.directory)).is_some() {
                zip.update_file(path, options.directory)?
            } else {
                zip.add_file(path, options.directory)?
            };
            entry.set_password(options.password.as_deref())?;
        }
        if options.verbose {
            println!("  Added: {}", path.display());
        }
    }
    if let Some(comment) = options.comment {
        zip.set_comment(Some(comment));
    }

    let pb = create_progress_bar(zip.len() as u64, options.progress);
    pb.set_message("entries");
    zip.save_with_progress(archive, |progress| {
        pb.set_position(progress.index as u64);
        if options.verbose {
            pb.println(format!("  Writing: {}", progress.name));
        }
        ControlFlow::Continue(())
    })?;
    pb.finish_with_message("Done");

    let size = std::fs::metadata(archive)?.len();
    info!("wrote {} entries, {} bytes", zip.len(), size);
    println!("Created {} ({} entries, {} bytes)", archive.display(), zip.len(), size);
    Ok(())
}

/// Name `add_file` will give `path`.
fn entry_name(path: &Path, directory: Option<&str>) -> String {
    match (directory, path.file_name()) {
        (Some(dir), Some(name)) => format!("{}/{}", dir, name.to_string_lossy()),
        _ => path.to_string_lossy().into_owned(),
    }
}

fn apply_password(zip: &mut ZipArchive, first: usize, password: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    if password.is_none() {
        return Ok(());
    }
    let names: Vec<String> = zip.entries()[first..]
        .iter()
        .filter(|e| !e.is_directory())
        .map(|e| e.name().to_string())
        .collect();
    for name in names {
        if let Some(entry) = zip.entry_mut(&name) {
            entry.set_password(password)?;
        }
    }
    Ok(())
}
