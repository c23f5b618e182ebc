//! Extract command implementation.

use crate::utils::{create_progress_bar, is_requested, matches_filters, read_options, resolve_password};
use filetime::FileTime;
use log::debug;
use oxizip_archive::zip::{ZipArchive, sanitize_entry_path};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Options for extracting archive contents.
pub struct ExtractOptions<'a> {
    pub files: &'a [String],
    pub include: &'a [String],
    pub exclude: &'a [String],
    pub password: Option<String>,
    pub overwrite: bool,
    pub code_page: Option<&'a str>,
    pub verbose: bool,
    pub progress: bool,
}

pub fn cmd_extract(
    archive: &Path,
    output: &Path,
    options: ExtractOptions<'_>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut zip = ZipArchive::open(archive, read_options(options.code_page)?)?;

    let mut selected = Vec::new();
    for entry in zip.entries() {
        let name = entry.name();
        if !is_requested(name, options.files) || !matches_filters(name, options.include, options.exclude) {
            continue;
        }
        // Every target is checked before the first byte is written.
        let target = output.join(sanitize_entry_path(name)?);
        selected.push((name.to_string(), target, entry.is_directory(), entry.modified()));
    }
    let password = resolve_password(
        options.password,
        zip.entries().iter().filter(|e| selected.iter().any(|(name, ..)| name == e.name())),
    )?;

    println!("Extracting {} to {}", archive.display(), output.display());
    let pb = create_progress_bar(selected.len() as u64, options.progress);
    pb.set_message("files");

    for (name, target, is_directory, modified) in &selected {
        if *is_directory {
            fs::create_dir_all(target)?;
            if options.verbose {
                pb.println(format!("  Created: {}", name));
            }
            pb.inc(1);
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if target.exists() && !options.overwrite {
            return Err(format!("{} already exists (use --overwrite to replace it)", target.display()).into());
        }

        let mut writer = BufWriter::new(File::create(target)?);
        let written = match zip
            .extract_to(name, &mut writer, password.as_deref())
            .and_then(|n| writer.flush().map(|_| n).map_err(Into::into))
        {
            Ok(written) => written,
            Err(e) => {
                drop(writer);
                let _ = fs::remove_file(target);
                return Err(e.into());
            }
        };
        drop(writer);

        let mtime = FileTime::from_system_time(modified.to_system_time());
        if let Err(e) = filetime::set_file_mtime(target, mtime) {
            debug!("could not set mtime of {}: {}", target.display(), e);
        }
        if options.verbose {
            pb.println(format!("  Extracted: {} ({} bytes)", name, written));
        }
        pb.inc(1);
    }
    pb.finish_with_message("Done");
    println!("{} entries extracted", selected.len());
    Ok(())
}

/// Extract a single entry to stdout.
pub fn cmd_cat(
    archive: &Path,
    name: &str,
    password: Option<String>,
    code_page: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut zip = ZipArchive::open(archive, read_options(code_page)?)?;
    let password = resolve_password(password, zip.entry(name))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    zip.extract_to(name, &mut out, password.as_deref())?;
    out.flush()?;
    Ok(())
}
