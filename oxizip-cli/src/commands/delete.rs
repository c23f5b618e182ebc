//! Delete command implementation.

use crate::utils::read_options;
use oxizip_archive::zip::ZipArchive;
use std::path::Path;

pub fn cmd_delete(
    archive: &Path,
    names: &[String],
    code_page: Option<&str>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut zip = ZipArchive::open(archive, read_options(code_page)?)?;
    for name in names {
        let removed = zip.remove(name)?;
        if verbose {
            println!("  Deleted: {}", removed.name());
        }
    }
    zip.save(archive)?;
    println!("Deleted {} entries from {}", names.len(), archive.display());
    Ok(())
}
