//! Comment command implementation.

use crate::utils::read_options;
use oxizip_archive::zip::ZipArchive;
use std::path::Path;

/// Show or change the archive comment, or an entry's comment when `entry`
/// is given. `clear` removes it.
pub fn cmd_comment(
    archive: &Path,
    entry: Option<&str>,
    text: Option<String>,
    clear: bool,
    code_page: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut zip = ZipArchive::open(archive, read_options(code_page)?)?;
    let new_comment = match (text, clear) {
        (_, true) => Some(None),
        (Some(text), false) => Some(Some(text)),
        (None, false) => None,
    };

    let Some(comment) = new_comment else {
        let current = match entry {
            Some(name) => zip
                .entry(name)
                .ok_or_else(|| format!("no entry named '{}'", name))?
                .comment(),
            None => zip.comment(),
        };
        if let Some(current) = current {
            println!("{}", current);
        }
        return Ok(());
    };

    match entry {
        Some(name) => zip
            .entry_mut(name)
            .ok_or_else(|| format!("no entry named '{}'", name))?
            .set_comment(comment),
        None => zip.set_comment(comment),
    }
    zip.save(archive)?;
    Ok(())
}
