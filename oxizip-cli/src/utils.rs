//! Utility functions for the CLI.

use dialoguer::Password;
use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use oxizip_archive::zip::{ReadOptions, TextEncoding, ZipEntry};
use std::io::IsTerminal;

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Check if a name matches the filter patterns.
/// - If include patterns are specified, the name must match at least one
/// - If exclude patterns are specified, the name must not match any
pub fn matches_filters(name: &str, include: &[String], exclude: &[String]) -> bool {
    let matches = |pattern: &String| Pattern::new(pattern).is_ok_and(|p| p.matches(name));
    if exclude.iter().any(matches) {
        return false;
    }
    include.is_empty() || include.iter().any(matches)
}

/// True if `name` was requested explicitly, or lies below a requested
/// directory. An empty request selects everything.
pub fn is_requested(name: &str, files: &[String]) -> bool {
    files.is_empty()
        || files.iter().any(|f| {
            let f = f.trim_end_matches('/');
            name == f || name.trim_end_matches('/') == f || name.starts_with(&format!("{}/", f))
        })
}

/// Read options for an optional `--code-page` value.
pub fn read_options(code_page: Option<&str>) -> Result<ReadOptions, Box<dyn std::error::Error>> {
    Ok(ReadOptions::new().with_encoding(encoding(code_page)?))
}

/// Resolve a `--code-page` value.
pub fn encoding(code_page: Option<&str>) -> Result<TextEncoding, Box<dyn std::error::Error>> {
    match code_page {
        None => Ok(TextEncoding::default()),
        Some(label) => TextEncoding::from_label(label).ok_or_else(|| format!("unknown code page '{}'", label).into()),
    }
}

/// Use the given password, or ask for one when `entries` contains an
/// encrypted entry and stdin is a terminal.
pub fn resolve_password<'a>(
    password: Option<String>,
    entries: impl IntoIterator<Item = &'a ZipEntry>,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    if password.is_some() {
        return Ok(password);
    }
    let encrypted = entries.into_iter().any(|e| e.is_encrypted());
    if !encrypted || !std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let entered = Password::new().with_prompt("Password").interact()?;
    Ok(Some(entered))
}

/// Print entries in a formatted table.
pub fn print_entries(entries: &[&ZipEntry], verbose: bool) {
    if !verbose {
        for entry in entries {
            println!("{}", entry.name());
        }
        return;
    }

    println!(
        "{:>10} {:>10} {:>6} {:>8} {:>8}  {:<16}  Name",
        "Size", "Compressed", "Ratio", "Method", "CRC-32", "Modified",
    );
    println!("{}", "-".repeat(78));

    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    for entry in entries {
        let ratio = if entry.uncompressed_size() > 0 {
            format!("{:.1}%", entry.compression_ratio())
        } else {
            "-".to_string()
        };
        let marker = match (entry.is_directory(), entry.is_encrypted()) {
            (true, _) => "d ",
            (false, true) => "* ",
            _ => "  ",
        };
        let modified = entry.modified();
        println!(
            "{:>10} {:>10} {:>6} {:>8} {:08x}  {:04}-{:02}-{:02} {:02}:{:02}  {}{}",
            entry.uncompressed_size(),
            entry.compressed_size(),
            ratio,
            entry.method().to_string(),
            entry.crc32(),
            modified.year,
            modified.month,
            modified.day,
            modified.hour,
            modified.minute,
            marker,
            entry.name()
        );
        if let Some(comment) = entry.comment() {
            println!("{:>62}{}", "", comment);
        }
        total_size += entry.uncompressed_size();
        total_compressed += entry.compressed_size();
    }

    println!("{}", "-".repeat(78));
    let total_ratio = if total_size > 0 {
        (1.0 - total_compressed as f64 / total_size as f64) * 100.0
    } else {
        0.0
    };
    println!(
        "{:>10} {:>10} {:>5.1}%  {} entries",
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
    fn test_filters() {
        let include = vec!["*.txt".to_string()];
        let exclude = vec!["secret*".to_string()];
        assert!(matches_filters("notes.txt", &include, &exclude));
        assert!(!matches_filters("secret.txt", &include, &exclude));
        assert!(!matches_filters("image.png", &include, &exclude));
        assert!(matches_filters("image.png", &[], &[]));
    }

    #[test]
    fn test_requested_names() {
        let files = vec!["docs".to_string()];
        assert!(is_requested("docs/", &files));
        assert!(is_requested("docs/a.txt", &files));
        assert!(!is_requested("docsx/a.txt", &files));
        assert!(is_requested("anything", &[]));
    }

    #[test]
    fn test_code_page_labels() {
        assert!(encoding(Some("932")).is_ok());
        assert!(encoding(Some("utf-8")).is_ok());
        assert!(encoding(Some("klingon")).is_err());
    }
}
