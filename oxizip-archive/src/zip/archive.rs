//! The archive model.
//!
//! A [`ZipArchive`] holds an ordered list of entries and, in lockstep, the
//! central directory slot of each one. Adding entries is cheap: sources are
//! only read when the archive is saved. Saving writes a complete new
//! archive to a temporary file next to the target and then moves it into
//! place, so a failed save never damages the previous file.
//!
//! # Example
//!
//! ```rust,no_run
//! use oxizip_archive::zip::{ReadOptions, ZipArchive};
//!
//! let mut archive = ZipArchive::new();
//! archive.add_bytes("hello.txt", b"Hello, World!".to_vec())?;
//! archive.add_directory("empty/")?;
//! archive.save("hello.zip")?;
//!
//! let mut archive = ZipArchive::open("hello.zip", ReadOptions::default())?;
//! assert_eq!(archive.extract("hello.txt", None)?, b"Hello, World!");
//! # Ok::<(), oxizip_core::error::OxiZipError>(())
//! ```

use crate::zip::datetime::DosDateTime;
use crate::zip::encoding::TextEncoding;
use crate::zip::entry::{CountingWriter, EntryPhase, ReadSeek, WriteContext, WrittenEntry, ZipEntry};
use crate::zip::header::{
    CENTRAL_DIR_HEADER_SIG, CentralDirectoryHeader, DataDescriptor, EndOfCentralDirectory,
    FLAG_UTF8, LocalFileHeader, Signature, Zip64EndOfCentralDirectory, Zip64Locator,
};
use crate::zip::options::{ExtractOptions, ReadOptions, SaveProgress, WriteOptions, Zip64Policy};
use log::{debug, info, trace, warn};
use oxizip_core::crc::Crc32;
use oxizip_core::error::{OxiZipError, Result};
use std::collections::hash_map::RandomState;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::hash::{BuildHasher, Hasher};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const EXTRACT_BUFFER_SIZE: usize = 64 * 1024;

/// Save state of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    /// Newly created, nothing added yet.
    Empty,
    /// Changed since it was last read or saved.
    Dirty,
    /// Matches what was last read or saved.
    Clean,
}

/// Central directory slot of an entry. Entries added since the last read
/// or save have no record yet.
#[derive(Debug, Clone)]
struct DirectorySlot {
    name: String,
    header: Option<CentralDirectoryHeader>,
}

/// Everything a successful write produced, applied once it is committed.
struct SavedLayout {
    entries: Vec<WrittenEntry>,
    headers: Vec<CentralDirectoryHeader>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadPhase {
    LocalEntries,
    CentralDirectory,
    Footer,
    Done,
}

/// An in-memory ZIP archive, optionally backed by a file or stream.
pub struct ZipArchive {
    entries: Vec<ZipEntry>,
    directory: Vec<DirectorySlot>,
    comment: Option<String>,
    options: WriteOptions,
    state: ArchiveState,
    path: Option<PathBuf>,
    backing: Option<Box<dyn ReadSeek>>,
    synced_to_path: bool,
}

impl fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipArchive")
            .field("entries", &self.entries.len())
            .field("state", &self.state)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Default for ZipArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl ZipArchive {
    /// Create an empty archive with default options.
    pub fn new() -> Self {
        Self::with_options(WriteOptions::default())
    }

    /// Create an empty archive.
    pub fn with_options(options: WriteOptions) -> Self {
        Self {
            entries: Vec::new(),
            directory: Vec::new(),
            comment: None,
            options,
            state: ArchiveState::Empty,
            path: None,
            backing: None,
            synced_to_path: false,
        }
    }

    /// Open an archive file. The file stays open as the source for
    /// extraction and for entries copied by later saves.
    pub fn open(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("opening {}", path.display());
        let file = File::open(path)?;
        let mut archive = Self::load(Box::new(BufReader::new(file)), options)?;
        archive.path = Some(path.to_path_buf());
        archive.synced_to_path = true;
        Ok(archive)
    }

    /// Read an archive from a seekable stream.
    pub fn read<R: Read + Seek + 'static>(reader: R, options: ReadOptions) -> Result<Self> {
        Self::load(Box::new(reader), options)
    }

    fn load(mut backing: Box<dyn ReadSeek>, options: ReadOptions) -> Result<Self> {
        let encoding = options.encoding;
        let (mut entries, headers, footer) = read_records(backing.as_mut(), encoding)?;

        let mut by_name = HashMap::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if by_name.insert(entry.name.clone(), index).is_some() {
                return Err(OxiZipError::duplicate_entry(entry.name.clone()));
            }
        }

        let mut linked = vec![false; entries.len()];
        let mut directory = Vec::with_capacity(headers.len());
        for header in headers {
            let utf8 = header.flags & FLAG_UTF8 != 0;
            let name = encoding.decode(&header.name, utf8);
            let Some(&index) = by_name.get(&name) else {
                return Err(OxiZipError::orphaned(name, "the central directory"));
            };
            if linked[index] {
                return Err(OxiZipError::duplicate_entry(name));
            }

            let entry = &mut entries[index];
            if header.crc32 != entry.crc32 || header.compressed_size != entry.compressed_size {
                return Err(OxiZipError::corrupted(
                    entry.header_offset,
                    format!("central directory record of '{}' disagrees with its local header", name),
                ));
            }
            if header.header_offset != entry.header_offset {
                warn!(
                    "'{}': central directory points to offset {}, local header found at {}",
                    name, header.header_offset, entry.header_offset
                );
            }
            entry.link_central(&header, encoding.decode(&header.comment, utf8));
            linked[index] = true;
            directory.push(DirectorySlot {
                name,
                header: Some(header),
            });
        }
        if let Some(index) = linked.iter().position(|linked| !linked) {
            return Err(OxiZipError::orphaned(
                entries[index].name.clone(),
                "the local headers",
            ));
        }
        if footer.total_entries != directory.len() as u64 {
            warn!(
                "end of central directory counts {} entries, found {}",
                footer.total_entries,
                directory.len()
            );
        }

        let comment = encoding.decode(&footer.comment, false);
        debug!("read {} entries", entries.len());
        Ok(Self {
            entries,
            directory,
            comment: (!comment.is_empty()).then_some(comment),
            options: WriteOptions::default().with_encoding(encoding),
            state: ArchiveState::Clean,
            path: None,
            backing: Some(backing),
            synced_to_path: false,
        })
    }

    /// Save state.
    pub fn state(&self) -> ArchiveState {
        self.state
    }

    /// Path of the backing file, if the archive was opened or saved.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Options used by the next save.
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Replace the save options. The archive becomes dirty so the next
    /// save applies them.
    pub fn set_options(&mut self, options: WriteOptions) {
        self.options = options;
        self.mark_dirty();
    }

    /// Archive comment.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Set or clear the archive comment.
    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment.filter(|c| !c.is_empty());
        self.mark_dirty();
    }

    /// Entries in archive order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by name. Backslashes and a leading `./` are
    /// accepted, and a directory may be named without its trailing slash.
    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.index_of(name).map(|index| &self.entries[index])
    }

    /// Look up an entry for modification. The archive becomes dirty.
    pub fn entry_mut(&mut self, name: &str) -> Option<&mut ZipEntry> {
        let index = self.index_of(name)?;
        self.mark_dirty();
        Some(&mut self.entries[index])
    }

    /// The central directory record last read or written for an entry.
    pub fn directory_record(&self, name: &str) -> Option<&CentralDirectoryHeader> {
        let key = self.resolve(name)?;
        self.directory
            .iter()
            .find(|slot| slot.name == key)
            .and_then(|slot| slot.header.as_ref())
    }

    /// Add a file or, for a directory path, a directory marker.
    ///
    /// With `archive_dir` the entry is named `archive_dir/<file name>`;
    /// without it the path itself becomes the name. The source is only
    /// checked for existence here and is read when the archive is saved.
    pub fn add_file(&mut self, path: impl AsRef<Path>, archive_dir: Option<&str>) -> Result<&mut ZipEntry> {
        let entry = self.entry_for_path(path.as_ref(), archive_dir)?;
        self.push(entry)
    }

    /// Add a directory and everything below it. Returns the number of
    /// entries added. Nothing is added if any name collides.
    pub fn add_directory_tree(&mut self, path: impl AsRef<Path>, archive_dir: Option<&str>) -> Result<usize> {
        let root = path.as_ref();
        let metadata = source_metadata(root)?;
        if !metadata.is_dir() {
            self.add_file(root, archive_dir)?;
            return Ok(1);
        }

        let base = match archive_dir {
            Some(dir) => dir.to_string(),
            None => root.to_string_lossy().into_owned(),
        };
        let mut pending = Vec::new();
        // The root itself has no marker when it maps to the archive root.
        if let Ok(marker) = self.entry_from_metadata(root, &base, &metadata) {
            pending.push(marker);
        }
        self.collect_tree(root, &base, &mut pending)?;

        let mut seen: HashSet<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        for entry in &pending {
            if !seen.insert(entry.name.as_str()) {
                return Err(OxiZipError::duplicate_entry(entry.name.clone()));
            }
        }

        let added = pending.len();
        for entry in pending {
            self.push_unchecked(entry);
        }
        info!("added {} entries from {}", added, root.display());
        Ok(added)
    }

    /// Add an entry from an in-memory buffer.
    pub fn add_bytes(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<&mut ZipEntry> {
        let name = normalize_name(name, self.options.trim_volume_letter, false)?;
        self.push(ZipEntry::from_bytes(name, data.into(), DosDateTime::now()))
    }

    /// Add a directory marker.
    pub fn add_directory(&mut self, name: &str) -> Result<&mut ZipEntry> {
        let name = normalize_name(name, self.options.trim_volume_letter, true)?;
        self.push(ZipEntry::directory(name, DosDateTime::now()))
    }

    /// Remove an entry and its directory slot.
    ///
    /// An entry tracked in only one of the two lists is reported as an
    /// inconsistency and nothing is removed.
    pub fn remove(&mut self, name: &str) -> Result<ZipEntry> {
        let Some(key) = self.resolve(name) else {
            return Err(OxiZipError::entry_not_found(name));
        };
        let entry_pos = self.entries.iter().position(|e| e.name == key);
        let slot_pos = self.directory.iter().position(|s| s.name == key);
        match (entry_pos, slot_pos) {
            (Some(entry_pos), Some(slot_pos)) => {
                self.directory.remove(slot_pos);
                let removed = self.entries.remove(entry_pos);
                debug!("removed '{}'", key);
                self.mark_dirty();
                Ok(removed)
            }
            _ => Err(OxiZipError::inconsistent(format!(
                "'{}' is tracked in only one of the entry and directory lists",
                key
            ))),
        }
    }

    /// Replace a file entry's content with a buffer: remove, then add under
    /// the same name. Fails without changes if the entry does not exist or
    /// is a directory.
    pub fn update_bytes(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<&mut ZipEntry> {
        let Some(index) = self.index_of(name) else {
            return Err(OxiZipError::entry_not_found(name));
        };
        if self.entries[index].is_directory() {
            return Err(OxiZipError::inconsistent(format!(
                "'{}' is a directory and has no content to replace",
                self.entries[index].name
            )));
        }
        let removed = self.remove(name)?;
        self.add_bytes(&removed.name, data)
    }

    /// Replace an entry with a file from disk: remove, then add. The
    /// source is checked before anything is removed.
    pub fn update_file(&mut self, path: impl AsRef<Path>, archive_dir: Option<&str>) -> Result<&mut ZipEntry> {
        let entry = self.entry_for_path(path.as_ref(), archive_dir)?;
        self.remove(&entry.name)?;
        self.push(entry)
    }

    /// Name-indexed slot assignment. Only removal (`None`) is allowed.
    pub fn set_entry(&mut self, name: &str, value: Option<ZipEntry>) -> Result<()> {
        match value {
            None => self.remove(name).map(|_| ()),
            Some(_) => Err(OxiZipError::inconsistent(format!(
                "entry '{}' can only be removed through its slot; use update_* to replace it",
                name
            ))),
        }
    }

    /// Save to a file.
    ///
    /// Does nothing when the archive is unchanged since it was read from
    /// or saved to the same path.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.save_with_progress(path, |_| ControlFlow::Continue(()))
    }

    /// Save to a file, reporting progress before each entry. Returning
    /// `ControlFlow::Break` cancels the save and leaves the target as it
    /// was.
    pub fn save_with_progress<F>(&mut self, path: impl AsRef<Path>, mut progress: F) -> Result<()>
    where
        F: FnMut(&SaveProgress<'_>) -> ControlFlow<()>,
    {
        let target = path.as_ref();
        if self.state == ArchiveState::Clean && self.synced_to_path && self.path.as_deref() == Some(target) {
            debug!("{} is unchanged, skipping save", target.display());
            return Ok(());
        }
        if target.is_dir() {
            return Err(OxiZipError::DestinationIsDirectory {
                path: target.to_path_buf(),
            });
        }
        let temp_dir = match &self.options.temp_dir {
            Some(dir) if !dir.is_dir() => {
                return Err(OxiZipError::TempDirMissing { path: dir.clone() });
            }
            Some(dir) => dir.clone(),
            None => match target.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };

        info!("saving {} entries to {}", self.entries.len(), target.display());
        let mut temp = tempfile::Builder::new()
            .prefix(".oxizip-")
            .suffix(".tmp")
            .tempfile_in(&temp_dir)?;
        let layout = {
            let mut out = BufWriter::new(temp.as_file_mut());
            let layout = self.write_archive(&mut out, false, &mut progress)?;
            out.flush()?;
            layout
        };
        temp.as_file().sync_all()?;

        let replacing = target.exists();
        // Release the read handle before the old file is replaced.
        let previous = self.backing.take();
        if let Err(err) = temp.persist(target) {
            self.backing = previous;
            return Err(err.error.into());
        }
        drop(previous);
        debug!(
            "{} {}",
            if replacing { "replaced" } else { "created" },
            target.display()
        );

        self.commit(layout);
        self.backing = Some(Box::new(BufReader::new(File::open(target)?)));
        self.path = Some(target.to_path_buf());
        self.synced_to_path = true;
        self.state = ArchiveState::Clean;
        Ok(())
    }

    /// Write the archive to a stream that cannot seek.
    ///
    /// CRC and sizes of new entries go to data descriptors after each
    /// payload. Entries keep their current sources, so the archive can be
    /// saved again.
    pub fn save_to_stream<W: Write>(&mut self, writer: W) -> Result<()> {
        info!("streaming {} entries", self.entries.len());
        let mut writer = writer;
        self.write_archive(&mut writer, true, &mut |_: &SaveProgress<'_>| ControlFlow::Continue(()))?;
        writer.flush()?;
        self.state = ArchiveState::Clean;
        self.synced_to_path = false;
        Ok(())
    }

    fn write_archive<W: Write>(
        &mut self,
        out: W,
        streaming: bool,
        progress: &mut dyn FnMut(&SaveProgress<'_>) -> ControlFlow<()>,
    ) -> Result<SavedLayout> {
        let policy = self.options.zip64;
        let ctx = WriteContext {
            options: &self.options,
            streaming,
            seed: header_seed(),
        };
        let mut out = CountingWriter::new(out);
        let total = self.entries.len();

        let mut written = Vec::with_capacity(total);
        for (index, entry) in self.entries.iter().enumerate() {
            let report = SaveProgress {
                index,
                total,
                name: &entry.name,
                bytes_written: out.count(),
            };
            if progress(&report).is_break() {
                info!("save cancelled before '{}'", entry.name);
                return Err(OxiZipError::Cancelled);
            }
            let record = entry.write_to(&mut out, &ctx, &mut self.backing)?;
            debug!(
                "wrote '{}': {} -> {} bytes",
                entry.name, record.uncompressed_size, record.compressed_size
            );
            written.push(record);
        }

        let directory_offset = out.count();
        let mut headers = Vec::with_capacity(total);
        for (entry, record) in self.entries.iter().zip(&written) {
            let mut header = CentralDirectoryHeader::from_local(
                &record.local,
                record.descriptor.as_ref(),
                record.header_offset,
            );
            header.comment = record.comment.clone();
            header.external_attributes = entry.external_attributes;
            header.force_zip64 = policy == Zip64Policy::Always;
            if policy == Zip64Policy::Never && header.needs_zip64() {
                return Err(OxiZipError::inconsistent(format!(
                    "'{}' needs Zip64 but Zip64 is disabled",
                    entry.name
                )));
            }
            header.write(&mut out)?;
            headers.push(header);
        }
        let directory_size = out.count() - directory_offset;

        let comment = match &self.comment {
            Some(comment) => self.options.encoding.encode_unflagged(comment)?.into_owned(),
            None => Vec::new(),
        };
        let count = total as u64;
        let footer = EndOfCentralDirectory {
            disk_number: 0,
            directory_disk: 0,
            entries_on_disk: count,
            total_entries: count,
            directory_size,
            directory_offset,
            comment,
        };
        let zip64 = match policy {
            Zip64Policy::Always => true,
            Zip64Policy::AsNecessary => footer.needs_zip64(),
            Zip64Policy::Never => false,
        };
        if zip64 {
            let record_offset = out.count();
            debug!("writing Zip64 end of central directory at {}", record_offset);
            Zip64EndOfCentralDirectory::new(count, directory_size, directory_offset).write(&mut out)?;
            Zip64Locator::new(record_offset).write(&mut out)?;
        }
        footer.write(&mut out, zip64)?;
        out.flush()?;
        trace!("archive written: {} bytes", out.count());

        Ok(SavedLayout {
            entries: written,
            headers,
        })
    }

    fn commit(&mut self, layout: SavedLayout) {
        for (entry, record) in self.entries.iter_mut().zip(layout.entries) {
            entry.apply_written(record);
        }
        self.directory = self
            .entries
            .iter()
            .zip(layout.headers)
            .map(|(entry, header)| DirectorySlot {
                name: entry.name.clone(),
                header: Some(header),
            })
            .collect();
    }

    /// Extract an entry into memory.
    pub fn extract(&mut self, name: &str, password: Option<&str>) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        self.extract_to(name, &mut data, password)?;
        Ok(data)
    }

    /// Extract an entry into a writer, verifying size and CRC. Returns the
    /// number of bytes written.
    ///
    /// Only the encryption header check reports a bad password. A wrong
    /// password that slips past the check byte surfaces as corrupted data
    /// or a CRC mismatch, the same as damage to the payload.
    pub fn extract_to(&mut self, name: &str, out: &mut dyn Write, password: Option<&str>) -> Result<u64> {
        let index = self
            .index_of(name)
            .ok_or_else(|| OxiZipError::entry_not_found(name))?;
        let entry = &self.entries[index];
        let mut reader = entry.open_reader(&mut self.backing, password)?;

        let mut crc = Crc32::new();
        let mut buffer = vec![0u8; EXTRACT_BUFFER_SIZE];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(from_io(err, entry.header_offset)),
            };
            crc.update(&buffer[..n]);
            out.write_all(&buffer[..n])?;
        }
        drop(reader);

        if entry.phase() == EntryPhase::Serialized {
            if crc.bytes_folded() != entry.uncompressed_size {
                return Err(OxiZipError::corrupted(
                    entry.header_offset,
                    format!(
                        "'{}' extracted to {} bytes, expected {}",
                        entry.name,
                        crc.bytes_folded(),
                        entry.uncompressed_size
                    ),
                ));
            }
            if crc.value() != entry.crc32 {
                return Err(OxiZipError::crc_mismatch(entry.crc32, crc.value()));
            }
        }
        debug!("extracted '{}' ({} bytes)", entry.name, crc.bytes_folded());
        Ok(crc.bytes_folded())
    }

    /// Decompress an entry and verify its CRC without keeping the data.
    pub fn test_entry(&mut self, name: &str, password: Option<&str>) -> Result<()> {
        self.extract_to(name, &mut io::sink(), password).map(|_| ())
    }

    /// Extract every entry below `dir`. Returns the number of entries
    /// extracted.
    ///
    /// All names are checked before anything is written; a name that would
    /// land outside `dir` fails the whole call.
    pub fn extract_all(&mut self, dir: impl AsRef<Path>, options: &ExtractOptions) -> Result<usize> {
        let dir = dir.as_ref();
        let targets = self
            .entries
            .iter()
            .map(|entry| sanitize_entry_path(&entry.name).map(|relative| dir.join(relative)))
            .collect::<Result<Vec<_>>>()?;
        fs::create_dir_all(dir)?;

        for (index, target) in targets.iter().enumerate() {
            let name = self.entries[index].name.clone();
            if self.entries[index].is_directory {
                fs::create_dir_all(target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            if !options.overwrite && target.exists() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists", target.display()),
                )
                .into());
            }

            let mut writer = BufWriter::new(File::create(target)?);
            let result = self
                .extract_to(&name, &mut writer, options.password.as_deref())
                .and_then(|_| writer.flush().map_err(OxiZipError::from));
            if let Err(err) = result {
                drop(writer);
                let _ = fs::remove_file(target);
                return Err(err);
            }
            let file = writer.into_inner().map_err(|err| err.into_error())?;
            file.set_modified(self.entries[index].modified.to_system_time())?;
        }
        info!("extracted {} entries to {}", targets.len(), dir.display());
        Ok(targets.len())
    }

    fn mark_dirty(&mut self) {
        self.state = ArchiveState::Dirty;
    }

    /// Names a lookup may match, most specific first.
    fn candidates(&self, name: &str) -> Vec<String> {
        let mut names = vec![name.to_string()];
        if let Ok(normalized) = normalize_name(name, self.options.trim_volume_letter, false) {
            names.push(format!("{}/", normalized));
            names.insert(1, normalized);
        }
        names
    }

    fn resolve(&self, name: &str) -> Option<String> {
        self.candidates(name).into_iter().find(|candidate| {
            self.entries.iter().any(|e| &e.name == candidate)
                || self.directory.iter().any(|s| &s.name == candidate)
        })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        let key = self.resolve(name)?;
        self.entries.iter().position(|e| e.name == key)
    }

    fn push(&mut self, entry: ZipEntry) -> Result<&mut ZipEntry> {
        if self.entries.iter().any(|e| e.name == entry.name) {
            return Err(OxiZipError::duplicate_entry(entry.name));
        }
        Ok(self.push_unchecked(entry))
    }

    fn push_unchecked(&mut self, entry: ZipEntry) -> &mut ZipEntry {
        debug!("added '{}'", entry.name);
        self.directory.push(DirectorySlot {
            name: entry.name.clone(),
            header: None,
        });
        self.entries.push(entry);
        self.mark_dirty();
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    fn entry_for_path(&self, path: &Path, archive_dir: Option<&str>) -> Result<ZipEntry> {
        let metadata = source_metadata(path)?;
        let name = match (archive_dir, path.file_name()) {
            (Some(dir), Some(file_name)) => format!("{}/{}", dir, file_name.to_string_lossy()),
            _ => path.to_string_lossy().into_owned(),
        };
        self.entry_from_metadata(path, &name, &metadata)
    }

    fn entry_from_metadata(&self, path: &Path, name: &str, metadata: &fs::Metadata) -> Result<ZipEntry> {
        let modified = metadata
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or_else(|_| DosDateTime::now());
        let trim = self.options.trim_volume_letter;
        if metadata.is_dir() {
            Ok(ZipEntry::directory(normalize_name(name, trim, true)?, modified))
        } else {
            Ok(ZipEntry::from_file(
                normalize_name(name, trim, false)?,
                path.to_path_buf(),
                metadata.len(),
                modified,
            ))
        }
    }

    fn collect_tree(&self, dir: &Path, prefix: &str, out: &mut Vec<ZipEntry>) -> Result<()> {
        let mut children = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
        children.sort_by_key(|child| child.file_name());
        for child in children {
            let path = child.path();
            let name = format!("{}/{}", prefix, child.file_name().to_string_lossy());
            let metadata = fs::metadata(&path)?;
            out.push(self.entry_from_metadata(&path, &name, &metadata)?);
            if metadata.is_dir() {
                self.collect_tree(&path, &name, out)?;
            }
        }
        Ok(())
    }
}

/// Scan the archive front to back: local entries, then the central
/// directory, then the footer.
fn read_records(
    reader: &mut dyn ReadSeek,
    encoding: TextEncoding,
) -> Result<(Vec<ZipEntry>, Vec<CentralDirectoryHeader>, EndOfCentralDirectory)> {
    let mut entries = Vec::new();
    let mut headers = Vec::new();
    let mut footer = None;

    reader.seek(SeekFrom::Start(0))?;
    let mut phase = ReadPhase::LocalEntries;
    while phase != ReadPhase::Done {
        phase = match phase {
            ReadPhase::LocalEntries => match Signature::peek(reader)? {
                Some(Signature::LocalFile) => {
                    entries.push(read_local_entry(reader, encoding)?);
                    ReadPhase::LocalEntries
                }
                _ => ReadPhase::CentralDirectory,
            },
            ReadPhase::CentralDirectory => match Signature::peek(reader)? {
                Some(Signature::CentralDirectory) => {
                    headers.push(CentralDirectoryHeader::read(reader)?);
                    ReadPhase::CentralDirectory
                }
                Some(Signature::EndOfCentralDirectory | Signature::Zip64EndOfCentralDirectory) => {
                    ReadPhase::Footer
                }
                Some(other) => {
                    return Err(OxiZipError::invalid_signature(CENTRAL_DIR_HEADER_SIG, other.value()));
                }
                None => return Err(OxiZipError::unexpected_eof(4)),
            },
            ReadPhase::Footer => {
                let (_, record) = EndOfCentralDirectory::locate(reader)?;
                footer = Some(record);
                ReadPhase::Done
            }
            ReadPhase::Done => ReadPhase::Done,
        };
    }

    let footer = footer.ok_or_else(|| OxiZipError::invalid_header("End of central directory not found"))?;
    Ok((entries, headers, footer))
}

fn read_local_entry(reader: &mut dyn ReadSeek, encoding: TextEncoding) -> Result<ZipEntry> {
    let header_offset = reader.stream_position()?;
    let local = LocalFileHeader::read(reader)?;
    let data_offset = reader.stream_position()?;

    let descriptor = if local.has_data_descriptor() {
        let (descriptor, payload_len) = DataDescriptor::scan(reader, local.zip64)?;
        if descriptor.compressed_size != payload_len {
            return Err(OxiZipError::corrupted(
                data_offset + payload_len,
                format!(
                    "data descriptor of '{}' records {} bytes but follows {}",
                    String::from_utf8_lossy(&local.name),
                    descriptor.compressed_size,
                    payload_len
                ),
            ));
        }
        let next = data_offset + payload_len + DataDescriptor::encoded_len(local.zip64) as u64;
        reader.seek(SeekFrom::Start(next))?;
        Some(descriptor)
    } else {
        reader.seek(SeekFrom::Start(data_offset + local.compressed_size))?;
        None
    };

    let entry = ZipEntry::from_local(local, header_offset, data_offset, descriptor, encoding);
    trace!("local header '{}' at {}", entry.name, header_offset);
    Ok(entry)
}

/// Normalize an entry name: `/` separators, no volume letter (when
/// trimming), no empty, `.` or `..` components. Directory names end with
/// `/`.
pub fn normalize_name(raw: &str, trim_volume_letter: bool, directory: bool) -> Result<String> {
    let mut name = raw.replace('\\', "/");
    let bytes = name.as_bytes();
    if trim_volume_letter && bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        name.drain(..2);
    }
    let parts: Vec<&str> = name
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect();
    if parts.is_empty() {
        return Err(OxiZipError::inconsistent(format!("'{}' does not name an entry", raw)));
    }
    let mut normalized = parts.join("/");
    if directory {
        normalized.push('/');
    }
    Ok(normalized)
}

/// Relative filesystem path for an entry name. Absolute names, volume
/// letters and `..` components are rejected.
pub fn sanitize_entry_path(name: &str) -> Result<PathBuf> {
    let normalized = name.replace('\\', "/");
    let bytes = normalized.as_bytes();
    if normalized.starts_with('/') || (bytes.len() >= 2 && bytes[1] == b':') {
        return Err(OxiZipError::path_traversal(name));
    }
    let mut path = PathBuf::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(OxiZipError::path_traversal(name)),
            part => path.push(part),
        }
    }
    if path.as_os_str().is_empty() {
        return Err(OxiZipError::path_traversal(name));
    }
    Ok(path)
}

fn source_metadata(path: &Path) -> Result<fs::Metadata> {
    fs::metadata(path).map_err(|err| {
        if err.kind() == io::ErrorKind::NotFound {
            OxiZipError::SourceNotFound {
                path: path.to_path_buf(),
            }
        } else {
            OxiZipError::Io(err)
        }
    })
}

/// Recover the archive error carried through an `io::Error` by the
/// decoding readers.
fn from_io(err: io::Error, offset: u64) -> OxiZipError {
    if err.get_ref().is_some_and(|inner| inner.is::<OxiZipError>()) {
        if let Some(Ok(inner)) = err.into_inner().map(|inner| inner.downcast::<OxiZipError>()) {
            return *inner;
        }
        return OxiZipError::corrupted(offset, "compressed stream error");
    }
    if err.kind() == io::ErrorKind::UnexpectedEof {
        return OxiZipError::corrupted(offset, err.to_string());
    }
    OxiZipError::Io(err)
}

fn header_seed() -> u64 {
    let mut hasher = RandomState::new().build_hasher();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    hasher.write_u128(nanos);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(archive: &mut ZipArchive) -> ZipArchive {
        let mut bytes = Vec::new();
        archive.save_to_stream(&mut bytes).unwrap();
        ZipArchive::read(Cursor::new(bytes), ReadOptions::default()).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut archive = ZipArchive::new();
        assert_eq!(archive.state(), ArchiveState::Empty);
        archive.add_bytes("a.txt", b"a".to_vec()).unwrap();
        assert_eq!(archive.state(), ArchiveState::Dirty);

        let mut read = roundtrip(&mut archive);
        assert_eq!(archive.state(), ArchiveState::Clean);
        assert_eq!(read.state(), ArchiveState::Clean);
        read.entry_mut("a.txt").unwrap().set_comment(Some("note".into()));
        assert_eq!(read.state(), ArchiveState::Dirty);
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("dir\\sub\\f.txt", true, false).unwrap(), "dir/sub/f.txt");
        assert_eq!(normalize_name("C:\\data\\f.txt", true, false).unwrap(), "data/f.txt");
        assert_eq!(normalize_name("C:\\data\\f.txt", false, false).unwrap(), "C:/data/f.txt");
        assert_eq!(normalize_name("./a//b/", true, false).unwrap(), "a/b");
        assert_eq!(normalize_name("/abs/dir", true, true).unwrap(), "abs/dir/");
        assert_eq!(normalize_name("../up.txt", true, false).unwrap(), "up.txt");
        assert!(normalize_name("./", true, false).is_err());
    }

    #[test]
    fn test_sanitize_entry_path() {
        assert_eq!(
            sanitize_entry_path("a/./b/c.txt").unwrap(),
            Path::new("a").join("b").join("c.txt")
        );
        for name in ["../evil", "a/../../evil", "/etc/passwd", "C:/windows", "..\\evil"] {
            let err = sanitize_entry_path(name).unwrap_err();
            assert!(matches!(err, OxiZipError::PathTraversal { .. }), "{}", name);
        }
    }

    #[test]
    fn test_lookup_accepts_variants() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("dir/f.txt", b"x".to_vec()).unwrap();
        archive.add_directory("dir").unwrap();
        assert!(archive.entry("dir\\f.txt").is_some());
        assert!(archive.entry("./dir/f.txt").is_some());
        assert!(archive.entry("dir").unwrap().is_directory());
        assert!(archive.entry("nope").is_none());
    }

    #[test]
    fn test_remove_detects_list_drift() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("a", b"1".to_vec()).unwrap();
        archive.add_bytes("b", b"2".to_vec()).unwrap();
        archive.directory.retain(|slot| slot.name != "b");

        let err = archive.remove("b").unwrap_err();
        assert!(matches!(err, OxiZipError::Inconsistent { .. }));
        assert_eq!(archive.len(), 2);

        let err = archive.remove("c").unwrap_err();
        assert!(matches!(err, OxiZipError::EntryNotFound { .. }));
        archive.remove("a").unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.directory.len(), 0);
    }

    #[test]
    fn test_set_entry_only_removes() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("a", b"1".to_vec()).unwrap();
        let replacement = archive.entry("a").unwrap().clone();
        assert!(matches!(
            archive.set_entry("a", Some(replacement)),
            Err(OxiZipError::Inconsistent { .. })
        ));
        archive.set_entry("a", None).unwrap();
        assert!(archive.is_empty());
    }

    #[test]
    fn test_update_requires_existing_entry() {
        let mut archive = ZipArchive::new();
        assert!(matches!(
            archive.update_bytes("missing", b"x".to_vec()),
            Err(OxiZipError::EntryNotFound { .. })
        ));
        assert!(archive.is_empty());

        archive.add_bytes("a", b"old".to_vec()).unwrap();
        archive.update_bytes("a", b"new".to_vec()).unwrap();
        assert_eq!(archive.len(), 1);
        assert_eq!(archive.extract("a", None).unwrap(), b"new");
    }

    #[test]
    fn test_update_bytes_rejects_directory() {
        let mut archive = ZipArchive::new();
        archive.add_directory("d").unwrap();
        assert!(matches!(
            archive.update_bytes("d", b"content".to_vec()),
            Err(OxiZipError::Inconsistent { .. })
        ));
        assert_eq!(archive.len(), 1);
        let entry = archive.entry("d/").unwrap();
        assert!(entry.is_directory());
        assert!(archive.entry("d").is_some_and(|e| e.is_directory()));
    }

    #[test]
    fn test_directory_records_after_read() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("a", b"1".to_vec()).unwrap();
        assert!(archive.directory_record("a").is_none());
        let read = roundtrip(&mut archive);
        let record = read.directory_record("a").unwrap();
        assert_eq!(record.crc32, Crc32::compute(b"1"));
    }

    #[test]
    fn test_pending_entries_extract_from_source() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("a", b"pending".to_vec()).unwrap();
        assert_eq!(archive.extract("a", None).unwrap(), b"pending");
    }

    #[test]
    fn test_archive_comment_roundtrip() {
        let mut archive = ZipArchive::new();
        archive.add_bytes("a", b"1".to_vec()).unwrap();
        archive.set_comment(Some("café".into()));
        let read = roundtrip(&mut archive);
        assert_eq!(read.comment(), Some("café"));
    }
}
