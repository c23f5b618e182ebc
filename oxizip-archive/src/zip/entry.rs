//! Archive entries and their serialization.
//!
//! An entry moves through three phases. It starts with metadata only
//! (directories stay there), gains a pending payload when it is added
//! from a file or buffer, and becomes serialized once it has been written
//! to, or read from, an archive file. A serialized entry's payload is
//! copied byte for byte on the next save.
//!
//! New payloads are written in two passes: the first reads the source to
//! learn its CRC and how large the deflated form is, which settles the
//! method and every header field before anything is written; the second
//! reads the source again and produces the bytes.

use crate::zip::crypto::{ENCRYPTION_HEADER_SIZE, ZipCrypto, ZipCryptoReader, ZipCryptoWriter};
use crate::zip::datetime::DosDateTime;
use crate::zip::encoding::TextEncoding;
use crate::zip::header::{
    CentralDirectoryHeader, CompressionMethod, DataDescriptor, FLAG_DATA_DESCRIPTOR,
    FLAG_ENCRYPTED, FLAG_STRONG_ENCRYPTION, FLAG_UTF8, LocalFileHeader, VERSION_DEFAULT,
    VERSION_ZIP64, ZIP64_MARKER_32,
};
use crate::zip::options::{WriteOptions, Zip64Policy};
use log::{debug, trace};
use oxizip_core::crc::Crc32;
use oxizip_core::error::{OxiZipError, Result};
use oxizip_deflate::{DeflateOptions, DeflateWriter, Format, InflateReader};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// External attributes for regular files: Unix mode 0644.
pub(crate) const FILE_ATTRIBUTES: u32 = 0o100644 << 16;

/// External attributes for directories: Unix mode 0755 plus the DOS
/// directory bit.
pub(crate) const DIRECTORY_ATTRIBUTES: u32 = (0o40755 << 16) | 0x10;

/// Seekable byte source backing a read or saved archive.
pub(crate) trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Encryption applied to an entry's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    /// Plain payload.
    #[default]
    None,
    /// Traditional PKWARE encryption.
    Traditional,
}

/// Serialization phase of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPhase {
    /// Metadata without a payload (directories).
    MetadataOnly,
    /// A payload source waiting to be written.
    PayloadPending,
    /// The payload lives in the backing archive.
    Serialized,
}

#[derive(Debug, Clone)]
pub(crate) enum Payload {
    Empty,
    File(PathBuf),
    Bytes(Vec<u8>),
    Archived { data_offset: u64 },
}

/// A single archive entry.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub(crate) name: String,
    pub(crate) modified: DosDateTime,
    pub(crate) comment: Option<String>,
    pub(crate) method: CompressionMethod,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) flags: u16,
    pub(crate) password: Option<String>,
    pub(crate) is_directory: bool,
    pub(crate) external_attributes: u32,
    pub(crate) header_offset: u64,
    pub(crate) local_header: Option<LocalFileHeader>,
    pub(crate) payload: Payload,
}

/// Where and how an entry landed in a freshly written archive.
#[derive(Debug, Clone)]
pub(crate) struct WrittenEntry {
    pub local: LocalFileHeader,
    pub descriptor: Option<DataDescriptor>,
    pub comment: Vec<u8>,
    pub header_offset: u64,
    pub data_offset: u64,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

/// Save-wide settings shared by every entry.
pub(crate) struct WriteContext<'a> {
    pub options: &'a WriteOptions,
    /// Defer CRC and sizes of new entries to data descriptors.
    pub streaming: bool,
    pub seed: u64,
}

/// Writer that counts the bytes passing through it.
#[derive(Debug)]
pub(crate) struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl ZipEntry {
    fn new(name: String, payload: Payload, is_directory: bool, modified: DosDateTime) -> Self {
        Self {
            name,
            modified,
            comment: None,
            method: if is_directory {
                CompressionMethod::Stored
            } else {
                CompressionMethod::Deflate
            },
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            flags: 0,
            password: None,
            is_directory,
            external_attributes: if is_directory {
                DIRECTORY_ATTRIBUTES
            } else {
                FILE_ATTRIBUTES
            },
            header_offset: 0,
            local_header: None,
            payload,
        }
    }

    pub(crate) fn from_bytes(name: String, data: Vec<u8>, modified: DosDateTime) -> Self {
        let size = data.len() as u64;
        let mut entry = Self::new(name, Payload::Bytes(data), false, modified);
        entry.uncompressed_size = size;
        entry
    }

    pub(crate) fn from_file(name: String, path: PathBuf, size: u64, modified: DosDateTime) -> Self {
        let mut entry = Self::new(name, Payload::File(path), false, modified);
        entry.uncompressed_size = size;
        entry
    }

    pub(crate) fn directory(name: String, modified: DosDateTime) -> Self {
        Self::new(name, Payload::Empty, true, modified)
    }

    /// Entry for a local header found while reading an archive.
    pub(crate) fn from_local(
        local: LocalFileHeader,
        header_offset: u64,
        data_offset: u64,
        descriptor: Option<DataDescriptor>,
        encoding: TextEncoding,
    ) -> Self {
        let name = encoding.decode(&local.name, local.flags & FLAG_UTF8 != 0);
        let is_directory = name.ends_with('/');
        let (crc32, compressed_size, uncompressed_size) = match descriptor {
            Some(desc) => (desc.crc32, desc.compressed_size, desc.uncompressed_size),
            None => (local.crc32, local.compressed_size, local.uncompressed_size),
        };
        let mut entry = Self::new(name, Payload::Archived { data_offset }, is_directory, local.modified);
        entry.method = local.method;
        entry.crc32 = crc32;
        entry.compressed_size = compressed_size;
        entry.uncompressed_size = uncompressed_size;
        entry.flags = local.flags;
        entry.header_offset = header_offset;
        entry.local_header = Some(local);
        entry
    }

    /// Copy the fields only the central directory carries.
    pub(crate) fn link_central(&mut self, central: &CentralDirectoryHeader, comment: String) {
        self.comment = (!comment.is_empty()).then_some(comment);
        self.is_directory |= central.is_directory();
        self.external_attributes = central.external_attributes;
    }

    /// Adopt the layout of a save that has been committed.
    pub(crate) fn apply_written(&mut self, written: WrittenEntry) {
        self.crc32 = written.crc32;
        self.compressed_size = written.compressed_size;
        self.uncompressed_size = written.uncompressed_size;
        self.method = written.local.method;
        self.flags = written.local.flags;
        self.header_offset = written.header_offset;
        self.payload = Payload::Archived {
            data_offset: written.data_offset,
        };
        self.local_header = Some(written.local);
    }

    /// Entry name, using `/` as separator. Directory names end with `/`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source file, for entries added from disk and not yet saved.
    pub fn source_path(&self) -> Option<&Path> {
        match &self.payload {
            Payload::File(path) => Some(path),
            _ => None,
        }
    }

    /// Last modification time.
    pub fn modified(&self) -> DosDateTime {
        self.modified
    }

    /// Entry comment.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Compression method. For pending entries this is the requested
    /// method; a save may still fall back to stored.
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// CRC-32 of the uncompressed data. Zero until the payload is written.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Compressed size including any encryption header. Zero until the
    /// payload is written.
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }

    /// Uncompressed size.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// General purpose bit flag.
    pub fn flags(&self) -> u16 {
        self.flags
    }

    /// Encryption of the stored payload, or of the payload to be written.
    pub fn encryption(&self) -> Encryption {
        let encrypted = match self.payload {
            Payload::Archived { .. } => self.flags & FLAG_ENCRYPTED != 0,
            _ => self.password.is_some() && !self.is_directory,
        };
        if encrypted {
            Encryption::Traditional
        } else {
            Encryption::None
        }
    }

    /// True if the payload is (or will be) encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.encryption() == Encryption::Traditional
    }

    /// True for directory entries.
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// True if CRC and sizes follow the payload in a data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// External file attributes.
    pub fn external_attributes(&self) -> u32 {
        self.external_attributes
    }

    /// Offset of the local header in the backing archive.
    pub fn header_offset(&self) -> u64 {
        self.header_offset
    }

    /// The local header last read or written for this entry.
    pub fn local_header(&self) -> Option<&LocalFileHeader> {
        self.local_header.as_ref()
    }

    /// Serialization phase.
    pub fn phase(&self) -> EntryPhase {
        match self.payload {
            Payload::Empty => EntryPhase::MetadataOnly,
            Payload::File(_) | Payload::Bytes(_) => EntryPhase::PayloadPending,
            Payload::Archived { .. } => EntryPhase::Serialized,
        }
    }

    /// Compression ratio in percent.
    pub fn compression_ratio(&self) -> f64 {
        if self.uncompressed_size == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_size as f64 / self.uncompressed_size as f64) * 100.0
    }

    /// Set the entry comment.
    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment.filter(|c| !c.is_empty());
    }

    /// Set the modification time.
    ///
    /// Fails for an encrypted serialized entry with a data descriptor: its
    /// password check byte was derived from the original time.
    pub fn set_modified(&mut self, modified: DosDateTime) -> Result<()> {
        if self.phase() == EntryPhase::Serialized && self.is_encrypted() && self.has_data_descriptor() {
            return Err(OxiZipError::inconsistent(format!(
                "the time of '{}' is bound to its encryption header",
                self.name
            )));
        }
        self.modified = modified;
        Ok(())
    }

    /// Request a compression method for a pending entry.
    pub fn set_method(&mut self, method: CompressionMethod) -> Result<()> {
        if let CompressionMethod::Unknown(id) = method {
            return Err(OxiZipError::unsupported_method(format!("method {}", id)));
        }
        if self.phase() == EntryPhase::Serialized {
            return Err(OxiZipError::inconsistent(format!(
                "'{}' is already compressed; update the entry to change its method",
                self.name
            )));
        }
        self.method = method;
        Ok(())
    }

    /// Set or clear the password for a pending entry.
    pub fn set_password(&mut self, password: Option<&str>) -> Result<()> {
        if self.phase() == EntryPhase::Serialized {
            return Err(OxiZipError::inconsistent(format!(
                "'{}' is already written; update the entry to change its encryption",
                self.name
            )));
        }
        if self.is_directory && password.is_some() {
            return Err(OxiZipError::inconsistent(format!(
                "directory '{}' has no payload to encrypt",
                self.name
            )));
        }
        self.password = password.map(str::to_owned);
        Ok(())
    }

    fn encoded_text(&self, encoding: TextEncoding) -> Result<(Vec<u8>, Vec<u8>, bool)> {
        let (name, name_utf8) = encoding.encode(&self.name)?;
        let (comment, comment_utf8) = match &self.comment {
            Some(comment) => encoding.encode(comment)?,
            None => (Default::default(), false),
        };
        Ok((name.into_owned(), comment.into_owned(), name_utf8 || comment_utf8))
    }

    fn open_source(&self) -> Result<Box<dyn Read + '_>> {
        match &self.payload {
            Payload::Empty => Ok(Box::new(io::empty())),
            Payload::Bytes(data) => Ok(Box::new(data.as_slice())),
            Payload::File(path) => match File::open(path) {
                Ok(file) => Ok(Box::new(BufReader::new(file))),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    Err(OxiZipError::SourceNotFound { path: path.clone() })
                }
                Err(err) => Err(err.into()),
            },
            Payload::Archived { .. } => Err(OxiZipError::inconsistent(format!(
                "'{}' has no pending payload",
                self.name
            ))),
        }
    }

    /// Write the local header, payload and any data descriptor at the
    /// current position of `out`.
    pub(crate) fn write_to<W: Write>(
        &self,
        out: &mut CountingWriter<W>,
        ctx: &WriteContext<'_>,
        backing: &mut Option<Box<dyn ReadSeek>>,
    ) -> Result<WrittenEntry> {
        match self.payload {
            Payload::Archived { data_offset } => self.copy_serialized(out, ctx, backing, data_offset),
            _ => self.write_pending(out, ctx),
        }
    }

    fn write_pending<W: Write>(
        &self,
        out: &mut CountingWriter<W>,
        ctx: &WriteContext<'_>,
    ) -> Result<WrittenEntry> {
        let options = ctx.options;
        let (name, comment, utf8) = self.encoded_text(options.encoding)?;
        let password = if self.is_directory {
            None
        } else {
            self.password.as_deref()
        };

        let try_deflate = !self.is_directory
            && !options.force_no_compression
            && self.method == CompressionMethod::Deflate;
        let (crc32, uncompressed_size, deflated_size) = self.measure(try_deflate, options)?;
        let method = if try_deflate && uncompressed_size > 0 && deflated_size < uncompressed_size {
            CompressionMethod::Deflate
        } else {
            if try_deflate && uncompressed_size > 0 {
                debug!(
                    "{}: deflate gave {} bytes for {}, storing instead",
                    self.name, deflated_size, uncompressed_size
                );
            }
            CompressionMethod::Stored
        };
        let payload_size = match method {
            CompressionMethod::Deflate => deflated_size,
            _ => uncompressed_size,
        };
        let compressed_size = payload_size
            + if password.is_some() {
                ENCRYPTION_HEADER_SIZE as u64
            } else {
                0
            };
        let zip64 = entry_zip64(options.zip64, &self.name, uncompressed_size, compressed_size)?;
        let deferred = ctx.streaming && !self.is_directory;

        let mut flags = 0;
        if utf8 {
            flags |= FLAG_UTF8;
        }
        if password.is_some() {
            flags |= FLAG_ENCRYPTED;
        }
        if deferred {
            flags |= FLAG_DATA_DESCRIPTOR;
        }

        let local = LocalFileHeader {
            version_needed: if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT },
            flags,
            method,
            modified: self.modified,
            crc32: if deferred { 0 } else { crc32 },
            compressed_size: if deferred { 0 } else { compressed_size },
            uncompressed_size: if deferred { 0 } else { uncompressed_size },
            name,
            extra: Vec::new(),
            zip64,
        };
        let header_offset = out.count();
        local.write(out)?;
        let data_offset = out.count();

        let mut source = self.open_source()?;
        let folded = match password {
            Some(password) => {
                let mut cipher = ZipCrypto::new(password.as_bytes());
                let check = ZipCrypto::check_byte(crc32, self.modified.dos_time(), deferred);
                out.write_all(&cipher.encryption_header(check, ctx.seed ^ header_offset))?;
                copy_payload(&mut source, ZipCryptoWriter::new(&mut *out, cipher), method, options)?
            }
            None => copy_payload(&mut source, &mut *out, method, options)?,
        };
        if folded.value() != crc32
            || folded.bytes_folded() != uncompressed_size
            || out.count() - data_offset != compressed_size
        {
            return Err(OxiZipError::inconsistent(format!(
                "'{}' changed while the archive was being saved",
                self.name
            )));
        }

        let descriptor = deferred.then_some(DataDescriptor {
            crc32,
            compressed_size,
            uncompressed_size,
        });
        if let Some(descriptor) = &descriptor {
            descriptor.write(out, zip64)?;
        }
        trace!(
            "wrote '{}' at {}: {} {} -> {} bytes",
            self.name, header_offset, method, uncompressed_size, compressed_size
        );

        Ok(WrittenEntry {
            local,
            descriptor,
            comment,
            header_offset,
            data_offset,
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// First pass: CRC, size and deflated size of the source.
    fn measure(&self, try_deflate: bool, options: &WriteOptions) -> Result<(u32, u64, u64)> {
        let mut source = self.open_source()?;
        let mut crc = Crc32::new();
        if try_deflate {
            let mut encoder = DeflateWriter::new(
                CountingWriter::new(io::sink()),
                DeflateOptions::new(options.level.level()),
            );
            fold_into(&mut source, &mut crc, &mut encoder)?;
            let counter = encoder.finish()?;
            Ok((crc.value(), crc.bytes_folded(), counter.count()))
        } else {
            fold_into(&mut source, &mut crc, &mut io::sink())?;
            Ok((crc.value(), crc.bytes_folded(), crc.bytes_folded()))
        }
    }

    fn copy_serialized<W: Write>(
        &self,
        out: &mut CountingWriter<W>,
        ctx: &WriteContext<'_>,
        backing: &mut Option<Box<dyn ReadSeek>>,
        source_offset: u64,
    ) -> Result<WrittenEntry> {
        let options = ctx.options;
        let Some(mut local) = self.local_header.clone() else {
            return Err(OxiZipError::inconsistent(format!(
                "'{}' has no local header",
                self.name
            )));
        };
        let Some(backing) = backing.as_mut() else {
            return Err(OxiZipError::inconsistent(format!(
                "'{}' has no backing archive",
                self.name
            )));
        };

        let (name, comment, utf8) = self.encoded_text(options.encoding)?;
        let zip64 = entry_zip64(
            options.zip64,
            &self.name,
            self.uncompressed_size,
            self.compressed_size,
        )?;
        let deferred = local.has_data_descriptor();

        local.name = name;
        local.flags = (local.flags & !FLAG_UTF8) | if utf8 { FLAG_UTF8 } else { 0 };
        local.modified = self.modified;
        local.zip64 = zip64;
        local.version_needed = if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT };
        if deferred {
            local.crc32 = 0;
            local.compressed_size = 0;
            local.uncompressed_size = 0;
        } else {
            local.crc32 = self.crc32;
            local.compressed_size = self.compressed_size;
            local.uncompressed_size = self.uncompressed_size;
        }

        let header_offset = out.count();
        local.write(out)?;
        let data_offset = out.count();

        backing.seek(SeekFrom::Start(source_offset))?;
        let copied = io::copy(&mut backing.by_ref().take(self.compressed_size), out)?;
        if copied != self.compressed_size {
            return Err(OxiZipError::corrupted(
                source_offset + copied,
                format!("archive ends inside the payload of '{}'", self.name),
            ));
        }

        let descriptor = deferred.then_some(DataDescriptor {
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
        });
        if let Some(descriptor) = &descriptor {
            descriptor.write(out, zip64)?;
        }
        trace!("copied '{}' to {}", self.name, header_offset);

        Ok(WrittenEntry {
            local,
            descriptor,
            comment,
            header_offset,
            data_offset,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
        })
    }

    /// Reader producing the entry's uncompressed bytes.
    ///
    /// For an encrypted entry the password is verified against the
    /// encryption header before any payload byte is decrypted.
    pub(crate) fn open_reader<'a>(
        &'a self,
        backing: &'a mut Option<Box<dyn ReadSeek>>,
        password: Option<&str>,
    ) -> Result<Box<dyn Read + 'a>> {
        let data_offset = match self.payload {
            Payload::Archived { data_offset } => data_offset,
            _ => return self.open_source(),
        };
        if self.flags & FLAG_STRONG_ENCRYPTION != 0 {
            return Err(OxiZipError::unsupported_method("strong encryption"));
        }
        if let CompressionMethod::Unknown(id) = self.method {
            return Err(OxiZipError::unsupported_method(format!("method {}", id)));
        }
        let Some(backing) = backing.as_mut() else {
            return Err(OxiZipError::inconsistent(format!(
                "'{}' has no backing archive",
                self.name
            )));
        };

        backing.seek(SeekFrom::Start(data_offset))?;
        let mut raw = backing.take(self.compressed_size);
        let payload: Box<dyn Read + 'a> = if self.flags & FLAG_ENCRYPTED != 0 {
            let Some(password) = password else {
                return Err(OxiZipError::password_required(&self.name));
            };
            let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
            raw.read_exact(&mut header).map_err(|err| {
                if err.kind() == io::ErrorKind::UnexpectedEof {
                    OxiZipError::corrupted(data_offset, "truncated encryption header")
                } else {
                    OxiZipError::Io(err)
                }
            })?;
            let header_time = self
                .local_header
                .as_ref()
                .map_or(self.modified, |local| local.modified);
            let check = ZipCrypto::check_byte(
                self.crc32,
                header_time.dos_time(),
                self.has_data_descriptor(),
            );
            let mut cipher = ZipCrypto::new(password.as_bytes());
            cipher
                .check_header(&header, check)
                .map_err(|_| OxiZipError::bad_password(&self.name))?;
            Box::new(ZipCryptoReader::new(raw, cipher))
        } else {
            Box::new(raw)
        };

        match self.method {
            CompressionMethod::Deflate => Ok(Box::new(InflateReader::new(payload, Format::Raw))),
            _ => Ok(payload),
        }
    }
}

fn entry_zip64(policy: Zip64Policy, name: &str, uncompressed: u64, compressed: u64) -> Result<bool> {
    let large = uncompressed >= u64::from(ZIP64_MARKER_32) || compressed >= u64::from(ZIP64_MARKER_32);
    match policy {
        Zip64Policy::Always => Ok(true),
        Zip64Policy::AsNecessary => Ok(large),
        Zip64Policy::Never if large => Err(OxiZipError::inconsistent(format!(
            "'{}' needs Zip64 but Zip64 is disabled",
            name
        ))),
        Zip64Policy::Never => Ok(false),
    }
}

/// Copy `source` into `sink`, folding every byte into `crc`.
fn fold_into<R: Read + ?Sized, W: Write + ?Sized>(
    source: &mut R,
    crc: &mut Crc32,
    sink: &mut W,
) -> Result<()> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = match source.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        crc.update(&buffer[..n]);
        sink.write_all(&buffer[..n])?;
    }
}

/// Second pass: produce the payload bytes with the chosen method.
fn copy_payload<R: Read + ?Sized, W: Write>(
    source: &mut R,
    mut out: W,
    method: CompressionMethod,
    options: &WriteOptions,
) -> Result<Crc32> {
    let mut crc = Crc32::new();
    match method {
        CompressionMethod::Stored => fold_into(source, &mut crc, &mut out)?,
        CompressionMethod::Deflate => {
            let mut encoder = DeflateWriter::new(out, DeflateOptions::new(options.level.level()));
            fold_into(source, &mut crc, &mut encoder)?;
            encoder.finish()?;
        }
        CompressionMethod::Unknown(id) => {
            return Err(OxiZipError::unsupported_method(format!("method {}", id)));
        }
    }
    Ok(crc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(options: &WriteOptions, streaming: bool) -> WriteContext<'_> {
        WriteContext {
            options,
            streaming,
            seed: 1,
        }
    }

    fn write_one(entry: &ZipEntry, options: &WriteOptions, streaming: bool) -> (Vec<u8>, WrittenEntry) {
        let mut out = CountingWriter::new(Vec::new());
        let written = entry
            .write_to(&mut out, &context(options, streaming), &mut None)
            .unwrap();
        (out.into_inner(), written)
    }

    #[test]
    fn test_compressible_entry_is_deflated() {
        let data = b"abcabcabc".repeat(200);
        let entry = ZipEntry::from_bytes("a.txt".into(), data.clone(), DosDateTime::default());
        let (bytes, written) = write_one(&entry, &WriteOptions::default(), false);
        assert_eq!(written.local.method, CompressionMethod::Deflate);
        assert_eq!(written.crc32, Crc32::compute(&data));
        assert!(written.compressed_size < data.len() as u64);
        assert_eq!(
            bytes.len() as u64,
            written.data_offset + written.compressed_size
        );
    }

    #[test]
    fn test_incompressible_entry_falls_back_to_stored() {
        let mut seed = 0x1234_5678u32;
        let data: Vec<u8> = (0..4096)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (seed >> 16) as u8
            })
            .collect();
        let entry = ZipEntry::from_bytes("r.bin".into(), data.clone(), DosDateTime::default());
        let (bytes, written) = write_one(&entry, &WriteOptions::default(), false);
        assert_eq!(written.local.method, CompressionMethod::Stored);
        assert_eq!(written.compressed_size, 4096);
        assert_eq!(&bytes[written.data_offset as usize..], data.as_slice());
    }

    #[test]
    fn test_empty_entry_is_stored() {
        let entry = ZipEntry::from_bytes("empty.txt".into(), Vec::new(), DosDateTime::default());
        let (_, written) = write_one(&entry, &WriteOptions::default(), false);
        assert_eq!(written.local.method, CompressionMethod::Stored);
        assert_eq!(written.compressed_size, 0);
        assert_eq!(written.crc32, 0);
    }

    #[test]
    fn test_streaming_defers_sizes() {
        let entry = ZipEntry::from_bytes("s.txt".into(), b"stream me".to_vec(), DosDateTime::default());
        let (bytes, written) = write_one(&entry, &WriteOptions::default(), true);
        assert!(written.local.has_data_descriptor());
        assert_eq!(written.local.compressed_size, 0);
        let descriptor = written.descriptor.unwrap();
        assert_eq!(descriptor.crc32, Crc32::compute(b"stream me"));
        let tail = &bytes[bytes.len() - 16..];
        assert_eq!(&tail[..4], b"PK\x07\x08");
    }

    #[test]
    fn test_encrypted_entry_size_includes_header() {
        let mut entry = ZipEntry::from_bytes("e.txt".into(), b"secret".to_vec(), DosDateTime::default());
        entry.set_method(CompressionMethod::Stored).unwrap();
        entry.set_password(Some("pw")).unwrap();
        let (_, written) = write_one(&entry, &WriteOptions::default(), false);
        assert!(written.local.is_encrypted());
        assert_eq!(written.compressed_size, 6 + ENCRYPTION_HEADER_SIZE as u64);
    }

    #[test]
    fn test_missing_source() {
        let entry = ZipEntry::from_file(
            "gone.txt".into(),
            PathBuf::from("/nonexistent/oxizip/gone.txt"),
            0,
            DosDateTime::default(),
        );
        let mut out = CountingWriter::new(Vec::new());
        let err = entry
            .write_to(&mut out, &context(&WriteOptions::default(), false), &mut None)
            .unwrap_err();
        assert!(matches!(err, OxiZipError::SourceNotFound { .. }));
        assert_eq!(out.count(), 0);
    }

    #[test]
    fn test_zip64_policy_per_entry() {
        assert!(!entry_zip64(Zip64Policy::AsNecessary, "a", 10, 10).unwrap());
        assert!(entry_zip64(Zip64Policy::AsNecessary, "a", 1 << 32, 10).unwrap());
        assert!(entry_zip64(Zip64Policy::Always, "a", 0, 0).unwrap());
        assert!(entry_zip64(Zip64Policy::Never, "a", 1 << 32, 10).is_err());
    }

    #[test]
    fn test_setters_respect_phase() {
        let mut dir = ZipEntry::directory("d/".into(), DosDateTime::default());
        assert_eq!(dir.phase(), EntryPhase::MetadataOnly);
        assert!(dir.set_password(Some("x")).is_err());

        let mut entry = ZipEntry::from_bytes("f".into(), vec![1], DosDateTime::default());
        assert_eq!(entry.phase(), EntryPhase::PayloadPending);
        assert!(entry.set_method(CompressionMethod::Unknown(99)).is_err());
        entry.payload = Payload::Archived { data_offset: 0 };
        assert!(entry.set_method(CompressionMethod::Stored).is_err());
        assert!(entry.set_password(Some("x")).is_err());
        assert!(entry.set_modified(DosDateTime::MAX).is_ok());
    }
}
