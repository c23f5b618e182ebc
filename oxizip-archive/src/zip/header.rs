//! ZIP record structures.
//!
//! All integers are little-endian. Each record type has a `read` that
//! validates its signature and a `write`/`to_bytes` that emits it. Sizes
//! and offsets are kept as 64-bit values; the 32-bit wire fields are filled
//! with `0xFFFFFFFF` markers and the real values moved to the Zip64 extra
//! field when a record is written in Zip64 form.

use crate::zip::datetime::DosDateTime;
use oxizip_core::error::{OxiZipError, Result};
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// Data descriptor signature (PK\x07\x08).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// ZIP64 extra field header ID.
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

/// Marker value for Zip64 (0xFFFFFFFF for 32-bit fields).
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Marker value for Zip64 (0xFFFF for 16-bit fields).
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Flag bit: payload is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Flag bit: CRC and sizes follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Flag bit: strong encryption. Never written; entries carrying it cannot
/// be extracted.
pub const FLAG_STRONG_ENCRYPTION: u16 = 0x0040;

/// Flag bit: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Version needed to extract for ordinary entries.
pub const VERSION_DEFAULT: u16 = 20;

/// Version needed to extract for entries with Zip64 fields.
pub const VERSION_ZIP64: u16 = 45;

/// Version made by: Unix host, APPNOTE version 4.5.
pub const VERSION_MADE_BY: u16 = (3 << 8) | 45;

/// Fixed part of a local file header, signature included.
pub const LOCAL_HEADER_SIZE: usize = 30;

/// Fixed part of a central directory header, signature included.
pub const CENTRAL_HEADER_SIZE: usize = 46;

/// Fixed part of the end of central directory record.
pub const EOCD_SIZE: usize = 22;

/// Size of the Zip64 end of central directory record as written.
pub const ZIP64_EOCD_SIZE: usize = 56;

/// Size of the Zip64 end of central directory locator.
pub const ZIP64_LOCATOR_SIZE: usize = 20;

const MAX_COMMENT_LEN: usize = u16::MAX as usize;
const SCAN_CHUNK: usize = 8 * 1024;

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// `read_exact` that reports a short read as a truncated record.
fn read_record<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            OxiZipError::unexpected_eof(buf.len())
        } else {
            OxiZipError::Io(err)
        }
    })
}

fn read_vec<R: Read + ?Sized>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    read_record(reader, &mut buf)?;
    Ok(buf)
}

fn field_len(len: usize, what: &str) -> Result<u16> {
    u16::try_from(len).map_err(|_| OxiZipError::invalid_header(format!("{} is longer than 65535 bytes", what)))
}

/// A 32-bit size or offset field: the value itself, or the marker.
fn narrow(value: u64, use_marker: bool) -> u32 {
    if use_marker {
        ZIP64_MARKER_32
    } else {
        value as u32
    }
}

fn exceeds_32(value: u64) -> bool {
    value >= u64::from(ZIP64_MARKER_32)
}

/// ZIP compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// Stored (no compression).
    Stored,
    /// Deflate compression.
    #[default]
    Deflate,
    /// Unknown method.
    Unknown(u16),
}

impl CompressionMethod {
    /// Create from a u16 value.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflate,
            _ => Self::Unknown(value),
        }
    }

    /// The wire value.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Unknown(id) => id,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored => write!(f, "stored"),
            Self::Deflate => write!(f, "deflate"),
            Self::Unknown(id) => write!(f, "method {}", id),
        }
    }
}

/// Record type identified by a four-byte signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Local file header.
    LocalFile,
    /// Central directory header.
    CentralDirectory,
    /// End of central directory record.
    EndOfCentralDirectory,
    /// Zip64 end of central directory record.
    Zip64EndOfCentralDirectory,
    /// Zip64 end of central directory locator.
    Zip64Locator,
    /// Data descriptor.
    DataDescriptor,
    /// Anything else.
    Unknown(u32),
}

impl Signature {
    /// Classify a signature value.
    pub fn from_u32(value: u32) -> Self {
        match value {
            LOCAL_FILE_HEADER_SIG => Self::LocalFile,
            CENTRAL_DIR_HEADER_SIG => Self::CentralDirectory,
            END_OF_CENTRAL_DIR_SIG => Self::EndOfCentralDirectory,
            ZIP64_END_OF_CENTRAL_DIR_SIG => Self::Zip64EndOfCentralDirectory,
            ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG => Self::Zip64Locator,
            DATA_DESCRIPTOR_SIG => Self::DataDescriptor,
            other => Self::Unknown(other),
        }
    }

    /// The signature value.
    pub fn value(self) -> u32 {
        match self {
            Self::LocalFile => LOCAL_FILE_HEADER_SIG,
            Self::CentralDirectory => CENTRAL_DIR_HEADER_SIG,
            Self::EndOfCentralDirectory => END_OF_CENTRAL_DIR_SIG,
            Self::Zip64EndOfCentralDirectory => ZIP64_END_OF_CENTRAL_DIR_SIG,
            Self::Zip64Locator => ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG,
            Self::DataDescriptor => DATA_DESCRIPTOR_SIG,
            Self::Unknown(value) => value,
        }
    }

    /// Read the next four bytes and rewind. Returns `None` when fewer than
    /// four bytes remain.
    pub fn peek<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Option<Self>> {
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        reader.seek(SeekFrom::Current(-(filled as i64)))?;
        if filled < buf.len() {
            return Ok(None);
        }
        Ok(Some(Self::from_u32(u32::from_le_bytes(buf))))
    }

    fn expect<R: Read + ?Sized>(reader: &mut R, expected: u32) -> Result<()> {
        let mut buf = [0u8; 4];
        read_record(reader, &mut buf)?;
        let found = u32::from_le_bytes(buf);
        if found != expected {
            return Err(OxiZipError::invalid_signature(expected, found));
        }
        Ok(())
    }
}

/// Zip64 extended information extra field (header ID 0x0001).
///
/// A value is only present when the matching fixed field of the record
/// holds the marker, and the values appear in a fixed order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64ExtraField {
    /// Original size.
    pub uncompressed_size: Option<u64>,
    /// Compressed size.
    pub compressed_size: Option<u64>,
    /// Offset of the local header.
    pub header_offset: Option<u64>,
    /// Starting disk number.
    pub disk_start: Option<u32>,
}

impl Zip64ExtraField {
    /// Find the Zip64 block in `extra` and read the values whose fixed
    /// fields hold markers. Returns `None` if there is no Zip64 block.
    pub fn parse(
        extra: &[u8],
        uncompressed_marked: bool,
        compressed_marked: bool,
        offset_marked: bool,
        disk_marked: bool,
    ) -> Result<Option<Self>> {
        let Some(data) = find_extra_block(extra, ZIP64_EXTRA_FIELD_ID) else {
            return Ok(None);
        };

        let mut field = Self::default();
        let mut pos = 0;
        let take_u64 = |marked: bool, pos: &mut usize| -> Result<Option<u64>> {
            if !marked {
                return Ok(None);
            }
            if *pos + 8 > data.len() {
                return Err(OxiZipError::invalid_header("Zip64 extra field too short"));
            }
            let value = le_u64(data, *pos);
            *pos += 8;
            Ok(Some(value))
        };
        field.uncompressed_size = take_u64(uncompressed_marked, &mut pos)?;
        field.compressed_size = take_u64(compressed_marked, &mut pos)?;
        field.header_offset = take_u64(offset_marked, &mut pos)?;
        if disk_marked {
            if pos + 4 > data.len() {
                return Err(OxiZipError::invalid_header("Zip64 extra field too short"));
            }
            field.disk_start = Some(le_u32(data, pos));
        }
        Ok(Some(field))
    }

    /// Encode the block, header included. Empty when no value is present.
    pub fn build(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(28);
        for value in [self.uncompressed_size, self.compressed_size, self.header_offset]
            .into_iter()
            .flatten()
        {
            data.extend_from_slice(&value.to_le_bytes());
        }
        if let Some(disk) = self.disk_start {
            data.extend_from_slice(&disk.to_le_bytes());
        }
        if data.is_empty() {
            return data;
        }

        let mut block = Vec::with_capacity(4 + data.len());
        block.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
        block.extend_from_slice(&(data.len() as u16).to_le_bytes());
        block.extend_from_slice(&data);
        block
    }

    /// Copy `extra` without its Zip64 blocks.
    pub fn strip(extra: &[u8]) -> Vec<u8> {
        let mut kept = Vec::with_capacity(extra.len());
        let mut offset = 0;
        while offset + 4 <= extra.len() {
            let id = le_u16(extra, offset);
            let size = le_u16(extra, offset + 2) as usize;
            let end = (offset + 4 + size).min(extra.len());
            if id != ZIP64_EXTRA_FIELD_ID {
                kept.extend_from_slice(&extra[offset..end]);
            }
            offset = end;
        }
        kept
    }
}

fn find_extra_block(extra: &[u8], wanted: u16) -> Option<&[u8]> {
    let mut offset = 0;
    while offset + 4 <= extra.len() {
        let id = le_u16(extra, offset);
        let size = le_u16(extra, offset + 2) as usize;
        offset += 4;
        if offset + size > extra.len() {
            return None;
        }
        if id == wanted {
            return Some(&extra[offset..offset + size]);
        }
        offset += size;
    }
    None
}

/// ZIP local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of uncompressed data (zero when deferred).
    pub crc32: u32,
    /// Compressed size, including any encryption header.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Encoded file name.
    pub name: Vec<u8>,
    /// Extra field blocks other than Zip64.
    pub extra: Vec<u8>,
    /// Whether the record carries a Zip64 extra field.
    pub zip64: bool,
}

impl LocalFileHeader {
    /// Read a local file header, signature included.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; LOCAL_HEADER_SIZE];
        read_record(reader, &mut buf)?;

        let signature = le_u32(&buf, 0);
        if signature != LOCAL_FILE_HEADER_SIG {
            return Err(OxiZipError::invalid_signature(LOCAL_FILE_HEADER_SIG, signature));
        }

        let version_needed = le_u16(&buf, 4);
        let flags = le_u16(&buf, 6);
        let method = CompressionMethod::from_u16(le_u16(&buf, 8));
        let modified = DosDateTime::from_parts(le_u16(&buf, 10), le_u16(&buf, 12));
        let crc32 = le_u32(&buf, 14);
        let compressed_size = le_u32(&buf, 18);
        let uncompressed_size = le_u32(&buf, 22);
        let name_len = le_u16(&buf, 26) as usize;
        let extra_len = le_u16(&buf, 28) as usize;

        let name = read_vec(reader, name_len)?;
        let raw_extra = read_vec(reader, extra_len)?;

        // A local Zip64 block carries both sizes whenever it is present.
        let zip64 = Zip64ExtraField::parse(
            &raw_extra,
            uncompressed_size == ZIP64_MARKER_32,
            compressed_size == ZIP64_MARKER_32,
            false,
            false,
        )?;
        let (uncompressed_size, compressed_size) = match zip64 {
            Some(field) => (
                field.uncompressed_size.unwrap_or(u64::from(uncompressed_size)),
                field.compressed_size.unwrap_or(u64::from(compressed_size)),
            ),
            None if uncompressed_size == ZIP64_MARKER_32 || compressed_size == ZIP64_MARKER_32 => {
                return Err(OxiZipError::invalid_header(
                    "local header has Zip64 markers but no Zip64 extra field",
                ));
            }
            None => (u64::from(uncompressed_size), u64::from(compressed_size)),
        };

        Ok(Self {
            version_needed,
            flags,
            method,
            modified,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra: Zip64ExtraField::strip(&raw_extra),
            zip64: zip64.is_some(),
        })
    }

    /// True if CRC and sizes follow the payload.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// True if the payload is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Encode the record.
    ///
    /// Fails if a size does not fit 32 bits and the header is not in
    /// Zip64 form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if !self.zip64 && (exceeds_32(self.compressed_size) || exceeds_32(self.uncompressed_size)) {
            return Err(OxiZipError::inconsistent(format!(
                "entry '{}' needs Zip64 but the header is not in Zip64 form",
                String::from_utf8_lossy(&self.name)
            )));
        }

        let zip64_extra = if self.zip64 {
            Zip64ExtraField {
                uncompressed_size: Some(self.uncompressed_size),
                compressed_size: Some(self.compressed_size),
                ..Default::default()
            }
            .build()
        } else {
            Vec::new()
        };
        let extra_len = field_len(zip64_extra.len() + self.extra.len(), "extra field")?;
        let name_len = field_len(self.name.len(), "file name")?;
        let version = if self.zip64 {
            self.version_needed.max(VERSION_ZIP64)
        } else {
            self.version_needed
        };

        let mut out = Vec::with_capacity(LOCAL_HEADER_SIZE + self.name.len() + extra_len as usize);
        out.extend_from_slice(&LOCAL_FILE_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&version.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.method.to_u16().to_le_bytes());
        out.extend_from_slice(&self.modified.dos_time().to_le_bytes());
        out.extend_from_slice(&self.modified.dos_date().to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&narrow(self.compressed_size, self.zip64).to_le_bytes());
        out.extend_from_slice(&narrow(self.uncompressed_size, self.zip64).to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&zip64_extra);
        out.extend_from_slice(&self.extra);
        Ok(out)
    }

    /// Write the record; returns the number of bytes written.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

/// ZIP central directory header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    /// Version made by.
    pub version_made_by: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time.
    pub modified: DosDateTime,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size, including any encryption header.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Disk number where the entry starts.
    pub disk_start: u32,
    /// Internal file attributes.
    pub internal_attributes: u16,
    /// External file attributes.
    pub external_attributes: u32,
    /// Offset of the matching local header.
    pub header_offset: u64,
    /// Encoded file name.
    pub name: Vec<u8>,
    /// Extra field blocks other than Zip64.
    pub extra: Vec<u8>,
    /// Encoded file comment.
    pub comment: Vec<u8>,
    /// Write every size and offset field through the Zip64 extra field,
    /// even when it would fit.
    pub force_zip64: bool,
}

impl CentralDirectoryHeader {
    /// Build the directory record for an entry from the local header that
    /// was written for it. Deferred CRC and sizes come from the descriptor.
    pub fn from_local(
        local: &LocalFileHeader,
        descriptor: Option<&DataDescriptor>,
        header_offset: u64,
    ) -> Self {
        let (crc32, compressed_size, uncompressed_size) = match descriptor {
            Some(desc) => (desc.crc32, desc.compressed_size, desc.uncompressed_size),
            None => (local.crc32, local.compressed_size, local.uncompressed_size),
        };
        Self {
            version_made_by: VERSION_MADE_BY,
            version_needed: local.version_needed,
            flags: local.flags,
            method: local.method,
            modified: local.modified,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            header_offset,
            name: local.name.clone(),
            extra: local.extra.clone(),
            comment: Vec::new(),
            force_zip64: local.zip64,
        }
    }

    /// Read a central directory header, signature included.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CENTRAL_HEADER_SIZE];
        read_record(reader, &mut buf)?;

        let signature = le_u32(&buf, 0);
        if signature != CENTRAL_DIR_HEADER_SIG {
            return Err(OxiZipError::invalid_signature(CENTRAL_DIR_HEADER_SIG, signature));
        }

        let compressed_size = le_u32(&buf, 20);
        let uncompressed_size = le_u32(&buf, 24);
        let name_len = le_u16(&buf, 28) as usize;
        let extra_len = le_u16(&buf, 30) as usize;
        let comment_len = le_u16(&buf, 32) as usize;
        let disk_start = le_u16(&buf, 34);
        let header_offset = le_u32(&buf, 42);

        let name = read_vec(reader, name_len)?;
        let raw_extra = read_vec(reader, extra_len)?;
        let comment = read_vec(reader, comment_len)?;

        let uncompressed_marked = uncompressed_size == ZIP64_MARKER_32;
        let compressed_marked = compressed_size == ZIP64_MARKER_32;
        let offset_marked = header_offset == ZIP64_MARKER_32;
        let disk_marked = disk_start == ZIP64_MARKER_16;
        let zip64 = Zip64ExtraField::parse(
            &raw_extra,
            uncompressed_marked,
            compressed_marked,
            offset_marked,
            disk_marked,
        )?;
        let any_marked = uncompressed_marked || compressed_marked || offset_marked || disk_marked;
        let zip64 = match zip64 {
            Some(field) => field,
            None if any_marked => {
                return Err(OxiZipError::invalid_header(
                    "central header has Zip64 markers but no Zip64 extra field",
                ));
            }
            None => Zip64ExtraField::default(),
        };

        Ok(Self {
            version_made_by: le_u16(&buf, 4),
            version_needed: le_u16(&buf, 6),
            flags: le_u16(&buf, 8),
            method: CompressionMethod::from_u16(le_u16(&buf, 10)),
            modified: DosDateTime::from_parts(le_u16(&buf, 12), le_u16(&buf, 14)),
            crc32: le_u32(&buf, 16),
            compressed_size: zip64.compressed_size.unwrap_or(u64::from(compressed_size)),
            uncompressed_size: zip64.uncompressed_size.unwrap_or(u64::from(uncompressed_size)),
            disk_start: zip64.disk_start.unwrap_or(u32::from(disk_start)),
            internal_attributes: le_u16(&buf, 36),
            external_attributes: le_u32(&buf, 38),
            header_offset: zip64.header_offset.unwrap_or(u64::from(header_offset)),
            name,
            extra: Zip64ExtraField::strip(&raw_extra),
            comment,
            force_zip64: any_marked,
        })
    }

    /// True if any size or offset exceeds its 32-bit field.
    pub fn needs_zip64(&self) -> bool {
        exceeds_32(self.compressed_size)
            || exceeds_32(self.uncompressed_size)
            || exceeds_32(self.header_offset)
    }

    /// True if the record describes a directory.
    pub fn is_directory(&self) -> bool {
        self.name.last() == Some(&b'/') || self.external_attributes & 0x10 != 0
    }

    /// Encode the record.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let uncompressed_marked = self.force_zip64 || exceeds_32(self.uncompressed_size);
        let compressed_marked = self.force_zip64 || exceeds_32(self.compressed_size);
        let offset_marked = self.force_zip64 || exceeds_32(self.header_offset);
        let zip64_extra = Zip64ExtraField {
            uncompressed_size: uncompressed_marked.then_some(self.uncompressed_size),
            compressed_size: compressed_marked.then_some(self.compressed_size),
            header_offset: offset_marked.then_some(self.header_offset),
            disk_start: None,
        }
        .build();
        let version_needed = if zip64_extra.is_empty() {
            self.version_needed
        } else {
            self.version_needed.max(VERSION_ZIP64)
        };

        let name_len = field_len(self.name.len(), "file name")?;
        let extra_len = field_len(zip64_extra.len() + self.extra.len(), "extra field")?;
        let comment_len = field_len(self.comment.len(), "file comment")?;
        let disk_start = u16::try_from(self.disk_start)
            .map_err(|_| OxiZipError::invalid_header("disk number out of range"))?;

        let mut out = Vec::with_capacity(
            CENTRAL_HEADER_SIZE + self.name.len() + extra_len as usize + self.comment.len(),
        );
        out.extend_from_slice(&CENTRAL_DIR_HEADER_SIG.to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&version_needed.to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.method.to_u16().to_le_bytes());
        out.extend_from_slice(&self.modified.dos_time().to_le_bytes());
        out.extend_from_slice(&self.modified.dos_date().to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        out.extend_from_slice(&narrow(self.compressed_size, compressed_marked).to_le_bytes());
        out.extend_from_slice(&narrow(self.uncompressed_size, uncompressed_marked).to_le_bytes());
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&extra_len.to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&disk_start.to_le_bytes());
        out.extend_from_slice(&self.internal_attributes.to_le_bytes());
        out.extend_from_slice(&self.external_attributes.to_le_bytes());
        out.extend_from_slice(&narrow(self.header_offset, offset_marked).to_le_bytes());
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&zip64_extra);
        out.extend_from_slice(&self.extra);
        out.extend_from_slice(&self.comment);
        Ok(out)
    }

    /// Write the record; returns the number of bytes written.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }
}

/// End of central directory record, with Zip64 values already applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Number of this disk.
    pub disk_number: u32,
    /// Disk where the central directory starts.
    pub directory_disk: u32,
    /// Directory records on this disk.
    pub entries_on_disk: u64,
    /// Total directory records.
    pub total_entries: u64,
    /// Size of the central directory in bytes.
    pub directory_size: u64,
    /// Offset of the first directory record.
    pub directory_offset: u64,
    /// Encoded archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Read the 32-bit record at the current position, signature included.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; EOCD_SIZE];
        read_record(reader, &mut buf)?;
        let signature = le_u32(&buf, 0);
        if signature != END_OF_CENTRAL_DIR_SIG {
            return Err(OxiZipError::invalid_signature(END_OF_CENTRAL_DIR_SIG, signature));
        }
        let comment_len = le_u16(&buf, 20) as usize;
        Ok(Self {
            disk_number: u32::from(le_u16(&buf, 4)),
            directory_disk: u32::from(le_u16(&buf, 6)),
            entries_on_disk: u64::from(le_u16(&buf, 8)),
            total_entries: u64::from(le_u16(&buf, 10)),
            directory_size: u64::from(le_u32(&buf, 12)),
            directory_offset: u64::from(le_u32(&buf, 16)),
            comment: read_vec(reader, comment_len)?,
        })
    }

    /// True if any field holds a Zip64 marker.
    pub fn has_markers(&self) -> bool {
        self.entries_on_disk == u64::from(ZIP64_MARKER_16)
            || self.total_entries == u64::from(ZIP64_MARKER_16)
            || self.directory_size == u64::from(ZIP64_MARKER_32)
            || self.directory_offset == u64::from(ZIP64_MARKER_32)
    }

    /// True if a value does not fit the 32-bit record.
    pub fn needs_zip64(&self) -> bool {
        self.total_entries >= u64::from(ZIP64_MARKER_16)
            || exceeds_32(self.directory_size)
            || exceeds_32(self.directory_offset)
    }

    /// Find the record by searching backwards from the end of the stream,
    /// then apply the Zip64 record if a locator precedes it.
    ///
    /// Returns the offset of the 32-bit record and the resolved values.
    pub fn locate<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<(u64, Self)> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        let search_start = file_size.saturating_sub((MAX_COMMENT_LEN + EOCD_SIZE) as u64);
        reader.seek(SeekFrom::Start(search_start))?;
        let mut tail = Vec::with_capacity((file_size - search_start) as usize);
        reader.read_to_end(&mut tail)?;

        // Prefer a record whose comment reaches exactly to the end of the
        // stream; a signature inside the comment itself fails that test.
        let signature = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let mut fallback = None;
        let mut search_end = tail.len();
        let exact = loop {
            let Some(pos) = tail[..search_end].windows(4).rposition(|w| w == signature) else {
                break None;
            };
            if pos + EOCD_SIZE <= tail.len() {
                if pos + EOCD_SIZE + le_u16(&tail, pos + 20) as usize == tail.len() {
                    break Some(pos);
                }
                fallback.get_or_insert(pos);
            }
            search_end = pos + 3;
        };
        let Some(pos) = exact.or(fallback) else {
            return Err(OxiZipError::invalid_header("End of central directory not found"));
        };

        let eocd_offset = search_start + pos as u64;
        let mut eocd = Self::read(&mut &tail[pos..])?;

        if eocd_offset >= ZIP64_LOCATOR_SIZE as u64 {
            reader.seek(SeekFrom::Start(eocd_offset - ZIP64_LOCATOR_SIZE as u64))?;
            if Signature::peek(reader)? == Some(Signature::Zip64Locator) {
                let locator = Zip64Locator::read(reader)?;
                reader.seek(SeekFrom::Start(locator.end_of_directory_offset))?;
                let record = Zip64EndOfCentralDirectory::read(reader)?;
                eocd.disk_number = record.disk_number;
                eocd.directory_disk = record.directory_disk;
                eocd.entries_on_disk = record.entries_on_disk;
                eocd.total_entries = record.total_entries;
                eocd.directory_size = record.directory_size;
                eocd.directory_offset = record.directory_offset;
            }
        }

        Ok((eocd_offset, eocd))
    }

    /// Write the 32-bit record. With `zip64` set every count and offset is
    /// written as a marker; otherwise values that do not fit are an error.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W, zip64: bool) -> Result<usize> {
        if !zip64 && self.needs_zip64() {
            return Err(OxiZipError::inconsistent(
                "central directory needs Zip64 but Zip64 records are disabled",
            ));
        }
        let comment_len = field_len(self.comment.len(), "archive comment")?;
        let count = |value: u64| if zip64 { ZIP64_MARKER_16 } else { value as u16 };
        let disk = |value: u32| if zip64 { ZIP64_MARKER_16 } else { value as u16 };

        let mut out = Vec::with_capacity(EOCD_SIZE + self.comment.len());
        out.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        out.extend_from_slice(&disk(self.disk_number).to_le_bytes());
        out.extend_from_slice(&disk(self.directory_disk).to_le_bytes());
        out.extend_from_slice(&count(self.entries_on_disk).to_le_bytes());
        out.extend_from_slice(&count(self.total_entries).to_le_bytes());
        out.extend_from_slice(&narrow(self.directory_size, zip64).to_le_bytes());
        out.extend_from_slice(&narrow(self.directory_offset, zip64).to_le_bytes());
        out.extend_from_slice(&comment_len.to_le_bytes());
        out.extend_from_slice(&self.comment);
        writer.write_all(&out)?;
        Ok(out.len())
    }
}

/// Zip64 end of central directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64EndOfCentralDirectory {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk_number: u32,
    /// Disk where the central directory starts.
    pub directory_disk: u32,
    /// Directory records on this disk.
    pub entries_on_disk: u64,
    /// Total directory records.
    pub total_entries: u64,
    /// Size of the central directory.
    pub directory_size: u64,
    /// Offset of the first directory record.
    pub directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    /// Record for a single-disk archive.
    pub fn new(total_entries: u64, directory_size: u64, directory_offset: u64) -> Self {
        Self {
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_ZIP64,
            disk_number: 0,
            directory_disk: 0,
            entries_on_disk: total_entries,
            total_entries,
            directory_size,
            directory_offset,
        }
    }

    /// Read the record, signature included. Any extensible data sector
    /// is skipped.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; ZIP64_EOCD_SIZE];
        read_record(reader, &mut buf)?;
        let signature = le_u32(&buf, 0);
        if signature != ZIP64_END_OF_CENTRAL_DIR_SIG {
            return Err(OxiZipError::invalid_signature(ZIP64_END_OF_CENTRAL_DIR_SIG, signature));
        }
        let record_size = le_u64(&buf, 4);
        if record_size < (ZIP64_EOCD_SIZE - 12) as u64 {
            return Err(OxiZipError::invalid_header("Zip64 end of central directory too short"));
        }
        Ok(Self {
            version_made_by: le_u16(&buf, 12),
            version_needed: le_u16(&buf, 14),
            disk_number: le_u32(&buf, 16),
            directory_disk: le_u32(&buf, 20),
            entries_on_disk: le_u64(&buf, 24),
            total_entries: le_u64(&buf, 32),
            directory_size: le_u64(&buf, 40),
            directory_offset: le_u64(&buf, 48),
        })
    }

    /// Write the record.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize> {
        let mut out = Vec::with_capacity(ZIP64_EOCD_SIZE);
        out.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        out.extend_from_slice(&((ZIP64_EOCD_SIZE - 12) as u64).to_le_bytes());
        out.extend_from_slice(&self.version_made_by.to_le_bytes());
        out.extend_from_slice(&self.version_needed.to_le_bytes());
        out.extend_from_slice(&self.disk_number.to_le_bytes());
        out.extend_from_slice(&self.directory_disk.to_le_bytes());
        out.extend_from_slice(&self.entries_on_disk.to_le_bytes());
        out.extend_from_slice(&self.total_entries.to_le_bytes());
        out.extend_from_slice(&self.directory_size.to_le_bytes());
        out.extend_from_slice(&self.directory_offset.to_le_bytes());
        writer.write_all(&out)?;
        Ok(out.len())
    }
}

/// Zip64 end of central directory locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Locator {
    /// Disk holding the Zip64 record.
    pub directory_disk: u32,
    /// Offset of the Zip64 end of central directory record.
    pub end_of_directory_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Zip64Locator {
    /// Locator for a single-disk archive.
    pub fn new(end_of_directory_offset: u64) -> Self {
        Self {
            directory_disk: 0,
            end_of_directory_offset,
            total_disks: 1,
        }
    }

    /// Read the locator, signature included.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; ZIP64_LOCATOR_SIZE];
        read_record(reader, &mut buf)?;
        let signature = le_u32(&buf, 0);
        if signature != ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG {
            return Err(OxiZipError::invalid_signature(
                ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG,
                signature,
            ));
        }
        Ok(Self {
            directory_disk: le_u32(&buf, 4),
            end_of_directory_offset: le_u64(&buf, 8),
            total_disks: le_u32(&buf, 16),
        })
    }

    /// Write the locator.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<usize> {
        let mut out = Vec::with_capacity(ZIP64_LOCATOR_SIZE);
        out.extend_from_slice(&ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG.to_le_bytes());
        out.extend_from_slice(&self.directory_disk.to_le_bytes());
        out.extend_from_slice(&self.end_of_directory_offset.to_le_bytes());
        out.extend_from_slice(&self.total_disks.to_le_bytes());
        writer.write_all(&out)?;
        Ok(out.len())
    }
}

/// Data descriptor written after a payload whose sizes were deferred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDescriptor {
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size, including any encryption header.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    /// Encoded length, signature included.
    pub fn encoded_len(zip64: bool) -> usize {
        if zip64 { 24 } else { 16 }
    }

    /// Locate the descriptor that follows the payload starting at the
    /// current position.
    ///
    /// This is a linear search that stops at the first occurrence of the
    /// descriptor signature, so a payload that happens to contain those
    /// four bytes ends early. Callers should compare the recorded size with
    /// the returned payload length. The reader is left at the payload
    /// start.
    ///
    /// Returns the descriptor and the payload length.
    pub fn scan<R: Read + Seek + ?Sized>(reader: &mut R, zip64: bool) -> Result<(Self, u64)> {
        let start = reader.stream_position()?;
        let signature = DATA_DESCRIPTOR_SIG.to_le_bytes();
        let mut buf = vec![0u8; SCAN_CHUNK + 3];
        let mut carried = 0usize;
        let mut base = start;

        loop {
            let n = reader.read(&mut buf[carried..])?;
            if n == 0 {
                return Err(OxiZipError::corrupted(start, "data descriptor signature not found"));
            }
            let filled = carried + n;
            if let Some(i) = buf[..filled].windows(4).position(|w| w == signature) {
                let found = base + i as u64;
                reader.seek(SeekFrom::Start(found))?;
                let descriptor = Self::read(reader, zip64)?;
                reader.seek(SeekFrom::Start(start))?;
                return Ok((descriptor, found - start));
            }
            let keep = filled.min(3);
            buf.copy_within(filled - keep..filled, 0);
            base += (filled - keep) as u64;
            carried = keep;
        }
    }

    /// Read a signed descriptor.
    pub fn read<R: Read + ?Sized>(reader: &mut R, zip64: bool) -> Result<Self> {
        Signature::expect(reader, DATA_DESCRIPTOR_SIG)?;
        let mut buf = [0u8; 20];
        let body = &mut buf[..Self::encoded_len(zip64) - 4];
        read_record(reader, body)?;
        let crc32 = le_u32(body, 0);
        let (compressed_size, uncompressed_size) = if zip64 {
            (le_u64(body, 4), le_u64(body, 12))
        } else {
            (u64::from(le_u32(body, 4)), u64::from(le_u32(body, 8)))
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }

    /// Write a signed descriptor.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W, zip64: bool) -> Result<usize> {
        if !zip64 && (exceeds_32(self.compressed_size) || exceeds_32(self.uncompressed_size)) {
            return Err(OxiZipError::inconsistent(
                "data descriptor needs Zip64 but the entry is not in Zip64 form",
            ));
        }
        let mut out = Vec::with_capacity(Self::encoded_len(zip64));
        out.extend_from_slice(&DATA_DESCRIPTOR_SIG.to_le_bytes());
        out.extend_from_slice(&self.crc32.to_le_bytes());
        if zip64 {
            out.extend_from_slice(&self.compressed_size.to_le_bytes());
            out.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        } else {
            out.extend_from_slice(&(self.compressed_size as u32).to_le_bytes());
            out.extend_from_slice(&(self.uncompressed_size as u32).to_le_bytes());
        }
        writer.write_all(&out)?;
        Ok(out.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_local() -> LocalFileHeader {
        LocalFileHeader {
            version_needed: VERSION_DEFAULT,
            flags: 0,
            method: CompressionMethod::Deflate,
            modified: DosDateTime::unpack(0x585D_6DAF),
            crc32: 0xCAFEBABE,
            compressed_size: 123,
            uncompressed_size: 456,
            name: b"dir/file.txt".to_vec(),
            extra: vec![0x55, 0x54, 0x01, 0x00, 0x07],
            zip64: false,
        }
    }

    #[test]
    fn test_local_header_layout() {
        let bytes = sample_local().to_bytes().unwrap();
        assert_eq!(bytes.len(), LOCAL_HEADER_SIZE + 12 + 5);
        assert_eq!(&bytes[..4], b"PK\x03\x04");
        assert_eq!(le_u16(&bytes, 4), 20);
        assert_eq!(le_u16(&bytes, 8), 8);
        assert_eq!(le_u32(&bytes, 14), 0xCAFEBABE);
        assert_eq!(le_u32(&bytes, 18), 123);
        assert_eq!(le_u32(&bytes, 22), 456);
        assert_eq!(le_u16(&bytes, 26), 12);
        assert_eq!(&bytes[30..42], b"dir/file.txt");

        let parsed = LocalFileHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, sample_local());
    }

    #[test]
    fn test_local_header_zip64() {
        let mut header = sample_local();
        header.zip64 = true;
        header.uncompressed_size = 5_000_000_000;
        let bytes = header.to_bytes().unwrap();
        assert_eq!(le_u16(&bytes, 4), VERSION_ZIP64);
        assert_eq!(le_u32(&bytes, 18), ZIP64_MARKER_32);
        assert_eq!(le_u32(&bytes, 22), ZIP64_MARKER_32);

        let parsed = LocalFileHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.uncompressed_size, 5_000_000_000);
        assert_eq!(parsed.compressed_size, 123);
        assert!(parsed.zip64);
        assert_eq!(parsed.extra, header.extra);
    }

    #[test]
    fn test_local_header_overflow_without_zip64() {
        let mut header = sample_local();
        header.uncompressed_size = 1 << 32;
        assert!(matches!(
            header.to_bytes(),
            Err(OxiZipError::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_wrong_signature() {
        let mut bytes = sample_local().to_bytes().unwrap();
        bytes[2] = 0x01;
        bytes[3] = 0x02;
        let err = LocalFileHeader::read(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, OxiZipError::InvalidSignature { .. }));
    }

    #[test]
    fn test_truncated_header() {
        let bytes = sample_local().to_bytes().unwrap();
        let err = LocalFileHeader::read(&mut &bytes[..20]).unwrap_err();
        assert!(matches!(err, OxiZipError::UnexpectedEof { expected: 30 }));
        assert!(err.is_corruption());
    }

    #[test]
    fn test_central_header_from_local() {
        let local = sample_local();
        let mut central = CentralDirectoryHeader::from_local(&local, None, 77);
        central.comment = b"note".to_vec();
        central.external_attributes = 0o100644 << 16;
        let bytes = central.to_bytes().unwrap();
        assert_eq!(bytes.len(), CENTRAL_HEADER_SIZE + 12 + 5 + 4);
        assert_eq!(le_u32(&bytes, 42), 77);

        let parsed = CentralDirectoryHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed, central);
        assert!(!parsed.is_directory());
    }

    #[test]
    fn test_central_header_per_field_zip64() {
        let mut central = CentralDirectoryHeader::from_local(&sample_local(), None, 6_000_000_000);
        assert!(central.needs_zip64());
        let bytes = central.to_bytes().unwrap();
        assert_eq!(le_u32(&bytes, 20), 123);
        assert_eq!(le_u32(&bytes, 42), ZIP64_MARKER_32);
        let parsed = CentralDirectoryHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(parsed.header_offset, 6_000_000_000);
        assert_eq!(parsed.compressed_size, 123);

        central.header_offset = 10;
        central.force_zip64 = true;
        let bytes = central.to_bytes().unwrap();
        assert_eq!(le_u32(&bytes, 20), ZIP64_MARKER_32);
        let parsed = CentralDirectoryHeader::read(&mut bytes.as_slice()).unwrap();
        assert_eq!(
            (parsed.compressed_size, parsed.uncompressed_size, parsed.header_offset),
            (123, 456, 10)
        );
    }

    #[test]
    fn test_zip64_extra_field() {
        let field = Zip64ExtraField {
            uncompressed_size: Some(1),
            compressed_size: None,
            header_offset: Some(3),
            disk_start: None,
        };
        let mut extra = vec![0x0A, 0x00, 0x02, 0x00, 0xAA, 0xBB];
        extra.extend(field.build());
        assert_eq!(
            Zip64ExtraField::parse(&extra, true, false, true, false).unwrap(),
            Some(field)
        );
        assert_eq!(Zip64ExtraField::strip(&extra), [0x0A, 0x00, 0x02, 0x00, 0xAA, 0xBB]);
        assert!(Zip64ExtraField::parse(&extra, true, true, true, false).is_err());
        assert_eq!(Zip64ExtraField::parse(&[], true, false, false, false).unwrap(), None);
    }

    #[test]
    fn test_signature_peek() {
        let mut cursor = Cursor::new(vec![0x50, 0x4B, 0x01, 0x02, 0xFF]);
        assert_eq!(
            Signature::peek(&mut cursor).unwrap(),
            Some(Signature::CentralDirectory)
        );
        assert_eq!(cursor.position(), 0);

        cursor.set_position(3);
        assert_eq!(Signature::peek(&mut cursor).unwrap(), None);
        assert_eq!(cursor.position(), 3);
        assert_eq!(Signature::from_u32(0x12345678), Signature::Unknown(0x12345678));
    }

    #[test]
    fn test_data_descriptor_scan() {
        let mut stream = vec![0x11u8; 20_000];
        let descriptor = DataDescriptor {
            crc32: 0xDEADBEEF,
            compressed_size: 20_000,
            uncompressed_size: 30_000,
        };
        descriptor.write(&mut stream, false).unwrap();
        stream.extend_from_slice(b"PK\x01\x02");

        let mut cursor = Cursor::new(stream);
        let (found, len) = DataDescriptor::scan(&mut cursor, false).unwrap();
        assert_eq!(found, descriptor);
        assert_eq!(len, 20_000);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_data_descriptor_scan_stops_at_first_signature() {
        let mut stream = b"abcPK\x07\x08".to_vec();
        stream.extend_from_slice(&[0u8; 12]);
        stream.extend_from_slice(b"more payload");
        DataDescriptor {
            crc32: 1,
            compressed_size: 31,
            uncompressed_size: 31,
        }
        .write(&mut stream, false)
        .unwrap();

        let (found, len) = DataDescriptor::scan(&mut Cursor::new(stream), false).unwrap();
        assert_eq!(len, 3);
        assert_ne!(found.compressed_size, len);
    }

    #[test]
    fn test_data_descriptor_zip64_form() {
        let descriptor = DataDescriptor {
            crc32: 7,
            compressed_size: 5_000_000_000,
            uncompressed_size: 6_000_000_000,
        };
        let mut bytes = Vec::new();
        assert_eq!(descriptor.write(&mut bytes, true).unwrap(), 24);
        assert_eq!(DataDescriptor::read(&mut bytes.as_slice(), true).unwrap(), descriptor);
        assert!(descriptor.write(&mut Vec::new(), false).is_err());
    }

    #[test]
    fn test_eocd_locate_with_comment() {
        let mut bytes = vec![0u8; 100];
        let eocd = EndOfCentralDirectory {
            entries_on_disk: 2,
            total_entries: 2,
            directory_size: 90,
            directory_offset: 10,
            comment: b"archive comment with PK\x05\x06 inside".to_vec(),
            ..Default::default()
        };
        eocd.write(&mut bytes, false).unwrap();

        let (offset, found) = EndOfCentralDirectory::locate(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(offset, 100);
        assert_eq!(found, eocd);
    }

    #[test]
    fn test_eocd_locate_zip64() {
        let mut bytes = vec![0u8; 64];
        let record = Zip64EndOfCentralDirectory::new(70_000, 1234, 64);
        let record_offset = bytes.len() as u64 + 1234;
        bytes.resize(record_offset as usize, 0);
        record.write(&mut bytes).unwrap();
        Zip64Locator::new(record_offset).write(&mut bytes).unwrap();
        let eocd = EndOfCentralDirectory {
            entries_on_disk: 70_000,
            total_entries: 70_000,
            directory_size: 1234,
            directory_offset: 64,
            ..Default::default()
        };
        assert!(eocd.needs_zip64());
        assert!(eocd.write(&mut Vec::new(), false).is_err());
        eocd.write(&mut bytes, true).unwrap();

        let (_, found) = EndOfCentralDirectory::locate(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(found.total_entries, 70_000);
        assert_eq!(found.directory_size, 1234);
        assert_eq!(found.directory_offset, 64);
    }

    #[test]
    fn test_eocd_missing() {
        let err = EndOfCentralDirectory::locate(&mut Cursor::new(vec![0u8; 50])).unwrap_err();
        assert!(matches!(err, OxiZipError::InvalidHeader { .. }));
    }
}
