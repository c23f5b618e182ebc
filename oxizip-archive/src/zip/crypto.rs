//! Traditional PKWARE encryption (ZipCrypto).
//!
//! The cipher keeps three 32-bit key registers. Each byte is XORed with a
//! keystream byte derived from the third register, and the registers are
//! then advanced with the *plaintext* byte, so encryption and decryption
//! walk the same key schedule.
//!
//! **Security Warning**: this cipher is weak and open to known-plaintext
//! attacks. It exists for compatibility with archives that use it.
//!
//! ## Password check
//!
//! An encrypted payload starts with a 12-byte header: eleven random bytes
//! and a check byte, all encrypted. After decryption the check byte must
//! equal the expected value (the high byte of the entry CRC-32, or of the
//! DOS time when sizes are deferred to a data descriptor). A mismatch is a
//! wrong password and is reported before any payload byte is decrypted.
//!
//! ```rust
//! use oxizip_archive::zip::crypto::ZipCrypto;
//!
//! let mut cipher = ZipCrypto::new(b"secret");
//! let header = cipher.encryption_header(0xAB, 42);
//! let mut data = *b"payload";
//! cipher.encrypt_buffer(&mut data);
//!
//! let mut cipher = ZipCrypto::new(b"secret");
//! cipher.check_header(&header, 0xAB).unwrap();
//! cipher.decrypt_buffer(&mut data);
//! assert_eq!(&data, b"payload");
//! ```

use oxizip_core::crc::crc32_update;
use oxizip_core::error::{OxiZipError, Result};
use std::io::{self, Read, Write};

const INITIAL_KEY0: u32 = 0x12345678;
const INITIAL_KEY1: u32 = 0x23456789;
const INITIAL_KEY2: u32 = 0x34567890;

/// Size of the encryption header in bytes.
pub const ENCRYPTION_HEADER_SIZE: usize = 12;

/// ZipCrypto cipher state for one entry.
#[derive(Debug, Clone)]
pub struct ZipCrypto {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl ZipCrypto {
    /// Initialize the key schedule from a password.
    #[must_use]
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self {
            key0: INITIAL_KEY0,
            key1: INITIAL_KEY1,
            key2: INITIAL_KEY2,
        };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    /// Check byte an entry's header must carry.
    ///
    /// Entries whose sizes follow the payload in a data descriptor are
    /// checked against the high byte of the DOS time, since the CRC is not
    /// known when the header is produced by a streaming writer.
    pub fn check_byte(crc32: u32, dos_time: u16, deferred_sizes: bool) -> u8 {
        if deferred_sizes {
            (dos_time >> 8) as u8
        } else {
            (crc32 >> 24) as u8
        }
    }

    #[inline]
    fn update_keys(&mut self, byte: u8) {
        self.key0 = crc32_update(self.key0, byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xFF)
            .wrapping_mul(0x08088405)
            .wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Encrypt one byte.
    #[inline]
    pub fn encrypt_byte(&mut self, byte: u8) -> u8 {
        let cipher_byte = byte ^ self.stream_byte();
        self.update_keys(byte);
        cipher_byte
    }

    /// Decrypt one byte.
    #[inline]
    pub fn decrypt_byte(&mut self, byte: u8) -> u8 {
        let plain_byte = byte ^ self.stream_byte();
        self.update_keys(plain_byte);
        plain_byte
    }

    /// Encrypt a buffer in place.
    pub fn encrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
    }

    /// Decrypt a buffer in place.
    pub fn decrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
    }

    /// Produce the encrypted 12-byte header, advancing the cipher past it.
    ///
    /// The eleven filler bytes come from a small LCG seeded with `seed`.
    pub fn encryption_header(&mut self, check_byte: u8, seed: u64) -> [u8; ENCRYPTION_HEADER_SIZE] {
        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        let mut state = seed;
        for byte in header.iter_mut().take(ENCRYPTION_HEADER_SIZE - 1) {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *byte = (state >> 56) as u8;
        }
        header[ENCRYPTION_HEADER_SIZE - 1] = check_byte;
        self.encrypt_buffer(&mut header);
        header
    }

    /// Decrypt a header and verify its check byte.
    ///
    /// The cipher is advanced past the header either way; on mismatch the
    /// state is useless and the caller must stop.
    pub fn check_header(&mut self, header: &[u8; ENCRYPTION_HEADER_SIZE], check_byte: u8) -> Result<()> {
        let mut plain = *header;
        self.decrypt_buffer(&mut plain);
        if plain[ENCRYPTION_HEADER_SIZE - 1] != check_byte {
            return Err(OxiZipError::bad_password(String::new()));
        }
        Ok(())
    }

    /// Current key registers.
    #[must_use]
    pub fn keys(&self) -> (u32, u32, u32) {
        (self.key0, self.key1, self.key2)
    }
}

impl Default for ZipCrypto {
    fn default() -> Self {
        Self::new(&[])
    }
}

/// Encrypting writer.
#[derive(Debug)]
pub struct ZipCryptoWriter<W: Write> {
    inner: W,
    cipher: ZipCrypto,
    scratch: Vec<u8>,
}

impl<W: Write> ZipCryptoWriter<W> {
    /// Wrap `inner` with a cipher that has already emitted its header.
    pub fn new(inner: W, cipher: ZipCrypto) -> Self {
        Self {
            inner,
            cipher,
            scratch: Vec::new(),
        }
    }

    /// Access the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ZipCryptoWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.scratch.clear();
        self.scratch.extend_from_slice(buf);
        self.cipher.encrypt_buffer(&mut self.scratch);
        self.inner.write_all(&self.scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypting reader.
#[derive(Debug)]
pub struct ZipCryptoReader<R: Read> {
    inner: R,
    cipher: ZipCrypto,
}

impl<R: Read> ZipCryptoReader<R> {
    /// Wrap `inner` with a cipher that has already consumed the header.
    pub fn new(inner: R, cipher: ZipCrypto) -> Self {
        Self { inner, cipher }
    }

    /// Unwrap the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ZipCryptoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.decrypt_buffer(&mut buf[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_password_keeps_initial_keys() {
        let cipher = ZipCrypto::new(b"");
        assert_eq!(cipher.keys(), (INITIAL_KEY0, INITIAL_KEY1, INITIAL_KEY2));
    }

    #[test]
    fn test_known_key_schedule() {
        let cipher = ZipCrypto::new(b"p@ss");
        assert_eq!(cipher.keys(), (0x58927F21, 0xC0B74FB5, 0x8297062B));

        let mut cipher = ZipCrypto::new(b"p@ss");
        let mut data = *b"hello world";
        cipher.encrypt_buffer(&mut data);
        assert_eq!(
            data,
            [0x6D, 0x08, 0x97, 0xD9, 0xCD, 0xAD, 0x41, 0xAE, 0x1C, 0x25, 0x3F]
        );
    }

    #[test]
    fn test_roundtrip_buffer() {
        let plaintext: Vec<u8> = (0..1000u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut data = plaintext.clone();
        ZipCrypto::new(b"key").encrypt_buffer(&mut data);
        assert_ne!(data, plaintext);
        ZipCrypto::new(b"key").decrypt_buffer(&mut data);
        assert_eq!(data, plaintext);
    }

    #[test]
    fn test_header_check() {
        let crc = 0xDEADBEEF;
        let check = ZipCrypto::check_byte(crc, 0, false);
        assert_eq!(check, 0xDE);
        let header = ZipCrypto::new(b"correct").encryption_header(check, 7);

        assert!(ZipCrypto::new(b"correct").check_header(&header, check).is_ok());
        let err = ZipCrypto::new(b"wrong").check_header(&header, check).unwrap_err();
        assert!(err.is_bad_password());
    }

    #[test]
    fn test_check_byte_uses_time_for_deferred_sizes() {
        assert_eq!(ZipCrypto::check_byte(0x12345678, 0xABCD, true), 0xAB);
        assert_eq!(ZipCrypto::check_byte(0x12345678, 0xABCD, false), 0x12);
    }

    #[test]
    fn test_writer_reader_roundtrip() {
        let plaintext = b"Data to encrypt via writer";
        let mut cipher = ZipCrypto::new(b"secret");
        let header = cipher.encryption_header(0x12, 99);

        let mut writer = ZipCryptoWriter::new(Vec::new(), cipher);
        writer.write_all(&plaintext[..5]).unwrap();
        writer.write_all(&plaintext[5..]).unwrap();
        let encrypted = writer.into_inner();
        assert_eq!(encrypted.len(), plaintext.len());

        let mut cipher = ZipCrypto::new(b"secret");
        cipher.check_header(&header, 0x12).unwrap();
        let mut reader = ZipCryptoReader::new(encrypted.as_slice(), cipher);
        let mut decrypted = Vec::new();
        reader.read_to_end(&mut decrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }
}
