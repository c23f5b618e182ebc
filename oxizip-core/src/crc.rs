//! CRC-32 (ISO 3309, reflected polynomial 0xEDB88320).
//!
//! Used for per-entry integrity in ZIP archives and as the mixing function
//! of the traditional ZIP stream cipher key schedule.
//!
//! ## Performance
//!
//! Buffers of 16 bytes or more go through a slicing-by-8 loop that folds
//! eight bytes per iteration using eight pre-computed tables; shorter
//! buffers use the single-table byte loop.

/// CRC-32 slicing-by-8 lookup tables. Table 0 is the classic byte table.
const CRC32_TABLES: [[u32; 256]; 8] = {
    let mut tables = [[0u32; 256]; 8];

    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }

    let mut t = 1usize;
    while t < 8 {
        let mut i = 0usize;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = (prev >> 8) ^ tables[0][(prev & 0xFF) as usize];
            i += 1;
        }
        t += 1;
    }

    tables
};

/// Fold one byte into a raw (non-finalized) CRC-32 register.
///
/// This is the `crc32(c, b)` primitive of the PKZIP key schedule, which
/// works on the register directly without the final complement.
#[inline(always)]
pub fn crc32_update(crc: u32, byte: u8) -> u32 {
    CRC32_TABLES[0][((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
}

/// Streaming CRC-32 calculator.
///
/// Tracks the number of bytes folded alongside the register so callers that
/// need both the checksum and the size of a stream get them in one pass.
///
/// # Example
///
/// ```rust
/// use oxizip_core::crc::Crc32;
///
/// let mut crc = Crc32::new();
/// assert_eq!(crc.update(b"Hello, "), 7);
/// crc.update(b"World!");
/// assert_eq!(crc.value(), 0xEC4AC3D0);
/// assert_eq!(crc.bytes_folded(), 13);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    crc: u32,
    count: u64,
}

impl Crc32 {
    /// Create a new CRC-32 calculator seeded with 0xFFFFFFFF.
    pub fn new() -> Self {
        Self {
            crc: 0xFFFFFFFF,
            count: 0,
        }
    }

    /// Reset the CRC to its initial state.
    pub fn reset(&mut self) {
        self.crc = 0xFFFFFFFF;
        self.count = 0;
    }

    /// Fold a single byte.
    #[inline]
    pub fn update_byte(&mut self, byte: u8) {
        self.crc = crc32_update(self.crc, byte);
        self.count += 1;
    }

    /// Fold a whole buffer, returning the number of bytes folded.
    #[inline]
    pub fn update(&mut self, data: &[u8]) -> usize {
        if data.len() >= 16 {
            self.crc = crc32_slice8(self.crc, data);
        } else {
            self.crc = crc32_bytes(self.crc, data);
        }
        self.count += data.len() as u64;
        data.len()
    }

    /// Finalized CRC value (the complement of the register).
    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.crc ^ 0xFFFFFFFF
    }

    /// Total number of bytes folded since creation or the last reset.
    #[inline(always)]
    pub fn bytes_folded(&self) -> u64 {
        self.count
    }

    /// Compute CRC-32 for a slice in one call.
    #[inline]
    pub fn compute(data: &[u8]) -> u32 {
        let mut crc = Self::new();
        crc.update(data);
        crc.value()
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn crc32_bytes(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = crc32_update(crc, byte);
    }
    crc
}

fn crc32_slice8(mut crc: u32, data: &[u8]) -> u32 {
    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let low = crc ^ u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        crc = CRC32_TABLES[7][(low & 0xFF) as usize]
            ^ CRC32_TABLES[6][((low >> 8) & 0xFF) as usize]
            ^ CRC32_TABLES[5][((low >> 16) & 0xFF) as usize]
            ^ CRC32_TABLES[4][(low >> 24) as usize]
            ^ CRC32_TABLES[3][chunk[4] as usize]
            ^ CRC32_TABLES[2][chunk[5] as usize]
            ^ CRC32_TABLES[1][chunk[6] as usize]
            ^ CRC32_TABLES[0][chunk[7] as usize];
    }
    crc32_bytes(crc, chunks.remainder())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_known_values() {
        assert_eq!(Crc32::compute(b""), 0);
        assert_eq!(Crc32::compute(b"123456789"), 0xCBF43926);
        assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
        assert_eq!(
            Crc32::compute(b"The quick brown fox jumps over the lazy dog"),
            0x414FA339
        );
    }

    #[test]
    fn test_slice8_matches_bytewise() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i * 7 + 3) as u8).collect();
        for len in [0, 1, 7, 8, 15, 16, 17, 63, 64, 999, 1000] {
            let fast = crc32_slice8(0xFFFFFFFF, &data[..len]);
            let slow = crc32_bytes(0xFFFFFFFF, &data[..len]);
            assert_eq!(fast, slow, "length {}", len);
        }
    }

    #[test]
    fn test_incremental_and_count() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut crc = Crc32::new();
        for chunk in data.chunks(5) {
            crc.update(chunk);
        }
        assert_eq!(crc.value(), Crc32::compute(data));
        assert_eq!(crc.bytes_folded(), data.len() as u64);

        let mut by_byte = Crc32::new();
        for &b in data.iter() {
            by_byte.update_byte(b);
        }
        assert_eq!(by_byte.value(), crc.value());

        crc.reset();
        assert_eq!(crc.value(), 0);
        assert_eq!(crc.bytes_folded(), 0);
    }

    #[test]
    fn test_raw_update_is_register_level() {
        // The register form does not complement, so folding from zero
        // differs from the finalized checksum.
        let reg = crc32_update(0x12345678, b'a');
        assert_eq!(reg, CRC32_TABLES[0][((0x12345678u32 ^ 0x61) & 0xFF) as usize] ^ 0x00123456);
    }
}
