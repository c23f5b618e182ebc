//! Bit-level accumulators for resumable codecs.
//!
//! Streaming codecs cannot own a `Read`/`Write` handle: the caller hands
//! them input and output slices of arbitrary size (down to one byte) and
//! expects every call to make whatever progress those slices allow. The two
//! types here therefore hold bits in memory between calls instead of pulling
//! from or pushing to an I/O object.
//!
//! # Bit Ordering
//!
//! DEFLATE uses LSB-first ordering within bytes: bits are packed starting
//! from the least significant bit of each byte.
//!
//! # Example
//!
//! ```
//! use oxizip_core::bitstream::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_bits(0b101, 3);
//! writer.write_bits(0b1100, 4);
//! writer.align_to_byte();
//!
//! let mut out = [0u8; 4];
//! let n = writer.drain_into(&mut out);
//! assert_eq!(n, 1);
//!
//! let mut reader = BitReader::new();
//! reader.push_byte(out[0]);
//! assert_eq!(reader.take(3), 0b101);
//! assert_eq!(reader.take(4), 0b1100);
//! ```

/// A push-fed bit accumulator.
///
/// The decoder feeds whole bytes with [`push_byte`](Self::push_byte) until
/// [`available`](Self::available) covers the field it needs, then peeks and
/// consumes. Nothing is lost when the input runs dry between two pushes.
#[derive(Debug, Clone, Default)]
pub struct BitReader {
    hold: u64,
    bits: u32,
}

impl BitReader {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered bits.
    #[inline(always)]
    pub fn available(&self) -> u32 {
        self.bits
    }

    /// Raw buffered bits, least significant first.
    #[inline(always)]
    pub fn hold(&self) -> u64 {
        self.hold
    }

    /// Append one byte above the buffered bits.
    #[inline]
    pub fn push_byte(&mut self, byte: u8) {
        debug_assert!(self.bits <= 56, "bit accumulator overflow");
        self.hold |= (byte as u64) << self.bits;
        self.bits += 8;
    }

    /// Look at the low `count` bits without consuming them.
    #[inline]
    pub fn peek(&self, count: u32) -> u32 {
        debug_assert!(count <= 32 && count <= self.bits);
        if count == 0 {
            return 0;
        }
        (self.hold & ((1u64 << count) - 1)) as u32
    }

    /// Drop the low `count` bits.
    #[inline]
    pub fn consume(&mut self, count: u32) {
        debug_assert!(count <= self.bits);
        self.hold >>= count;
        self.bits -= count;
    }

    /// Peek and consume `count` bits.
    #[inline]
    pub fn take(&mut self, count: u32) -> u32 {
        let value = self.peek(count);
        self.consume(count);
        value
    }

    /// Discard bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let extra = self.bits & 7;
        self.consume(extra);
    }

    /// Pop one whole buffered byte, if the accumulator is byte aligned and
    /// holds at least eight bits.
    pub fn pop_byte(&mut self) -> Option<u8> {
        if self.bits >= 8 && self.bits % 8 == 0 {
            Some(self.take(8) as u8)
        } else {
            None
        }
    }

    /// Forget all buffered bits.
    pub fn clear(&mut self) {
        self.hold = 0;
        self.bits = 0;
    }
}

/// A bit writer that queues finished bytes until the caller drains them.
///
/// Whole bytes are moved into the pending queue as soon as they are
/// complete; a partial final byte stays in the bit buffer until more bits
/// arrive or [`align_to_byte`](Self::align_to_byte) pads it.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    pending: Vec<u8>,
    read_pos: usize,
    bit_buf: u64,
    bit_count: u32,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `count` bits (up to 32) of `value`, LSB first.
    #[inline]
    pub fn write_bits(&mut self, value: u32, count: u32) {
        debug_assert!(count <= 32);
        if count == 0 {
            return;
        }
        let masked = (value as u64) & ((1u64 << count) - 1);
        self.bit_buf |= masked << self.bit_count;
        self.bit_count += count;
        while self.bit_count >= 8 {
            self.pending.push(self.bit_buf as u8);
            self.bit_buf >>= 8;
            self.bit_count -= 8;
        }
    }

    /// Pad the partial byte with zero bits and queue it.
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            self.pending.push(self.bit_buf as u8);
            self.bit_buf = 0;
            self.bit_count = 0;
        }
    }

    /// Queue whole bytes. The writer must be byte aligned.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bit_count, 0, "write_bytes on unaligned writer");
        self.pending.extend_from_slice(bytes);
    }

    /// Queue a 16-bit value, little-endian.
    pub fn write_u16_le(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Queue a 16-bit value, big-endian.
    pub fn write_u16_be(&mut self, value: u16) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Queue a 32-bit value, big-endian.
    pub fn write_u32_be(&mut self, value: u32) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Bits sitting in the partial byte.
    pub fn partial_bits(&self) -> u32 {
        self.bit_count
    }

    /// Whole bytes queued and not yet drained.
    pub fn pending(&self) -> usize {
        self.pending.len() - self.read_pos
    }

    /// Move as many queued bytes as fit into `out`, returning the count.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let n = self.pending().min(out.len());
        out[..n].copy_from_slice(&self.pending[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        if self.read_pos == self.pending.len() {
            self.pending.clear();
            self.read_pos = 0;
        }
        n
    }

    /// Drop everything, queued bytes and partial bits alike.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.read_pos = 0;
        self.bit_buf = 0;
        self.bit_count = 0;
    }
}
