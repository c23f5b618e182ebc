//! Static DEFLATE tables (RFC 1951 sections 3.2.5 and 3.2.6).
//!
//! Length/distance base values and extra-bit counts, the order of the
//! code-length alphabet in dynamic block headers, and the fixed Huffman
//! codes in both decoding and encoding form.

use crate::huffman::{self, HuffmanTree};
use std::sync::OnceLock;

/// Number of literal/length symbols in the fixed code (286 and 287 are
/// never emitted but take part in the code construction).
pub const FIXED_LITLEN_SYMBOLS: usize = 288;

/// Base match length for length symbols 257-285.
pub const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits following length symbols 257-285.
pub const LENGTH_EXTRA_BITS: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Base distance for distance symbols 0-29.
pub const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits following distance symbols 0-29.
pub const DISTANCE_EXTRA_BITS: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Transmission order of the code-length code lengths in a dynamic header.
pub const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Fixed literal/length code lengths.
pub fn fixed_litlen_lengths() -> [u8; FIXED_LITLEN_SYMBOLS] {
    let mut lengths = [0u8; FIXED_LITLEN_SYMBOLS];
    for (symbol, len) in lengths.iter_mut().enumerate() {
        *len = match symbol {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    lengths
}

/// Fixed distance code lengths: all 30 symbols use 5 bits.
pub fn fixed_distance_lengths() -> [u8; 30] {
    [5u8; 30]
}

/// Decoding table for the fixed literal/length code.
pub fn fixed_litlen_tree() -> &'static HuffmanTree {
    static TREE: OnceLock<HuffmanTree> = OnceLock::new();
    TREE.get_or_init(|| HuffmanTree::build(&fixed_litlen_lengths()))
}

/// Decoding table for the fixed distance code.
pub fn fixed_distance_tree() -> &'static HuffmanTree {
    static TREE: OnceLock<HuffmanTree> = OnceLock::new();
    TREE.get_or_init(|| HuffmanTree::build(&fixed_distance_lengths()))
}

/// Bit-reversed codes of the fixed literal/length code, ready to send.
pub fn fixed_litlen_codes() -> &'static [u16] {
    static CODES: OnceLock<Vec<u16>> = OnceLock::new();
    CODES.get_or_init(|| huffman::canonical_codes(&fixed_litlen_lengths()))
}

/// Bit-reversed codes of the fixed distance code, ready to send.
pub fn fixed_distance_codes() -> &'static [u16] {
    static CODES: OnceLock<Vec<u16>> = OnceLock::new();
    CODES.get_or_init(|| huffman::canonical_codes(&fixed_distance_lengths()))
}

/// Map a match length (3-258) to (symbol, extra bit count, extra value).
pub fn length_to_code(length: u16) -> (u16, u8, u16) {
    debug_assert!((3..=258).contains(&length), "length out of range: {}", length);
    let index = LENGTH_BASE.partition_point(|&base| base <= length) - 1;
    (
        257 + index as u16,
        LENGTH_EXTRA_BITS[index],
        length - LENGTH_BASE[index],
    )
}

/// Map a distance (1-32768) to (symbol, extra bit count, extra value).
pub fn distance_to_code(distance: u16) -> (u16, u8, u16) {
    debug_assert!(distance >= 1, "distance out of range: {}", distance);
    let d = (distance - 1) as u32;
    let code = if d < 4 {
        d as usize
    } else {
        let bits = 31 - d.leading_zeros();
        (2 * bits + ((d >> (bits - 1)) & 1)) as usize
    };
    (
        code as u16,
        DISTANCE_EXTRA_BITS[code],
        distance - DISTANCE_BASE[code],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_litlen_lengths() {
        let lengths = fixed_litlen_lengths();
        assert_eq!(lengths[0], 8);
        assert_eq!(lengths[143], 8);
        assert_eq!(lengths[144], 9);
        assert_eq!(lengths[255], 9);
        assert_eq!(lengths[256], 7);
        assert_eq!(lengths[279], 7);
        assert_eq!(lengths[280], 8);
        assert_eq!(lengths[287], 8);
    }

    #[test]
    fn test_length_codes_cover_range() {
        for length in 3..=258u16 {
            let (code, extra_bits, extra) = length_to_code(length);
            let index = (code - 257) as usize;
            assert_eq!(LENGTH_BASE[index] + extra, length);
            assert!(extra < (1 << extra_bits) || (extra == 0 && extra_bits == 0));
        }
        assert_eq!(length_to_code(3), (257, 0, 0));
        assert_eq!(length_to_code(11), (265, 1, 0));
        assert_eq!(length_to_code(12), (265, 1, 1));
        assert_eq!(length_to_code(257), (284, 5, 30));
        assert_eq!(length_to_code(258), (285, 0, 0));
    }

    #[test]
    fn test_distance_codes_cover_range() {
        for distance in 1..=32768u16 {
            let (code, extra_bits, extra) = distance_to_code(distance);
            assert_eq!(DISTANCE_BASE[code as usize] + extra, distance);
            assert!((extra as u32) < (1u32 << extra_bits));
        }
        assert_eq!(distance_to_code(1), (0, 0, 0));
        assert_eq!(distance_to_code(5), (4, 1, 0));
        assert_eq!(distance_to_code(24576), (28, 13, 8191));
        assert_eq!(distance_to_code(32768), (29, 13, 8191));
    }

    #[test]
    fn test_fixed_codes() {
        // Symbol 256 is the first 7-bit code (0000000).
        assert_eq!(fixed_litlen_codes()[256], 0);
        // Symbol 0 is 00110000, sent bit-reversed.
        assert_eq!(fixed_litlen_codes()[0], 0b00001100);
        assert_eq!(fixed_distance_codes()[1], 0b10000);
    }
}
