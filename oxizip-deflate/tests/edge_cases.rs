//! Edge case tests for DEFLATE compression.

use oxizip_core::traits::{Compressor, Strategy};
use oxizip_deflate::{DeflateOptions, Deflater, deflate, inflate};

fn pseudo_random(size: usize, mut seed: u64) -> Vec<u8> {
    (0..size)
        .map(|_| {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as u8
        })
        .collect()
}

#[test]
fn test_empty_input() {
    let input = b"";
    let compressed = deflate(input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
}

#[test]
fn test_single_byte() {
    for level in 0..=9 {
        let compressed = deflate(b"A", level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), b"A");
    }
}

#[test]
fn test_all_zeros() {
    let input = vec![0u8; 1000];
    let compressed = deflate(&input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
    assert!(compressed.len() < input.len() / 10);
}

#[test]
fn test_all_same_byte() {
    let input = vec![255u8; 5000];
    let compressed = deflate(&input, 6).unwrap();
    let decompressed = inflate(&compressed).unwrap();
    assert_eq!(decompressed, input);
    assert!(compressed.len() < input.len() / 20);
}

#[test]
fn test_max_match_length() {
    let input = vec![42u8; 258 * 10];
    let compressed = deflate(&input, 9).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_random_literals() {
    // Incompressible data must still round-trip and stay close to its
    // original size (stored blocks).
    let input = pseudo_random(50_000, 7);
    for level in [1, 6, 9] {
        let compressed = deflate(&input, level).unwrap();
        assert!(compressed.len() <= input.len() + input.len() / 100 + 16);
        assert_eq!(inflate(&compressed).unwrap(), input);
    }
}

#[test]
fn test_alternating_pattern() {
    let input: Vec<u8> = (0..2000).map(|i| if i % 2 == 0 { b'A' } else { b'B' }).collect();
    let compressed = deflate(&input, 6).unwrap();
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_larger_than_window() {
    // Several window slides, with matches that reach across them.
    let mut input = pseudo_random(40_000, 99);
    let copy = input.clone();
    input.extend_from_slice(&copy[10_000..30_000]);
    input.extend(pseudo_random(100_000, 3));
    input.extend_from_slice(&copy[..20_000]);

    for level in 0..=9 {
        let compressed = deflate(&input, level).unwrap();
        assert_eq!(inflate(&compressed).unwrap(), input, "level {}", level);
    }
}

#[test]
fn test_large_text() {
    let mut input = Vec::with_capacity(1024 * 1024);
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    while input.len() < 1024 * 1024 {
        input.extend_from_slice(pattern);
    }
    input.truncate(1024 * 1024);

    let compressed = deflate(&input, 5).unwrap();
    assert!(compressed.len() < input.len() / 50);
    assert_eq!(inflate(&compressed).unwrap(), input);
}

#[test]
fn test_many_blocks_of_mixed_content() {
    // More tokens than one block holds, with text and noise interleaved.
    let mut input = Vec::new();
    for i in 0..40 {
        input.extend_from_slice(format!("record {:05} holds some text; ", i).repeat(20).as_bytes());
        input.extend(pseudo_random(500, i));
    }
    for strategy in [
        Strategy::Default,
        Strategy::Filtered,
        Strategy::HuffmanOnly,
        Strategy::Rle,
        Strategy::Fixed,
    ] {
        for level in [1, 4, 9] {
            let mut deflater =
                Deflater::with_options(DeflateOptions::new(level).with_strategy(strategy));
            let compressed = deflater.compress_all(&input).unwrap();
            assert_eq!(
                inflate(&compressed).unwrap(),
                input,
                "{:?} level {}",
                strategy,
                level
            );
        }
    }
}

#[test]
fn test_deterministic_output() {
    let input = b"deterministic deterministic deterministic output".repeat(100);
    assert_eq!(deflate(&input, 6).unwrap(), deflate(&input, 6).unwrap());
}

#[test]
fn test_garbage_is_rejected_without_panic() {
    for seed in 0..50 {
        let garbage = pseudo_random(200, seed);
        // Either an error or some output; never a panic.
        let _ = inflate(&garbage);
    }
}
