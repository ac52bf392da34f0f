//! Synthetic test payload generation.
//!
//! Deterministic byte patterns and images for exercising the inflater and
//! the decoders. Random data always comes from a seeded `StdRng` so
//! failures reproduce.

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Generate an RGB gradient (red horizontal, green vertical, blue diagonal).
pub fn gradient_rgb(width: u32, height: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (((x + y) * 127) / (width + height).max(1)) as u8;
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

/// Generate a grayscale checkerboard.
pub fn checkerboard_gray(width: u32, height: u32, cell_size: u32) -> Vec<u8> {
    let cell_size = cell_size.max(1);
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for y in 0..height {
        for x in 0..width {
            let is_white = ((x / cell_size) + (y / cell_size)) % 2 == 0;
            pixels.push(if is_white { 255 } else { 0 });
        }
    }
    pixels
}

/// Uniformly random bytes; nearly incompressible.
pub fn random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(data.as_mut_slice());
    data
}

/// Words from a small vocabulary; compresses with many long matches.
pub fn text_like(seed: u64, len: usize) -> Vec<u8> {
    const WORDS: &[&str] = &[
        "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "inflate", "window",
        "huffman", "block", "stored", "dynamic", "literal", "distance",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len + 16);
    while data.len() < len {
        data.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
        data.push(if rng.gen_bool(0.1) { b'\n' } else { b' ' });
    }
    data.truncate(len);
    data
}

/// Long runs of a few byte values; exercises overlapping copies.
pub fn runs(seed: u64, len: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        let byte = rng.gen_range(0..4u8);
        let run = rng.gen_range(1..600usize);
        data.extend(std::iter::repeat(byte).take(run));
    }
    data.truncate(len);
    data
}
