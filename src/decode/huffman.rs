//! Canonical Huffman tables for DEFLATE (RFC 1951 section 3.2.2).
//!
//! Tables store, for each code length, the first code and the number of
//! codes of that length. Decoding shifts one bit at a time into the code
//! and stops at the first length whose range contains it.

use super::bit_reader::BitReader;
use super::inflate::InflateErrorKind;

type HuffResult<T> = std::result::Result<T, InflateErrorKind>;

/// Maximum code length for literal/length and distance alphabets.
pub const MAX_CODE_LENGTH: u8 = 15;

/// Maximum code length for the code-length (meta) alphabet.
pub const MAX_META_CODE_LENGTH: u8 = 7;

/// Symbol for end of block in the literal/length alphabet.
pub const END_OF_BLOCK: u16 = 256;

/// A canonical prefix code rebuilt from a list of code lengths.
#[derive(Debug, Clone)]
pub struct CanonicalHuffmanTable {
    /// Number of codes of each length. Index 0 is always zero.
    counts: [u16; 16],
    /// First code of each length.
    first_code: [u16; 16],
    /// Index into `symbols` where each length's symbols start.
    offsets: [u16; 16],
    /// Symbols ordered by code length, then by symbol value.
    symbols: Vec<u16>,
    /// Longest code length in use.
    max_len: u8,
}

impl CanonicalHuffmanTable {
    /// Build a table from per-symbol code lengths (0 = symbol unused).
    ///
    /// Rejects lengths above `max_len`, tables with no symbols, and
    /// over-subscribed codes. Incomplete codes are accepted only for a
    /// single symbol of length 1, which encoders emit for trees with one
    /// used symbol.
    pub fn build(lengths: &[u8], max_len: u8) -> HuffResult<Self> {
        debug_assert!(max_len <= MAX_CODE_LENGTH);

        let mut counts = [0u16; 16];
        for &len in lengths {
            if len > max_len {
                return Err(InflateErrorKind::InvalidHuffmanCode);
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let used: u16 = counts.iter().sum();
        if used == 0 {
            return Err(InflateErrorKind::InvalidHuffmanCode);
        }

        // Kraft check: `left` is the number of unassigned codes at each length.
        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left = (left << 1) - count as i32;
            if left < 0 {
                return Err(InflateErrorKind::InvalidHuffmanCode);
            }
        }
        if left > 0 && !(used == 1 && counts[1] == 1) {
            return Err(InflateErrorKind::InvalidHuffmanCode);
        }

        let mut first_code = [0u16; 16];
        let mut offsets = [0u16; 16];
        let mut code = 0u16;
        for len in 1..16 {
            code = (code + counts[len - 1]) << 1;
            first_code[len] = code;
            if len < 15 {
                offsets[len + 1] = offsets[len] + counts[len];
            }
        }

        // Walking symbols in index order assigns codes in canonical order.
        let mut next = offsets;
        let mut symbols = vec![0u16; used as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len > 0 {
                symbols[next[len as usize] as usize] = symbol as u16;
                next[len as usize] += 1;
            }
        }

        let max_len = (1..16).rev().find(|&l| counts[l] > 0).unwrap_or(0) as u8;

        Ok(Self {
            counts,
            first_code,
            offsets,
            symbols,
            max_len,
        })
    }

    /// Decode the next symbol.
    pub fn decode(&self, reader: &mut BitReader) -> HuffResult<u16> {
        let mut code = 0u16;
        for len in 1..=self.max_len as usize {
            code = (code << 1) | reader.read_bit()? as u16;
            let index = code.wrapping_sub(self.first_code[len]);
            if index < self.counts[len] {
                return Ok(self.symbols[(self.offsets[len] + index) as usize]);
            }
        }
        Err(InflateErrorKind::InvalidHuffmanCode)
    }

    /// Longest code length in use.
    pub fn max_len(&self) -> u8 {
        self.max_len
    }

    /// Number of symbols with a code.
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

/// Accumulate `n` code bits, most significant first.
#[inline]
fn extend_code(reader: &mut BitReader, mut code: u16, n: u8) -> HuffResult<u16> {
    for _ in 0..n {
        code = (code << 1) | reader.read_bit()? as u16;
    }
    Ok(code)
}

/// Decode a literal/length symbol with the fixed code of block type 1.
///
/// | bits | codes         | symbols  |
/// |------|---------------|----------|
/// | 7    | 0x00..=0x17   | 256..=279|
/// | 8    | 0x30..=0xBF   | 0..=143  |
/// | 8    | 0xC0..=0xC7   | 280..=287|
/// | 9    | 0x190..=0x1FF | 144..=255|
pub fn decode_fixed_literal(reader: &mut BitReader) -> HuffResult<u16> {
    let code = extend_code(reader, 0, 7)?;
    if code <= 0x17 {
        return Ok(code + 256);
    }
    let code = extend_code(reader, code, 1)?;
    match code {
        0x30..=0xBF => return Ok(code - 0x30),
        0xC0..=0xC7 => return Ok(code - 0xC0 + 280),
        _ => {}
    }
    let code = extend_code(reader, code, 1)?;
    match code {
        0x190..=0x1FF => Ok(code - 0x190 + 144),
        _ => Err(InflateErrorKind::InvalidHuffmanCode),
    }
}

/// Decode a distance symbol with the fixed 5-bit code.
pub fn decode_fixed_distance(reader: &mut BitReader) -> HuffResult<u16> {
    extend_code(reader, 0, 5)
}
