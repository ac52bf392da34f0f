//! DEFLATE decompression (RFC 1951) with zlib framing (RFC 1950).
//!
//! Used by the PNG decoder to expand concatenated IDAT data. A stream is a
//! 2-byte zlib header, a sequence of blocks (stored, fixed Huffman or
//! dynamic Huffman), and a big-endian Adler-32 of the decompressed bytes.

use thiserror::Error;

use super::bit_reader::BitReader;
use super::huffman::{
    decode_fixed_distance, decode_fixed_literal, CanonicalHuffmanTable, END_OF_BLOCK,
    MAX_CODE_LENGTH, MAX_META_CODE_LENGTH,
};
use super::window::SlidingWindow;
use crate::checksum::Adler32;

/// Length code base values (codes 257-285).
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for length codes.
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance code base values (codes 0-29).
const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes.
const DISTANCE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Order of code length codes for dynamic Huffman.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// DEFLATE never expands by more than this factor, which bounds the
/// pre-allocation a caller-supplied size hint can trigger.
const MAX_EXPANSION_RATIO: usize = 1032;

/// Why an inflate call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum InflateErrorKind {
    /// zlib CM field is not 8 (deflate).
    #[error("invalid zlib compression method")]
    InvalidCompressionMethod,
    /// zlib CINFO field declares a window larger than 32 KiB.
    #[error("invalid zlib window size")]
    InvalidWindowSize,
    /// zlib FDICT flag is set.
    #[error("zlib preset dictionary not supported")]
    PresetDictionaryUnsupported,
    /// zlib FCHECK does not make the header a multiple of 31.
    #[error("invalid zlib header checksum")]
    HeaderChecksumMismatch,
    /// Block type 3 (reserved).
    #[error("reserved block type")]
    InvalidBlockType,
    /// Stored block LEN is not the complement of NLEN.
    #[error("stored block LEN/NLEN mismatch")]
    CorruptedBlock,
    /// Code lengths do not form a usable prefix code, or a code has no symbol.
    #[error("invalid Huffman code")]
    InvalidHuffmanCode,
    /// A decoded symbol is outside its alphabet or breaks the length grammar.
    #[error("invalid symbol")]
    InvalidSymbol,
    /// Back-reference distance is zero or reaches before the start of output.
    #[error("back-reference distance too far back")]
    InvalidDistance,
    /// The input ended before the stream did.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,
    /// Adler-32 trailer does not match the output.
    #[error("Adler-32 checksum mismatch")]
    ChecksumMismatch,
    /// Output length differs from the expected size.
    #[error("decompressed size mismatch")]
    SizeMismatch,
}

/// A failed inflate call, with whatever output was produced before the error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} (after {} output bytes)", .partial_output.len())]
pub struct InflateError {
    kind: InflateErrorKind,
    partial_output: Vec<u8>,
}

impl InflateError {
    /// Create an error carrying partial output.
    pub fn new(kind: InflateErrorKind, partial_output: Vec<u8>) -> Self {
        Self {
            kind,
            partial_output,
        }
    }

    /// What went wrong.
    pub fn kind(&self) -> InflateErrorKind {
        self.kind
    }

    /// Bytes decoded before the failure.
    pub fn partial_output(&self) -> &[u8] {
        &self.partial_output
    }

    /// Take the partial output.
    pub fn into_partial_output(self) -> Vec<u8> {
        self.partial_output
    }
}

impl From<InflateErrorKind> for InflateError {
    fn from(kind: InflateErrorKind) -> Self {
        Self::new(kind, Vec::new())
    }
}

/// Options for [`inflate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InflateOptions {
    /// Accept a stream whose Adler-32 trailer does not match (logged).
    pub ignore_checksum: bool,
    /// Pre-size the output and fail with `SizeMismatch` on any other length.
    pub expected_size: Option<usize>,
}

impl InflateOptions {
    /// Verify everything (matches the default).
    pub fn strict() -> Self {
        Self::default()
    }

    /// Skip the Adler-32 comparison.
    pub fn permissive() -> Self {
        Self {
            ignore_checksum: true,
            expected_size: None,
        }
    }

    /// Set the expected decompressed size.
    pub fn with_expected_size(mut self, size: usize) -> Self {
        self.expected_size = Some(size);
        self
    }
}

type Step<T = ()> = std::result::Result<T, InflateErrorKind>;

/// Decompress a zlib stream.
///
/// Bytes after the Adler-32 trailer are ignored.
pub fn inflate(data: &[u8], options: &InflateOptions) -> Result<Vec<u8>, InflateError> {
    let cmf = *data.first().ok_or(InflateErrorKind::UnexpectedEndOfStream)?;
    let flg = *data.get(1).ok_or(InflateErrorKind::UnexpectedEndOfStream)?;
    check_zlib_header(cmf, flg)?;

    let mut inflater = Inflater::new(&data[2..], output_capacity(data.len(), options));
    if let Err(kind) = inflater.run_blocks() {
        return Err(inflater.fail(kind));
    }

    inflater.reader.align_to_byte();
    let stored = match inflater.reader.take_aligned_bytes(4) {
        Ok(bytes) => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        Err(kind) => return Err(inflater.fail(kind)),
    };
    let computed = inflater.adler.finish();
    if stored != computed {
        if !options.ignore_checksum {
            return Err(inflater.fail(InflateErrorKind::ChecksumMismatch));
        }
        log::warn!("ignoring Adler-32 mismatch: stored {stored:08X}, computed {computed:08X}");
    }

    if let Some(expected) = options.expected_size {
        if inflater.output.len() != expected {
            log::debug!(
                "expected {expected} decompressed bytes, got {}",
                inflater.output.len()
            );
            return Err(inflater.fail(InflateErrorKind::SizeMismatch));
        }
    }

    log::debug!(
        "inflated {} bytes from {} byte zlib stream",
        inflater.output.len(),
        data.len()
    );
    Ok(inflater.output)
}

/// Decompress a raw DEFLATE stream (no zlib header or trailer).
pub fn inflate_raw(data: &[u8]) -> Result<Vec<u8>, InflateError> {
    let mut inflater = Inflater::new(data, data.len().saturating_mul(4));
    match inflater.run_blocks() {
        Ok(()) => Ok(inflater.output),
        Err(kind) => Err(inflater.fail(kind)),
    }
}

fn check_zlib_header(cmf: u8, flg: u8) -> Step {
    if cmf & 0x0F != 8 {
        return Err(InflateErrorKind::InvalidCompressionMethod);
    }
    if cmf >> 4 > 7 {
        return Err(InflateErrorKind::InvalidWindowSize);
    }
    if flg & 0x20 != 0 {
        return Err(InflateErrorKind::PresetDictionaryUnsupported);
    }
    if (((cmf as u16) << 8) | flg as u16) % 31 != 0 {
        return Err(InflateErrorKind::HeaderChecksumMismatch);
    }
    Ok(())
}

fn output_capacity(input_len: usize, options: &InflateOptions) -> usize {
    match options.expected_size {
        Some(size) => size.min(input_len.saturating_mul(MAX_EXPANSION_RATIO)),
        None => input_len.saturating_mul(4),
    }
}

/// Codes used by one Huffman block.
enum BlockCodes {
    Fixed,
    Dynamic {
        literal: CanonicalHuffmanTable,
        /// `None` when every distance length is zero (literal-only block).
        distance: Option<CanonicalHuffmanTable>,
    },
}

impl BlockCodes {
    #[inline]
    fn literal(&self, reader: &mut BitReader) -> Step<u16> {
        match self {
            Self::Fixed => decode_fixed_literal(reader),
            Self::Dynamic { literal, .. } => literal.decode(reader),
        }
    }

    #[inline]
    fn distance(&self, reader: &mut BitReader) -> Step<u16> {
        match self {
            Self::Fixed => decode_fixed_distance(reader),
            Self::Dynamic {
                distance: Some(table),
                ..
            } => table.decode(reader),
            Self::Dynamic { distance: None, .. } => Err(InflateErrorKind::InvalidHuffmanCode),
        }
    }
}

/// State for one decompression call.
struct Inflater<'a> {
    reader: BitReader<'a>,
    window: SlidingWindow,
    output: Vec<u8>,
    adler: Adler32,
}

impl<'a> Inflater<'a> {
    fn new(data: &'a [u8], capacity: usize) -> Self {
        Self {
            reader: BitReader::new(data),
            window: SlidingWindow::new(),
            output: Vec::with_capacity(capacity),
            adler: Adler32::new(),
        }
    }

    fn fail(self, kind: InflateErrorKind) -> InflateError {
        log::debug!("inflate failed: {kind} after {} bytes", self.output.len());
        InflateError::new(kind, self.output)
    }

    /// Decode blocks until the one flagged final.
    fn run_blocks(&mut self) -> Step {
        loop {
            let start = self.output.len();
            let result = self.block();
            // Checksum what was produced even if the block failed midway.
            self.adler.update(&self.output[start..]);
            if result? {
                return Ok(());
            }
        }
    }

    /// Decode one block. Returns whether it was the final block.
    fn block(&mut self) -> Step<bool> {
        let is_final = self.reader.read_bit()? == 1;
        let block_type = self.reader.read_bits(2)?;
        log::trace!(
            "block at byte {}: type {block_type}, final {is_final}",
            self.reader.bytes_consumed()
        );

        match block_type {
            0 => self.stored_block()?,
            1 => self.huffman_block(&BlockCodes::Fixed)?,
            2 => {
                let codes = read_dynamic_codes(&mut self.reader)?;
                self.huffman_block(&codes)?;
            }
            _ => return Err(InflateErrorKind::InvalidBlockType),
        }
        Ok(is_final)
    }

    fn stored_block(&mut self) -> Step {
        self.reader.align_to_byte();
        let len = self.reader.read_u16_le()?;
        let nlen = self.reader.read_u16_le()?;
        if len ^ nlen != 0xFFFF {
            return Err(InflateErrorKind::CorruptedBlock);
        }
        let bytes = self.reader.take_aligned_bytes(len as usize)?;
        self.window.push_slice(bytes, &mut self.output);
        Ok(())
    }

    fn huffman_block(&mut self, codes: &BlockCodes) -> Step {
        loop {
            let symbol = codes.literal(&mut self.reader)?;
            match symbol {
                0..=255 => self.window.push_byte(symbol as u8, &mut self.output),
                END_OF_BLOCK => return Ok(()),
                257..=285 => {
                    let idx = (symbol - 257) as usize;
                    let length = LENGTH_BASE[idx] as usize
                        + self.reader.read_bits(LENGTH_EXTRA[idx])? as usize;

                    let dist_symbol = codes.distance(&mut self.reader)? as usize;
                    if dist_symbol >= DISTANCE_BASE.len() {
                        return Err(InflateErrorKind::InvalidSymbol);
                    }
                    let distance = DISTANCE_BASE[dist_symbol] as usize
                        + self.reader.read_bits(DISTANCE_EXTRA[dist_symbol])? as usize;

                    self.window
                        .copy_backref(length, distance, &mut self.output)?;
                }
                _ => return Err(InflateErrorKind::InvalidSymbol),
            }
        }
    }
}

/// Read the code lengths of a dynamic block header.
///
/// Returns the literal/length and distance lengths concatenated, and HLIT.
fn read_code_lengths(reader: &mut BitReader) -> Step<(Vec<u8>, usize)> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;
    log::trace!("dynamic header: hlit {hlit}, hdist {hdist}, hclen {hclen}");

    let mut meta_lengths = [0u8; 19];
    for &slot in &CODE_LENGTH_ORDER[..hclen] {
        meta_lengths[slot] = reader.read_bits(3)? as u8;
    }
    let meta = CanonicalHuffmanTable::build(&meta_lengths, MAX_META_CODE_LENGTH)?;

    let total = hlit + hdist;
    let mut lengths = Vec::with_capacity(total);
    while lengths.len() < total {
        let (value, repeat) = match meta.decode(reader)? {
            symbol @ 0..=15 => (symbol as u8, 1),
            16 => {
                let Some(&prev) = lengths.last() else {
                    log::warn!("code length repeat (16) with no previous length");
                    return Err(InflateErrorKind::InvalidSymbol);
                };
                (prev, reader.read_bits(2)? as usize + 3)
            }
            17 => (0, reader.read_bits(3)? as usize + 3),
            18 => (0, reader.read_bits(7)? as usize + 11),
            _ => return Err(InflateErrorKind::InvalidSymbol),
        };
        if lengths.len() + repeat > total {
            return Err(InflateErrorKind::InvalidSymbol);
        }
        lengths.resize(lengths.len() + repeat, value);
    }

    Ok((lengths, hlit))
}

/// Read a dynamic block header and build its tables.
fn read_dynamic_codes(reader: &mut BitReader) -> Step<BlockCodes> {
    let (lengths, hlit) = read_code_lengths(reader)?;
    let (literal_lengths, distance_lengths) = lengths.split_at(hlit);

    if literal_lengths[END_OF_BLOCK as usize] == 0 {
        return Err(InflateErrorKind::InvalidHuffmanCode);
    }
    let literal = CanonicalHuffmanTable::build(literal_lengths, MAX_CODE_LENGTH)?;
    let distance = if distance_lengths.iter().all(|&len| len == 0) {
        None
    } else {
        Some(CanonicalHuffmanTable::build(
            distance_lengths,
            MAX_CODE_LENGTH,
        )?)
    };

    Ok(BlockCodes::Dynamic { literal, distance })
}
