//! PNG decoder implementation.
//!
//! Walks the chunk stream, inflates the concatenated IDAT payload and
//! reverses the per-scanline filters. Output is 8 bits per sample.

use super::inflate::{inflate, InflateOptions};
use super::{DecodeOptions, Image};
use crate::checksum::Crc32;
use crate::color::ColorType;
use crate::error::{Error, Result};

/// PNG file signature (magic bytes).
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Largest chunk length allowed by the format (2^31 - 1).
const MAX_CHUNK_LENGTH: usize = 0x7FFF_FFFF;

/// Color type byte of the IHDR chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PngColorType {
    Grayscale = 0,
    Rgb = 2,
    Indexed = 3,
    GrayscaleAlpha = 4,
    Rgba = 6,
}

impl PngColorType {
    /// Samples per pixel before palette expansion.
    fn channels(self) -> usize {
        match self {
            PngColorType::Grayscale | PngColorType::Indexed => 1,
            PngColorType::GrayscaleAlpha => 2,
            PngColorType::Rgb => 3,
            PngColorType::Rgba => 4,
        }
    }
}

impl TryFrom<u8> for PngColorType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PngColorType::Grayscale),
            2 => Ok(PngColorType::Rgb),
            3 => Ok(PngColorType::Indexed),
            4 => Ok(PngColorType::GrayscaleAlpha),
            6 => Ok(PngColorType::Rgba),
            _ => Err(Error::InvalidDecode(format!(
                "invalid PNG color type: {value}"
            ))),
        }
    }
}

/// IHDR chunk data.
#[derive(Debug)]
struct IhdrData {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: PngColorType,
    compression_method: u8,
    filter_method: u8,
    interlace_method: u8,
}

impl IhdrData {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != 13 {
            return Err(Error::InvalidDecode("invalid IHDR length".into()));
        }
        Ok(Self {
            width: u32::from_be_bytes([data[0], data[1], data[2], data[3]]),
            height: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            bit_depth: data[8],
            color_type: PngColorType::try_from(data[9])?,
            compression_method: data[10],
            filter_method: data[11],
            interlace_method: data[12],
        })
    }

    fn validate(&self, max_dimension: u32) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > max_dimension || self.height > max_dimension {
            return Err(Error::ImageTooLarge {
                width: self.width,
                height: self.height,
                max: max_dimension,
            });
        }
        if self.compression_method != 0 {
            return Err(Error::InvalidDecode(
                "unsupported compression method".into(),
            ));
        }
        if self.filter_method != 0 {
            return Err(Error::InvalidDecode("unsupported filter method".into()));
        }
        if self.interlace_method != 0 {
            return Err(Error::UnsupportedDecode(
                "Adam7 interlaced images not supported".into(),
            ));
        }

        let valid_depth = match self.color_type {
            PngColorType::Grayscale => matches!(self.bit_depth, 1 | 2 | 4 | 8 | 16),
            PngColorType::Indexed => matches!(self.bit_depth, 1 | 2 | 4 | 8),
            PngColorType::Rgb | PngColorType::GrayscaleAlpha | PngColorType::Rgba => {
                matches!(self.bit_depth, 8 | 16)
            }
        };
        if !valid_depth {
            return Err(Error::InvalidDecode(format!(
                "invalid bit depth {} for color type {:?}",
                self.bit_depth, self.color_type
            )));
        }
        Ok(())
    }

    /// Bytes per complete pixel, rounded up to 1 (filter stride).
    fn filter_bpp(&self) -> usize {
        (self.color_type.channels() * self.bit_depth as usize)
            .div_ceil(8)
            .max(1)
    }

    /// Bytes per scanline, excluding the filter byte.
    fn scanline_bytes(&self) -> usize {
        (self.width as usize * self.color_type.channels() * self.bit_depth as usize).div_ceil(8)
    }
}

/// Check if tRNS chunk contains any non-opaque (< 255) alpha values.
/// Returns false if trns is None or all values are 255 (fully opaque).
fn has_alpha_in_trns(trns: Option<&[u8]>) -> bool {
    trns.map(|a| a.iter().any(|&v| v != 0xFF)).unwrap_or(false)
}

/// Calculate the expected size of decompressed IDAT data.
///
/// The decompressed data contains filtered scanlines:
/// height * (1 filter byte + scanline_bytes)
fn calculate_expected_size(ihdr: &IhdrData) -> Result<usize> {
    (1 + ihdr.scanline_bytes())
        .checked_mul(ihdr.height as usize)
        .ok_or_else(|| Error::InvalidDecode("image size overflow".into()))
}

/// A chunk borrowed from the input.
struct Chunk<'a> {
    kind: [u8; 4],
    data: &'a [u8],
}

impl Chunk<'_> {
    fn name(&self) -> String {
        String::from_utf8_lossy(&self.kind).into_owned()
    }
}

/// Read the chunk starting at `pos`; returns it and the offset after its CRC.
fn read_chunk(data: &[u8], pos: usize, verify_crc: bool) -> Result<(Chunk<'_>, usize)> {
    let header = data
        .get(pos..pos + 8)
        .ok_or_else(|| Error::InvalidDecode("truncated PNG chunk header".into()))?;
    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let kind = [header[4], header[5], header[6], header[7]];
    if length > MAX_CHUNK_LENGTH {
        return Err(Error::InvalidDecode("PNG chunk length too large".into()));
    }

    let data_start = pos + 8;
    let crc_end = data_start + length + 4;
    if crc_end > data.len() {
        return Err(Error::InvalidDecode("truncated PNG chunk".into()));
    }
    let chunk = Chunk {
        kind,
        data: &data[data_start..data_start + length],
    };

    if verify_crc {
        let crc_bytes = &data[crc_end - 4..crc_end];
        let stored = u32::from_be_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let mut crc = Crc32::new();
        crc.update(&chunk.kind);
        crc.update(chunk.data);
        if crc.finalize() != stored {
            return Err(Error::InvalidDecode(format!(
                "CRC mismatch in {} chunk",
                chunk.name()
            )));
        }
    }

    Ok((chunk, crc_end))
}

/// Decode a PNG image with default options.
pub fn decode_png(data: &[u8]) -> Result<Image> {
    decode_png_with_options(data, &DecodeOptions::default())
}

/// Decode a PNG image.
pub fn decode_png_with_options(data: &[u8], options: &DecodeOptions) -> Result<Image> {
    if data.len() < 8 || data[..8] != PNG_SIGNATURE {
        return Err(Error::InvalidDecode("not a PNG file".into()));
    }

    let mut pos = 8;
    let mut ihdr: Option<IhdrData> = None;
    let mut idat_data = Vec::new();
    let mut palette: Option<Vec<[u8; 3]>> = None;
    let mut trns: Option<&[u8]> = None;
    let mut seen_iend = false;

    while pos < data.len() {
        let (chunk, next) = read_chunk(data, pos, options.verify_crc)?;
        log::trace!("chunk {} ({} bytes) at {pos}", chunk.name(), chunk.data.len());

        if ihdr.is_none() && &chunk.kind != b"IHDR" {
            return Err(Error::InvalidDecode("missing IHDR chunk".into()));
        }

        match &chunk.kind {
            b"IHDR" => {
                if ihdr.is_some() {
                    return Err(Error::InvalidDecode("duplicate IHDR chunk".into()));
                }
                let header = IhdrData::parse(chunk.data)?;
                header.validate(options.max_dimension)?;
                ihdr = Some(header);
            }
            b"PLTE" => {
                if chunk.data.len() % 3 != 0 || chunk.data.len() > 256 * 3 {
                    return Err(Error::InvalidDecode("invalid PLTE length".into()));
                }
                palette = Some(
                    chunk
                        .data
                        .chunks_exact(3)
                        .map(|rgb| [rgb[0], rgb[1], rgb[2]])
                        .collect(),
                );
            }
            b"tRNS" => trns = Some(chunk.data),
            b"IDAT" => idat_data.extend_from_slice(chunk.data),
            b"IEND" => {
                seen_iend = true;
                break;
            }
            _ => {
                // Ancillary chunks carry nothing the pixel data depends on.
                if chunk.kind[0] & 0x20 == 0 {
                    return Err(Error::UnsupportedDecode(format!(
                        "unknown critical chunk {}",
                        chunk.name()
                    )));
                }
            }
        }

        pos = next;
    }

    if !seen_iend {
        return Err(Error::InvalidDecode("missing IEND chunk".into()));
    }
    let ihdr = ihdr.ok_or_else(|| Error::InvalidDecode("missing IHDR chunk".into()))?;
    if idat_data.is_empty() {
        return Err(Error::InvalidDecode("no IDAT data".into()));
    }

    let expected_size = calculate_expected_size(&ihdr)?;
    let inflate_options = InflateOptions {
        ignore_checksum: options.ignore_adler32,
        expected_size: Some(expected_size),
    };
    let decompressed = inflate(&idat_data, &inflate_options)?;
    log::debug!(
        "PNG {}x{} {:?}/{}: {} IDAT bytes -> {} filtered bytes",
        ihdr.width,
        ihdr.height,
        ihdr.color_type,
        ihdr.bit_depth,
        idat_data.len(),
        decompressed.len()
    );

    let raw_rows = unfilter_image(&ihdr, &decompressed)?;
    let pixels = convert_to_pixels(&ihdr, &raw_rows, palette.as_deref(), trns)?;

    // Only use RGBA for indexed images if tRNS contains non-opaque values
    let color_type = match ihdr.color_type {
        PngColorType::Grayscale => ColorType::Gray,
        PngColorType::GrayscaleAlpha => ColorType::GrayAlpha,
        PngColorType::Rgb => ColorType::Rgb,
        PngColorType::Indexed if has_alpha_in_trns(trns) => ColorType::Rgba,
        PngColorType::Indexed => ColorType::Rgb,
        PngColorType::Rgba => ColorType::Rgba,
    };

    Ok(Image {
        width: ihdr.width,
        height: ihdr.height,
        color_type,
        pixels,
    })
}

/// Reverse the scanline filters, returning rows without filter bytes.
fn unfilter_image(ihdr: &IhdrData, data: &[u8]) -> Result<Vec<u8>> {
    let height = ihdr.height as usize;
    let scanline_bytes = ihdr.scanline_bytes();
    let bpp = ihdr.filter_bpp();

    let expected_len = height * (1 + scanline_bytes);
    if data.len() < expected_len {
        return Err(Error::InvalidDecode(format!(
            "decompressed data too short: {} < {}",
            data.len(),
            expected_len
        )));
    }

    let mut raw_rows = vec![0u8; height * scanline_bytes];
    let zero_row = vec![0u8; scanline_bytes];

    for (y, filtered) in data[..expected_len]
        .chunks_exact(1 + scanline_bytes)
        .enumerate()
    {
        let (done, rest) = raw_rows.split_at_mut(y * scanline_bytes);
        let row = &mut rest[..scanline_bytes];
        let prev = if y == 0 {
            &zero_row[..]
        } else {
            &done[(y - 1) * scanline_bytes..]
        };

        row.copy_from_slice(&filtered[1..]);
        unfilter_row(filtered[0], row, prev, bpp)?;
    }

    Ok(raw_rows)
}

/// Reconstruct a row by reversing the PNG filter.
fn unfilter_row(filter: u8, row: &mut [u8], prev: &[u8], bpp: usize) -> Result<()> {
    match filter {
        0 => {}
        1 => {
            // Sub: add left byte
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        2 => {
            // Up: add above byte
            for (cur, &above) in row.iter_mut().zip(prev) {
                *cur = cur.wrapping_add(above);
            }
        }
        3 => {
            // Average: add floor of the mean of left and above
            for i in 0..row.len() {
                let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
                let above = prev[i] as u16;
                row[i] = row[i].wrapping_add(((left + above) / 2) as u8);
            }
        }
        4 => {
            for i in 0..row.len() {
                let a = if i >= bpp { row[i - bpp] } else { 0 };
                let b = prev[i];
                let c = if i >= bpp { prev[i - bpp] } else { 0 };
                row[i] = row[i].wrapping_add(paeth_predictor(a, b, c));
            }
        }
        _ => {
            return Err(Error::InvalidDecode(format!(
                "invalid filter type: {filter}"
            )))
        }
    }
    Ok(())
}

/// Paeth predictor function.
#[inline]
fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Convert unfiltered rows to 8-bit interleaved pixels.
fn convert_to_pixels(
    ihdr: &IhdrData,
    raw_data: &[u8],
    palette: Option<&[[u8; 3]]>,
    trns: Option<&[u8]>,
) -> Result<Vec<u8>> {
    let width = ihdr.width as usize;
    let bit_depth = ihdr.bit_depth;
    let row_bytes = ihdr.scanline_bytes();

    match (ihdr.color_type, bit_depth) {
        (PngColorType::Indexed, _) => {
            let palette =
                palette.ok_or_else(|| Error::InvalidDecode("missing PLTE chunk".into()))?;
            let indices = unpack_samples(raw_data, width, row_bytes, bit_depth);
            Ok(expand_palette(&indices, palette, trns))
        }
        (_, 16) => {
            // Keep the high byte of each big-endian sample
            Ok(raw_data.iter().step_by(2).copied().collect())
        }
        (PngColorType::Grayscale, 1 | 2 | 4) => {
            let mut pixels = unpack_samples(raw_data, width, row_bytes, bit_depth);
            for pixel in &mut pixels {
                *pixel = scale_to_8bit(*pixel, bit_depth);
            }
            Ok(pixels)
        }
        _ => Ok(raw_data.to_vec()),
    }
}

/// Map palette indices to RGB, or RGBA when tRNS has non-opaque entries.
///
/// Out-of-range indices decode as opaque black.
fn expand_palette(indices: &[u8], palette: &[[u8; 3]], trns: Option<&[u8]>) -> Vec<u8> {
    match trns.filter(|alpha| has_alpha_in_trns(Some(*alpha))) {
        Some(alpha_table) => {
            let mut pixels = Vec::with_capacity(indices.len() * 4);
            for &idx in indices {
                let idx = idx as usize;
                let [r, g, b] = palette.get(idx).copied().unwrap_or([0, 0, 0]);
                let a = alpha_table.get(idx).copied().unwrap_or(255);
                pixels.extend_from_slice(&[r, g, b, a]);
            }
            pixels
        }
        None => {
            let mut pixels = Vec::with_capacity(indices.len() * 3);
            for &idx in indices {
                pixels.extend_from_slice(&palette.get(idx as usize).copied().unwrap_or([0, 0, 0]));
            }
            pixels
        }
    }
}

/// Unpack every row of 1/2/4/8-bit samples into one byte per sample.
fn unpack_samples(data: &[u8], width: usize, row_bytes: usize, bit_depth: u8) -> Vec<u8> {
    let mut samples = Vec::with_capacity(width * (data.len() / row_bytes.max(1)));
    for row in data.chunks_exact(row_bytes) {
        unpack_row(row, width, bit_depth, &mut samples);
    }
    samples
}

/// Unpack a single row of sub-8-bit samples.
fn unpack_row(packed: &[u8], width: usize, bit_depth: u8, out: &mut Vec<u8>) {
    if bit_depth == 8 {
        out.extend_from_slice(&packed[..width.min(packed.len())]);
        return;
    }

    let per_byte = 8 / bit_depth as usize;
    let mask = (1u8 << bit_depth) - 1;
    let start_len = out.len();
    'row: for &byte in packed {
        for i in (0..per_byte).rev() {
            if out.len() - start_len >= width {
                break 'row;
            }
            out.push((byte >> (i * bit_depth as usize)) & mask);
        }
    }
}

/// Scale a sample from bit_depth bits to 8 bits using bit replication.
fn scale_to_8bit(sample: u8, bit_depth: u8) -> u8 {
    match bit_depth {
        1 => {
            if sample == 0 {
                0
            } else {
                255
            }
        }
        2 => sample | (sample << 2) | (sample << 4) | (sample << 6),
        4 => sample | (sample << 4),
        _ => sample,
    }
}
