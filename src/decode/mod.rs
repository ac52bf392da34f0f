//! Image decoders.
//!
//! [`decode_image`] detects the format from its magic bytes and returns an
//! interleaved [`Image`]. The per-format entry points live in [`png`],
//! [`jpeg`] and [`ppm`]; the zlib/DEFLATE inflater used by PNG is in
//! [`inflate`].

pub mod bit_reader;
pub mod huffman;
pub mod idct;
pub mod inflate;
pub mod jpeg;
pub mod png;
pub mod ppm;
pub mod window;

use crate::color::ColorType;
use crate::error::{Error, Result};

/// Maximum supported image dimension.
pub const MAX_DIMENSION: u32 = 1 << 24; // 16 million pixels

/// Container formats understood by [`decode_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Portable Network Graphics.
    Png,
    /// Baseline JPEG.
    Jpeg,
    /// Binary portable pixmap (`P6`).
    Ppm,
}

impl ImageFormat {
    /// Detect the format from the leading magic bytes.
    pub fn detect(data: &[u8]) -> Option<Self> {
        if data.starts_with(&png::PNG_SIGNATURE) {
            Some(ImageFormat::Png)
        } else if data.starts_with(&[0xFF, 0xD8]) {
            Some(ImageFormat::Jpeg)
        } else if data.starts_with(ppm::PPM_MAGIC) {
            Some(ImageFormat::Ppm)
        } else {
            None
        }
    }
}

/// A decoded image with interleaved 8-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Sample layout of `pixels`.
    pub color_type: ColorType,
    /// Row-major pixel data, `width * height * bytes_per_pixel` bytes.
    pub pixels: Vec<u8>,
}

impl Image {
    fn row_bytes(&self) -> usize {
        self.width as usize * self.color_type.bytes_per_pixel()
    }

    /// Mirror each row left to right.
    pub fn flip_horizontal(&mut self) {
        let bpp = self.color_type.bytes_per_pixel();
        let row_bytes = self.row_bytes();
        if row_bytes == 0 {
            return;
        }
        for row in self.pixels.chunks_exact_mut(row_bytes) {
            let width = row.len() / bpp;
            for x in 0..width / 2 {
                let (left, right) = row.split_at_mut((width - 1 - x) * bpp);
                left[x * bpp..(x + 1) * bpp].swap_with_slice(&mut right[..bpp]);
            }
        }
    }

    /// Reverse the order of the rows.
    pub fn flip_vertical(&mut self) {
        let row_bytes = self.row_bytes();
        let height = self.height as usize;
        for y in 0..height / 2 {
            let (top, bottom) = self.pixels.split_at_mut((height - 1 - y) * row_bytes);
            top[y * row_bytes..(y + 1) * row_bytes].swap_with_slice(&mut bottom[..row_bytes]);
        }
    }
}

/// Decoder options.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Accept PNG image data whose zlib Adler-32 trailer does not match.
    pub ignore_adler32: bool,
    /// Verify PNG chunk CRCs.
    pub verify_crc: bool,
    /// Largest accepted width or height.
    pub max_dimension: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::strict()
    }
}

impl DecodeOptions {
    /// Verify every checksum (the default).
    pub fn strict() -> Self {
        Self {
            ignore_adler32: false,
            verify_crc: true,
            max_dimension: MAX_DIMENSION,
        }
    }

    /// Skip CRC and Adler-32 verification; structural errors still fail.
    pub fn permissive() -> Self {
        Self {
            ignore_adler32: true,
            verify_crc: false,
            max_dimension: MAX_DIMENSION,
        }
    }
}

/// Decode a PNG, JPEG or PPM image with default options.
pub fn decode_image(data: &[u8]) -> Result<Image> {
    decode_image_with_options(data, &DecodeOptions::default())
}

/// Decode a PNG, JPEG or PPM image.
///
/// JPEG images come back as Gray or YCbCr. Subsampled JPEGs fail with
/// [`Error::UnsupportedDecode`]; use [`jpeg::decode_jpeg`] to get their
/// planes.
pub fn decode_image_with_options(data: &[u8], options: &DecodeOptions) -> Result<Image> {
    let format = ImageFormat::detect(data).ok_or(Error::UnknownFormat)?;
    log::debug!("decoding {format:?} image, {} bytes", data.len());
    match format {
        ImageFormat::Png => png::decode_png_with_options(data, options),
        ImageFormat::Ppm => ppm::decode_ppm_with_options(data, options),
        ImageFormat::Jpeg => {
            let jpeg = jpeg::decode_jpeg_with_options(data, options)?;
            let (color_type, pixels) = jpeg.interleaved()?;
            Ok(Image {
                width: jpeg.width,
                height: jpeg.height,
                color_type,
                pixels,
            })
        }
    }
}

/// Decode independent images on the rayon thread pool.
///
/// Results are returned in input order.
#[cfg(feature = "parallel")]
pub fn decode_images_parallel(inputs: &[&[u8]]) -> Vec<Result<Image>> {
    use rayon::prelude::*;

    inputs.par_iter().map(|data| decode_image(data)).collect()
}
