//! Binary PPM (`P6`) decoder.

use super::{DecodeOptions, Image};
use crate::color::ColorType;
use crate::error::{Error, Result};

/// Magic bytes of a binary PPM.
pub const PPM_MAGIC: &[u8; 2] = b"P6";

/// Cursor over the ASCII header.
struct Header<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Header<'a> {
    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&byte) = self.data.get(self.pos) {
            if byte == b'#' {
                while self.data.get(self.pos).is_some_and(|&b| b != b'\n') {
                    self.pos += 1;
                }
            } else if byte.is_ascii_whitespace() || byte == 0x0B {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Parse the next decimal header field.
    fn read_number(&mut self, field: &str) -> Result<u32> {
        self.skip_whitespace_and_comments();
        let start = self.pos;
        while self.data.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(Error::InvalidDecode(format!("PPM {field} is not a number")));
        }
        // At most 10 digits fit the check below without overflowing u64.
        let digits = &self.data[start..self.pos];
        if digits.len() > 10 {
            return Err(Error::InvalidDecode(format!("PPM {field} out of range")));
        }
        let value = digits
            .iter()
            .fold(0u64, |acc, &d| acc * 10 + (d - b'0') as u64);
        u32::try_from(value).map_err(|_| Error::InvalidDecode(format!("PPM {field} out of range")))
    }
}

/// Decode a binary PPM with default options.
pub fn decode_ppm(data: &[u8]) -> Result<Image> {
    decode_ppm_with_options(data, &DecodeOptions::default())
}

/// Decode a binary PPM.
///
/// Samples are rescaled to 0..=255 when the header's maxval is lower.
pub fn decode_ppm_with_options(data: &[u8], options: &DecodeOptions) -> Result<Image> {
    if !data.starts_with(PPM_MAGIC) {
        return Err(Error::InvalidDecode("not a binary PPM file".into()));
    }

    let mut header = Header { data, pos: 2 };
    let width = header.read_number("width")?;
    let height = header.read_number("height")?;
    let max_value = header.read_number("maxval")?;

    // Exactly one whitespace byte separates the header from the raster.
    match data.get(header.pos) {
        Some(byte) if byte.is_ascii_whitespace() => header.pos += 1,
        _ => {
            return Err(Error::InvalidDecode(
                "missing whitespace after PPM header".into(),
            ))
        }
    }

    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    if width > options.max_dimension || height > options.max_dimension {
        return Err(Error::ImageTooLarge {
            width,
            height,
            max: options.max_dimension,
        });
    }
    match max_value {
        0 => return Err(Error::InvalidDecode("PPM maxval must be positive".into())),
        1..=255 => {}
        256..=65535 => {
            return Err(Error::UnsupportedDecode(
                "16-bit PPM samples not supported".into(),
            ))
        }
        _ => return Err(Error::InvalidDecode("PPM maxval out of range".into())),
    }

    let size = (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| Error::InvalidDecode("image size overflow".into()))?;
    let raster = data
        .get(header.pos..)
        .and_then(|rest| rest.get(..size))
        .ok_or_else(|| {
            Error::InvalidDecode(format!(
                "PPM raster too short: expected {size} bytes, got {}",
                data.len() - header.pos
            ))
        })?;

    log::debug!("PPM {width}x{height}, maxval {max_value}");

    let pixels = if max_value == 255 {
        raster.to_vec()
    } else {
        let max = max_value as u32;
        raster
            .iter()
            .map(|&s| ((s as u32).min(max) * 255 + max / 2) / max)
            .map(|s| s as u8)
            .collect()
    };

    Ok(Image {
        width,
        height,
        color_type: ColorType::Rgb,
        pixels,
    })
}
