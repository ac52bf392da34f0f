//! Minimal container writers for building decoder inputs.
//!
//! zlib streams come from `flate2` and chunk CRCs from `flate2::Crc`, so
//! the fixtures do not depend on the code under test.

use std::io::Write;

use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::{Compression, Crc};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Compress `data` into a zlib stream at the given level (0-9).
pub fn zlib(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).expect("write to Vec");
    encoder.finish().expect("finish zlib stream")
}

/// Compress `data` into a zlib stream, sync-flushing after every piece.
///
/// Each flush ends with an empty stored block.
pub fn zlib_flushed(pieces: &[&[u8]], level: u32) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level));
    for piece in pieces {
        encoder.write_all(piece).expect("write to Vec");
        encoder.flush().expect("flush");
    }
    encoder.finish().expect("finish zlib stream")
}

/// Compress `data` into a raw DEFLATE stream.
pub fn deflate_raw(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder.write_all(data).expect("write to Vec");
    encoder.finish().expect("finish deflate stream")
}

/// A PNG chunk with length, type and CRC.
pub fn png_chunk(kind: &[u8; 4], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + 12);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc = Crc::new();
    crc.update(kind);
    crc.update(data);
    out.extend_from_slice(&crc.sum().to_be_bytes());
    out
}

/// Build a non-interlaced PNG whose scanlines all use filter type 0.
///
/// `rows` holds the packed scanlines without filter bytes.
pub fn png(
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
    rows: &[u8],
    extra: &[Vec<u8>],
) -> Vec<u8> {
    let row_bytes = rows.len() / height as usize;
    let mut filtered = Vec::with_capacity(rows.len() + height as usize);
    for row in rows.chunks_exact(row_bytes) {
        filtered.push(0);
        filtered.extend_from_slice(row);
    }

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.extend_from_slice(&[bit_depth, color_type, 0, 0, 0]);

    let mut out = PNG_SIGNATURE.to_vec();
    out.extend(png_chunk(b"IHDR", &ihdr));
    for c in extra {
        out.extend_from_slice(c);
    }
    out.extend(png_chunk(b"IDAT", &zlib(&filtered, 6)));
    out.extend(png_chunk(b"IEND", &[]));
    out
}

/// Offset of the first chunk of the given type.
pub fn find_chunk(png: &[u8], kind: &[u8; 4]) -> Option<usize> {
    let mut pos = 8;
    while pos + 8 <= png.len() {
        let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]);
        if &png[pos + 4..pos + 8] == kind {
            return Some(pos);
        }
        pos += 12 + len as usize;
    }
    None
}

/// Binary PPM with the given maxval.
pub fn ppm(width: u32, height: u32, max_value: u32, raster: &[u8]) -> Vec<u8> {
    let mut out = format!("P6\n# synthetic\n{width} {height}\n{max_value}\n").into_bytes();
    out.extend_from_slice(raster);
    out
}

fn jpeg_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, marker];
    out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// Baseline JPEG whose blocks are all DC-only with zero difference, so
/// every sample decodes to 128.
///
/// `components` lists (id, sampling byte); all share table 0. The DC
/// table has one code `0` for category 0 and the AC table one code `0`
/// for EOB, so each block is two zero bits.
pub fn flat_jpeg(width: u16, height: u16, components: &[(u8, u8)]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend(jpeg_segment(0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0"));

    let mut dqt = vec![0u8];
    dqt.extend_from_slice(&[1; 64]);
    out.extend(jpeg_segment(0xDB, &dqt));

    for class in [0x00u8, 0x10] {
        let mut dht = vec![class];
        let mut bits = [0u8; 16];
        bits[0] = 1;
        dht.extend_from_slice(&bits);
        dht.push(0);
        out.extend(jpeg_segment(0xC4, &dht));
    }

    let mut sof = vec![8];
    sof.extend_from_slice(&height.to_be_bytes());
    sof.extend_from_slice(&width.to_be_bytes());
    sof.push(components.len() as u8);
    for &(id, sampling) in components {
        sof.extend_from_slice(&[id, sampling, 0]);
    }
    out.extend(jpeg_segment(0xC0, &sof));

    let mut sos = vec![components.len() as u8];
    for &(id, _) in components {
        sos.extend_from_slice(&[id, 0x00]);
    }
    sos.extend_from_slice(&[0, 63, 0]);
    out.extend(jpeg_segment(0xDA, &sos));

    // Count blocks over the MCU grid
    let max_h = components.iter().map(|c| (c.1 >> 4) as usize).max().unwrap_or(1);
    let max_v = components.iter().map(|c| (c.1 & 0x0F) as usize).max().unwrap_or(1);
    let mcus = if components.len() == 1 {
        (width as usize).div_ceil(8) * (height as usize).div_ceil(8)
    } else {
        (width as usize).div_ceil(8 * max_h) * (height as usize).div_ceil(8 * max_v)
    };
    let blocks_per_mcu: usize = if components.len() == 1 {
        1
    } else {
        components
            .iter()
            .map(|c| (c.1 >> 4) as usize * (c.1 & 0x0F) as usize)
            .sum()
    };
    let bits = mcus * blocks_per_mcu * 2;
    out.extend(std::iter::repeat(0u8).take(bits / 8));
    // Pad the final partial byte with 1s
    if bits % 8 != 0 {
        out.push(0xFF >> (bits % 8));
    }

    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}
