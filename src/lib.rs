//! # pixread
//!
//! A small, dependency-light image decoding library.
//!
//! PNG, baseline JPEG and binary PPM are decoded with hand-written
//! codecs, including a complete zlib/DEFLATE inflater (RFC 1950/1951)
//! with Adler-32 and CRC-32 verification.
//!
//! ## Features
//!
//! - **PNG decoding**: all filter types, bit depths 1-16, palettes and tRNS
//! - **JPEG decoding**: baseline Huffman, restart intervals, per-component
//!   sample planes
//! - **Inflate** with partial output on error and opt-in checksum bypass
//! - Optional parallel decoding of independent inputs via `parallel` feature
//!
//! ## Example
//!
//! ```rust
//! use pixread::{decode_image, ColorType};
//!
//! // 1x1 red pixel as a binary PPM
//! let mut data = b"P6\n1 1\n255\n".to_vec();
//! data.extend_from_slice(&[255, 0, 0]);
//!
//! let image = decode_image(&data).unwrap();
//! assert_eq!(image.color_type, ColorType::Rgb);
//! assert_eq!(image.pixels, vec![255, 0, 0]);
//! ```
//!
//! Raw zlib streams can be inflated directly:
//!
//! ```rust
//! use pixread::inflate::{inflate, InflateOptions};
//!
//! let stream = [0x78, 0x01, 0x01, 0x02, 0x00, 0xFD, 0xFF, 0x48, 0x69, 0x00, 0xFB, 0x00, 0xB2];
//! assert_eq!(inflate(&stream, &InflateOptions::default()).unwrap(), b"Hi");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checksum;
pub mod color;
pub mod decode;
pub mod error;

pub use color::ColorType;
pub use decode::inflate;
pub use decode::{decode_image, decode_image_with_options, DecodeOptions, Image, ImageFormat};
pub use error::{Error, Result};

#[cfg(feature = "parallel")]
pub use decode::decode_images_parallel;
