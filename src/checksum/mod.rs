//! Integrity checksums used by the container formats.
//!
//! zlib streams end with an Adler-32 of the decompressed bytes and every
//! PNG chunk carries a CRC-32 over its type and payload.

pub mod adler32;
pub mod crc32;

pub use adler32::{adler32, Adler32};
pub use crc32::{crc32, Crc32};
