//! Bit-level readers for DEFLATE and JPEG decoding.
//!
//! DEFLATE packs fields starting at the least significant bit of each byte;
//! JPEG entropy data is MSB-first with 0xFF byte stuffing.

use super::inflate::InflateErrorKind;

type ReadResult<T> = std::result::Result<T, InflateErrorKind>;

/// Bit reader for LSB-first bit streams (DEFLATE).
///
/// Bytes are pulled from the input only when a read needs them, so
/// [`BitReader::bytes_consumed`] is exact and the zlib trailer can be
/// located after the last block.
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u64,
    bits_in_buf: u8,
}

impl<'a> BitReader<'a> {
    /// Create a new bit reader from a byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bits_in_buf: 0,
        }
    }

    /// Ensure at least `n` bits are available in the buffer.
    #[inline]
    fn ensure(&mut self, n: u8) -> ReadResult<()> {
        while self.bits_in_buf < n {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(InflateErrorKind::UnexpectedEndOfStream);
            };
            self.bit_buf |= (byte as u64) << self.bits_in_buf;
            self.pos += 1;
            self.bits_in_buf += 8;
        }
        Ok(())
    }

    /// Read a single bit.
    ///
    /// Huffman codes are packed starting with their most significant bit,
    /// so decoders call this repeatedly and shift each bit in at the bottom.
    #[inline]
    pub fn read_bit(&mut self) -> ReadResult<u32> {
        self.ensure(1)?;
        let bit = (self.bit_buf & 1) as u32;
        self.bit_buf >>= 1;
        self.bits_in_buf -= 1;
        Ok(bit)
    }

    /// Read an `n`-bit field stored LSB-first (header fields, extra bits).
    #[inline]
    pub fn read_bits(&mut self, n: u8) -> ReadResult<u32> {
        debug_assert!(n <= 32);
        if n == 0 {
            return Ok(0);
        }
        self.ensure(n)?;
        let val = (self.bit_buf & ((1u64 << n) - 1)) as u32;
        self.bit_buf >>= n;
        self.bits_in_buf -= n;
        Ok(val)
    }

    /// Read a little-endian `u16` (stored block LEN/NLEN).
    #[inline]
    pub fn read_u16_le(&mut self) -> ReadResult<u16> {
        self.read_bits(16).map(|v| v as u16)
    }

    /// Discard the remaining bits of the current byte.
    pub fn align_to_byte(&mut self) {
        let discard = self.bits_in_buf % 8;
        self.bit_buf >>= discard;
        self.bits_in_buf -= discard;
    }

    /// Take `n` raw bytes from a byte-aligned position.
    ///
    /// Whole bytes still sitting in the bit buffer are handed back to the
    /// input first, so the returned slice borrows the original data.
    pub fn take_aligned_bytes(&mut self, n: usize) -> ReadResult<&'a [u8]> {
        debug_assert_eq!(self.bits_in_buf % 8, 0, "reader must be byte-aligned");
        self.pos -= (self.bits_in_buf / 8) as usize;
        self.bit_buf = 0;
        self.bits_in_buf = 0;

        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(InflateErrorKind::UnexpectedEndOfStream)?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Number of input bytes consumed, counting a partially read byte.
    pub fn bytes_consumed(&self) -> usize {
        self.pos - (self.bits_in_buf / 8) as usize
    }

    /// True once every bit of the input has been read.
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len() && self.bits_in_buf == 0
    }
}

/// Bit reader for MSB-first bit streams (JPEG).
///
/// JPEG stuffs a 0x00 after every literal 0xFF in entropy-coded data. Any
/// other byte after 0xFF is a marker: the reader stops in front of it and
/// feeds zero bits until [`MsbBitReader::restart`] steps over a restart
/// marker. Zero bits are also fed past the end of the data; callers check
/// [`MsbBitReader::is_overrun`] to tell padding from real data.
pub struct MsbBitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u32,
    bits_in_buf: u8,
    marker: Option<u8>,
    padded_bytes: usize,
}

impl<'a> MsbBitReader<'a> {
    /// Create a new MSB-first reader over entropy-coded data.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bit_buf: 0,
            bits_in_buf: 0,
            marker: None,
            padded_bytes: 0,
        }
    }

    /// Next data byte with stuffing removed, or zero at a marker or the end.
    fn next_byte(&mut self) -> u8 {
        loop {
            if self.marker.is_some() || self.pos >= self.data.len() {
                self.padded_bytes += 1;
                return 0;
            }
            let byte = self.data[self.pos];
            if byte != 0xFF {
                self.pos += 1;
                return byte;
            }
            match self.data.get(self.pos + 1).copied() {
                Some(0x00) => {
                    self.pos += 2;
                    return 0xFF;
                }
                // Fill bytes before a marker
                Some(0xFF) => self.pos += 1,
                Some(marker) => self.marker = Some(marker),
                None => self.pos = self.data.len(),
            }
        }
    }

    /// Ensure at least `n` bits are available in the buffer.
    #[inline]
    fn ensure(&mut self, n: u8) {
        while self.bits_in_buf < n {
            let byte = self.next_byte();
            self.bit_buf = (self.bit_buf << 8) | (byte as u32);
            self.bits_in_buf += 8;
        }
    }

    /// Peek at the next `n` bits without consuming them.
    #[inline]
    pub fn peek_bits(&mut self, n: u8) -> u32 {
        debug_assert!(n <= 16);
        self.ensure(n);
        (self.bit_buf >> (self.bits_in_buf - n)) & ((1 << n) - 1)
    }

    /// Consume `n` bits from the buffer.
    #[inline]
    pub fn consume(&mut self, n: u8) {
        debug_assert!(n <= self.bits_in_buf);
        self.bits_in_buf -= n;
        self.bit_buf &= 1u32
            .checked_shl(self.bits_in_buf as u32)
            .unwrap_or(0)
            .wrapping_sub(1);
    }

    /// Read `n` bits MSB-first.
    #[inline]
    pub fn read_bits(&mut self, n: u8) -> u32 {
        if n == 0 {
            return 0;
        }
        let val = self.peek_bits(n);
        self.consume(n);
        val
    }

    /// Read one bit.
    #[inline]
    pub fn read_bit(&mut self) -> u32 {
        self.read_bits(1)
    }

    /// Resynchronize at a restart interval boundary.
    ///
    /// Drops the padding bits of the finished interval and steps over the
    /// RSTn marker that must follow. Returns false if no restart marker
    /// was found at this position.
    pub fn restart(&mut self) -> bool {
        self.bit_buf = 0;
        self.bits_in_buf = 0;
        if self.marker.is_none() {
            // Marker not reached yet: skip fill bytes and look for it.
            while self.data.get(self.pos) == Some(&0xFF)
                && self.data.get(self.pos + 1) == Some(&0xFF)
            {
                self.pos += 1;
            }
            if self.data.get(self.pos) == Some(&0xFF) {
                self.marker = self.data.get(self.pos + 1).copied();
            }
        }
        match self.marker {
            Some(m @ 0xD0..=0xD7) => {
                log::trace!("restart marker RST{} at byte {}", m - 0xD0, self.pos);
                self.pos += 2;
                self.marker = None;
                self.padded_bytes = 0;
                true
            }
            _ => false,
        }
    }

    /// True once padding has been fed because the segment ended.
    ///
    /// A lookahead past the last byte already counts, so this only tells a
    /// caller that a failed decode may have been caused by missing data.
    pub fn reached_end(&self) -> bool {
        self.padded_bytes > 0
    }

    /// True if more bits were requested than the entropy segment holds.
    pub fn is_overrun(&self) -> bool {
        // The final byte may be read partially as Huffman lookahead.
        self.padded_bytes > 2
    }

    /// Marker that ended the entropy segment, if one was reached.
    pub fn marker(&self) -> Option<u8> {
        self.marker
    }

    /// Current byte position in the data.
    pub fn position(&self) -> usize {
        self.pos
    }
}
