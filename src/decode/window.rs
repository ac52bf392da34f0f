//! LZ77 history window for back-reference expansion.

use super::inflate::InflateErrorKind;

/// DEFLATE window size (32 KiB).
pub const WINDOW_SIZE: usize = 0x8000;

const WINDOW_MASK: usize = WINDOW_SIZE - 1;

/// Circular buffer holding the most recent 32 KiB of output.
///
/// Every byte appended to the output passes through the window, so a
/// back-reference can be resolved without looking at the output buffer.
pub struct SlidingWindow {
    buf: Box<[u8]>,
    cursor: usize,
    /// Bytes written so far, saturating at the window size.
    filled: usize,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; WINDOW_SIZE].into_boxed_slice(),
            cursor: 0,
            filled: 0,
        }
    }

    /// Append a literal byte to the window and the output.
    #[inline]
    pub fn push_byte(&mut self, byte: u8, out: &mut Vec<u8>) {
        self.buf[self.cursor] = byte;
        self.cursor = (self.cursor + 1) & WINDOW_MASK;
        if self.filled < WINDOW_SIZE {
            self.filled += 1;
        }
        out.push(byte);
    }

    /// Append a run of bytes (stored block payload).
    pub fn push_slice(&mut self, bytes: &[u8], out: &mut Vec<u8>) {
        out.extend_from_slice(bytes);

        // Only the last WINDOW_SIZE bytes can ever be referenced.
        let tail = &bytes[bytes.len().saturating_sub(WINDOW_SIZE)..];
        let first = tail.len().min(WINDOW_SIZE - self.cursor);
        self.buf[self.cursor..self.cursor + first].copy_from_slice(&tail[..first]);
        self.buf[..tail.len() - first].copy_from_slice(&tail[first..]);

        self.cursor = (self.cursor + tail.len()) & WINDOW_MASK;
        self.filled = (self.filled + bytes.len()).min(WINDOW_SIZE);
    }

    /// Copy `length` bytes starting `distance` bytes back.
    ///
    /// The source may overlap the bytes being written, so `distance = 1`
    /// repeats the previous byte `length` times.
    pub fn copy_backref(
        &mut self,
        length: usize,
        distance: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), InflateErrorKind> {
        if distance == 0 || distance > self.filled {
            return Err(InflateErrorKind::InvalidDistance);
        }

        out.reserve(length);
        let mut src = self.cursor.wrapping_sub(distance) & WINDOW_MASK;
        for _ in 0..length {
            let byte = self.buf[src];
            self.buf[self.cursor] = byte;
            out.push(byte);
            src = (src + 1) & WINDOW_MASK;
            self.cursor = (self.cursor + 1) & WINDOW_MASK;
        }
        self.filled = (self.filled + length).min(WINDOW_SIZE);
        Ok(())
    }

    /// Number of bytes available for back-references.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// True before anything has been written.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }
}

impl Default for SlidingWindow {
    fn default() -> Self {
        Self::new()
    }
}
