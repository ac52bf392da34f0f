//! Adler-32 checksum (RFC 1950) used for zlib trailers.

const MOD_ADLER: u32 = 65_521;

/// Largest n such that 255*n*(n+1)/2 + (n+1)*(MOD_ADLER-1) <= 2^32-1.
/// Sums may run this many bytes before a modulo is required.
const NMAX: usize = 5552;

/// Calculate the Adler-32 checksum of `data` in one pass.
#[inline]
#[must_use]
pub fn adler32(data: &[u8]) -> u32 {
    let mut hasher = Adler32::new();
    hasher.update(data);
    hasher.finish()
}

/// Running Adler-32 state.
///
/// The inflater feeds every emitted byte run through this as it is
/// produced, so the trailer can be checked without rescanning the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adler32 {
    s1: u32,
    s2: u32,
}

impl Adler32 {
    /// Start a new checksum (value 1).
    pub const fn new() -> Self {
        Self { s1: 1, s2: 0 }
    }

    /// Add `data` to the checksum.
    pub fn update(&mut self, data: &[u8]) {
        // Modulo deferred to chunk boundaries
        for chunk in data.chunks(NMAX) {
            for &b in chunk {
                self.s1 += b as u32;
                self.s2 += self.s1;
            }
            self.s1 %= MOD_ADLER;
            self.s2 %= MOD_ADLER;
        }
    }

    /// Current checksum value.
    #[inline]
    pub const fn finish(&self) -> u32 {
        (self.s2 << 16) | self.s1
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}
