//! Inverse Discrete Cosine Transform (IDCT) for JPEG decoding.
//!
//! Integer "islow" algorithm from libjpeg's jidctint.c: a column pass that
//! keeps `PASS1_BITS` of extra precision, then a row pass that removes all
//! scaling, adds the level shift and clamps.

/// Fixed-point scale factor (13 bits of fractional precision, like libjpeg)
const CONST_BITS: u32 = 13;
const PASS1_BITS: u32 = 2;

/// Fixed-point constants for the IDCT (scaled by 2^13)
const FIX_0_298631336: i32 = 2446;
const FIX_0_390180644: i32 = 3196;
const FIX_0_541196100: i32 = 4433;
const FIX_0_765366865: i32 = 6270;
const FIX_0_899976223: i32 = 7373;
const FIX_1_175875602: i32 = 9633;
const FIX_1_501321110: i32 = 12299;
const FIX_1_847759065: i32 = 15137;
const FIX_1_961570560: i32 = 16069;
const FIX_2_053119869: i32 = 16819;
const FIX_2_562915447: i32 = 20995;
const FIX_3_072711026: i32 = 25172;

/// Zigzag index to natural (row-major) index.
pub const UNZIGZAG: [usize; 64] = [
    0, 1, 8, 16, 9, 2, 3, 10, 17, 24, 32, 25, 18, 11, 4, 5, 12, 19, 26, 33, 40, 48, 41, 34, 27,
    20, 13, 6, 7, 14, 21, 28, 35, 42, 49, 56, 57, 50, 43, 36, 29, 22, 15, 23, 30, 37, 44, 51, 58,
    59, 52, 45, 38, 31, 39, 46, 53, 60, 61, 54, 47, 55, 62, 63,
];

/// Round and shift right by `n` bits.
#[inline(always)]
fn descale(x: i32, n: u32) -> i32 {
    (x + (1 << (n - 1))) >> n
}

/// One-dimensional 8-point IDCT on `input[0], input[stride], ...`.
///
/// Returns the eight outputs still scaled by 2^CONST_BITS.
#[inline(always)]
fn idct_1d(d: [i32; 8]) -> [i32; 8] {
    // Even part
    let z1 = (d[2] + d[6]).wrapping_mul(FIX_0_541196100);
    let tmp2 = z1.wrapping_sub(d[6].wrapping_mul(FIX_1_847759065));
    let tmp3 = z1.wrapping_add(d[2].wrapping_mul(FIX_0_765366865));

    let tmp0 = (d[0] + d[4]) << CONST_BITS;
    let tmp1 = (d[0] - d[4]) << CONST_BITS;

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    // Odd part
    let (t0, t1, t2, t3) = (d[7], d[5], d[3], d[1]);
    let z1 = t0 + t3;
    let z2 = t1 + t2;
    let z3 = t0 + t2;
    let z4 = t1 + t3;
    let z5 = (z3 + z4).wrapping_mul(FIX_1_175875602);

    let t0 = t0.wrapping_mul(FIX_0_298631336);
    let t1 = t1.wrapping_mul(FIX_2_053119869);
    let t2 = t2.wrapping_mul(FIX_3_072711026);
    let t3 = t3.wrapping_mul(FIX_1_501321110);
    let z1 = z1.wrapping_mul(-FIX_0_899976223);
    let z2 = z2.wrapping_mul(-FIX_2_562915447);
    let z3 = z3.wrapping_mul(-FIX_1_961570560) + z5;
    let z4 = z4.wrapping_mul(-FIX_0_390180644) + z5;

    let t0 = t0 + z1 + z3;
    let t1 = t1 + z2 + z4;
    let t2 = t2 + z2 + z3;
    let t3 = t3 + z1 + z4;

    [
        tmp10 + t3,
        tmp11 + t2,
        tmp12 + t1,
        tmp13 + t0,
        tmp13 - t0,
        tmp12 - t1,
        tmp11 - t2,
        tmp10 - t3,
    ]
}

/// Perform 2D inverse DCT on an 8x8 block of dequantized coefficients in
/// natural order. Returns level-shifted samples.
pub fn idct_2d_integer(coeffs: &[i32; 64]) -> [u8; 64] {
    let mut workspace = [0i32; 64];

    // Pass 1: columns
    for col in 0..8 {
        let column = std::array::from_fn(|row| coeffs[row * 8 + col]);
        let out = idct_1d(column);
        for (row, value) in out.into_iter().enumerate() {
            workspace[row * 8 + col] = descale(value, CONST_BITS - PASS1_BITS);
        }
    }

    // Pass 2: rows
    let mut output = [0u8; 64];
    for row in 0..8 {
        let line = std::array::from_fn(|col| workspace[row * 8 + col]);
        let out = idct_1d(line);
        for (col, value) in out.into_iter().enumerate() {
            output[row * 8 + col] = descale_and_clamp(value);
        }
    }

    output
}

/// Remove the remaining scaling, add the level shift and clamp to 0-255.
#[inline(always)]
fn descale_and_clamp(val: i32) -> u8 {
    (descale(val, CONST_BITS + PASS1_BITS + 3) + 128).clamp(0, 255) as u8
}

/// Dequantize a block.
///
/// `coeffs` and `qtable` are both in zigzag order (as stored in the file);
/// the result is in natural order.
pub fn dequantize(coeffs: &[i32; 64], qtable: &[u16; 64]) -> [i32; 64] {
    let mut result = [0i32; 64];
    for (zz, &natural) in UNZIGZAG.iter().enumerate() {
        result[natural] = coeffs[zz].wrapping_mul(qtable[zz] as i32);
    }
    result
}
