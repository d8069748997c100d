//! CRC64/ECMA, the checksum the service reports in `x-cos-hash-crc64ecma`.
//!
//! The parameters are ECMA-182 reflected with all-ones init and xorout,
//! which is what `CRC_64_XZ` implements. `combine` folds the digests of two
//! adjacent byte ranges into the digest of their concatenation, so parallel
//! workers can each checksum their own chunk and the coordinator can still
//! produce the whole-object value in part order.

use crc::{Crc, CRC_64_XZ};

static CRC64_ECMA: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Streaming CRC64/ECMA digest.
pub struct Crc64 {
    digest: crc::Digest<'static, u64>,
}

impl Crc64 {
    /// Start a new digest.
    pub fn new() -> Self {
        Self {
            digest: CRC64_ECMA.digest(),
        }
    }

    /// Feed bytes into the digest.
    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    /// Finish and return the checksum.
    pub fn finalize(self) -> u64 {
        self.digest.finalize()
    }
}

impl Default for Crc64 {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum a contiguous buffer.
pub fn checksum(bytes: &[u8]) -> u64 {
    CRC64_ECMA.checksum(bytes)
}

// GF(2) helpers for `combine`: a CRC over zeroes is a linear operator, so
// appending len2 zero bytes to crc1 is a matrix power applied to it.

const POLY_REFLECTED: u64 = 0xC96C_5795_D787_0F42;

fn gf2_matrix_times(mat: &[u64; 64], mut vec: u64) -> u64 {
    let mut sum = 0;
    let mut i = 0;
    while vec != 0 {
        if vec & 1 != 0 {
            sum ^= mat[i];
        }
        vec >>= 1;
        i += 1;
    }
    sum
}

fn gf2_matrix_square(square: &mut [u64; 64], mat: &[u64; 64]) {
    for n in 0..64 {
        square[n] = gf2_matrix_times(mat, mat[n]);
    }
}

/// Combine `crc1` (over a leading range) and `crc2` (over the following
/// `len2` bytes) into the CRC of the concatenated range.
pub fn combine(mut crc1: u64, crc2: u64, mut len2: u64) -> u64 {
    if len2 == 0 {
        return crc1;
    }

    let mut even = [0u64; 64];
    let mut odd = [0u64; 64];

    // The operator for one zero bit, then squared up to one zero byte.
    odd[0] = POLY_REFLECTED;
    let mut row = 1u64;
    for item in odd.iter_mut().skip(1) {
        *item = row;
        row <<= 1;
    }
    gf2_matrix_square(&mut even, &odd);
    gf2_matrix_square(&mut odd, &even);

    loop {
        gf2_matrix_square(&mut even, &odd);
        if len2 & 1 != 0 {
            crc1 = gf2_matrix_times(&even, crc1);
        }
        len2 >>= 1;
        if len2 == 0 {
            break;
        }

        gf2_matrix_square(&mut odd, &even);
        if len2 & 1 != 0 {
            crc1 = gf2_matrix_times(&odd, crc1);
        }
        len2 >>= 1;
        if len2 == 0 {
            break;
        }
    }

    crc1 ^ crc2
}
