//! Checksum engine for the replication buffer.
//!
//! Three layers of CRC machinery, all built on GF(2) polynomial
//! arithmetic:
//!
//! - **Incremental update** ([`crc32_partial`], [`crc64_partial`]): classic
//!   reflected table-driven CRC, taking and returning finalized values so a
//!   running checksum can be extended as bytes stream through the buffer.
//! - **Combine** ([`combine_crc32`], [`combine_crc64`]): computes the CRC of
//!   a concatenation from the CRCs of its parts without rescanning, by
//!   advancing the first CRC through the length of the second in the
//!   quotient ring GF(2)[x]/p.
//! - **Repair** ([`check_and_repair`], [`find_corrupted_bit`],
//!   [`repair_bit`]): CRC-32 is a cyclic code, so a single flipped bit at
//!   position *i* produces a syndrome equal to a known power of the field
//!   element ζ = x. A baby-step/giant-step discrete logarithm recovers *i*
//!   and the flip is undone in place.
//!
//! All constant tables are built in `const` blocks; there is no lazily
//! initialized global state.
//!
//! CRC-32 uses the reflected IEEE polynomial, CRC-64 the reflected
//! CRC-64/XZ polynomial. Both use all-ones init and final complement, so
//! `crcNN_partial(0, data)` equals the one-shot `crcNN(data)`.

mod combine;
mod repair;

pub use combine::{combine_crc32, combine_crc64};
pub use repair::{check_and_repair, find_corrupted_bit, repair_bit, RepairOutcome};

/// Reflected CRC-32 (IEEE) polynomial.
pub(crate) const CRC32_POLY: u32 = 0xEDB8_8320;

/// Reflected CRC-64/XZ polynomial.
pub(crate) const CRC64_POLY: u64 = 0xC96C_5795_D787_0F42;

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC32_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

const CRC64_TABLE: [u64; 256] = {
    let mut table = [0u64; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u64;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC64_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Extends a finalized CRC-32 over additional bytes.
///
/// `crc32_partial(crc32(a), b) == crc32(a ‖ b)`; passing 0 starts a fresh
/// checksum.
#[must_use]
pub fn crc32_partial(crc: u32, data: &[u8]) -> u32 {
    let mut c = !crc;
    for &byte in data {
        let index = ((c ^ u32::from(byte)) & 0xFF) as usize;
        c = (c >> 8) ^ CRC32_TABLE[index];
    }
    !c
}

/// Computes the CRC-32 of a byte slice.
#[must_use]
pub fn crc32(data: &[u8]) -> u32 {
    crc32_partial(0, data)
}

/// Extends a finalized CRC-64 over additional bytes.
///
/// `crc64_partial(crc64(a), b) == crc64(a ‖ b)`; passing 0 starts a fresh
/// checksum.
#[must_use]
pub fn crc64_partial(crc: u64, data: &[u8]) -> u64 {
    let mut c = !crc;
    for &byte in data {
        let index = ((c ^ u64::from(byte)) & 0xFF) as usize;
        c = (c >> 8) ^ CRC64_TABLE[index];
    }
    !c
}

/// Computes the CRC-64 of a byte slice.
#[must_use]
pub fn crc64(data: &[u8]) -> u64 {
    crc64_partial(0, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_known_value() {
        // Standard check vector for the reflected IEEE polynomial.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn crc32_empty() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn crc64_known_value() {
        // Standard check vector for CRC-64/XZ.
        assert_eq!(crc64(b"123456789"), 0x995D_C9BB_DF19_39FA);
    }

    #[test]
    fn crc64_empty() {
        assert_eq!(crc64(b""), 0);
    }

    #[test]
    fn partial_extension_matches_one_shot() {
        let whole = crc32(b"123456789");
        let partial = crc32_partial(crc32(b"1234"), b"56789");
        assert_eq!(partial, whole);

        let whole64 = crc64(b"123456789");
        let partial64 = crc64_partial(crc64(b"1234"), b"56789");
        assert_eq!(partial64, whole64);
    }

    #[test]
    fn partial_byte_at_a_time() {
        let data = b"incremental checksum over a stream";
        let mut crc = 0u32;
        for byte in data {
            crc = crc32_partial(crc, std::slice::from_ref(byte));
        }
        assert_eq!(crc, crc32(data));
    }
}
