//! The CRC-flipper
//!
//! Given a message, a CRC (or [`crate::multi_crc::MultiCrc`] of several),
//! and a set of bit positions the caller is allowed to flip, finds a subset
//! of those positions whose flip drives the CRC to an arbitrary target.
//!
//! The trick is linear algebra: flipping bit `p` XORs the CRC by a fixed
//! constant `c_p` (the CRC of the all-zero message with only bit `p` set),
//! independent of which other bits are flipped, because CRC-under-XOR is
//! GF(2)-linear. So "which subset of positions XORs the CRC from its
//! current value to the target" is exactly `Ax = b` over GF(2), solved by
//! [`crate::bitmatrix::BitMatrix::eliminate`] plus back substitution.

use std::collections::BTreeSet;

use crate::bitmatrix::BitMatrix;
use crate::engine::{CrcEngine, CrcParams, CrcSink, CrcValue, OutputSink};
use crate::error::CrcError;

/// Solves "which bits to flip" problems for one CRC (or composite).
///
/// Constructed from a factory that produces fresh, unfed sinks on demand —
/// the flipper calls it once per `flip_with_*` invocation (to compute
/// `CRC(message)` in [`Flipper::flip_with_data`]) and once per solve (to
/// seed the zero-message engine the positional checksums are built from).
pub struct Flipper {
    factory: Box<dyn Fn() -> Box<dyn CrcSink>>,
    width: u32,
}

impl Flipper {
    /// Builds a flipper from an arbitrary sink factory — use this to target
    /// a [`crate::multi_crc::MultiCrc`] composite.
    pub fn new(width: u32, factory: impl Fn() -> Box<dyn CrcSink> + 'static) -> Flipper {
        Flipper { factory: Box::new(factory), width }
    }

    /// Builds a flipper targeting a single catalogued CRC.
    pub fn for_params(params: CrcParams) -> Flipper {
        let width = params.width;
        Flipper::new(width, move || {
            let (sink, _collector) = OutputSink::collector();
            Box::new(CrcEngine::new(params.clone(), sink)) as Box<dyn CrcSink>
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Computes `CRC(bytes)` and delegates to [`Flipper::flip_with_value`].
    pub fn flip_with_data(
        &self,
        bytes: &[u8],
        allowed_positions: &BTreeSet<u64>,
        target: &CrcValue,
    ) -> Result<Option<BTreeSet<u64>>, CrcError> {
        let mut engine = (self.factory)();
        engine.add_bytes(bytes);
        let crc_of_message = engine.close();
        self.flip_with_value(&crc_of_message, bytes.len() as u64, allowed_positions, target)
    }

    /// Finds a subset `S` of `allowed_positions` such that flipping those
    /// bits in a `length_in_bytes`-byte message whose CRC is
    /// `crc_of_message` yields `target`.
    ///
    /// Returns `Ok(None)` when the target is unreachable from the allowed
    /// positions (`NoSolution`, an expected outcome, not an error); `Err`
    /// only for malformed inputs (`WidthMismatch`, `InvalidPosition`).
    pub fn flip_with_value(
        &self,
        crc_of_message: &CrcValue,
        length_in_bytes: u64,
        allowed_positions: &BTreeSet<u64>,
        target: &CrcValue,
    ) -> Result<Option<BTreeSet<u64>>, CrcError> {
        if target.width() != self.width {
            return Err(CrcError::WidthMismatch {
                expected: self.width as usize,
                found: target.width() as usize,
            });
        }

        let length_bits = 8 * length_in_bytes;
        for &p in allowed_positions {
            if p >= length_bits {
                return Err(CrcError::InvalidPosition { position: p, length_bits });
            }
        }

        if crc_of_message == target {
            log::debug!("flipper: message already matches target, no flips needed");
            return Ok(Some(BTreeSet::new()));
        }

        if allowed_positions.is_empty() {
            log::debug!("flipper: no allowed positions and target unreached, no solution");
            return Ok(None);
        }

        let positions: Vec<u64> = allowed_positions.iter().copied().collect();
        let checksums = self.positional_checksums(&positions, length_in_bytes);

        let w = self.width as usize;
        let n = positions.len();
        let mut matrix = BitMatrix::new(w, n + 1);

        let diff = crc_of_message.value().bitxor(target.value());
        for r in 0..w {
            for (c, checksum) in checksums.iter().enumerate() {
                if checksum.bit(r as u32) {
                    matrix.set(r, c, true).expect("r < w, c < n by construction");
                }
            }
            if diff.bit(r as u32) {
                matrix.set(r, n, true).expect("r < w, n is the augmented column");
            }
        }

        let pivots = matrix.eliminate();
        log::trace!("flipper: eliminated {w}x{} matrix, {} pivots", n + 1, pivots.iter().filter(|&&p| p >= 0).count());

        let solution = match matrix.back_substitute(&pivots) {
            Some(x) => x,
            None => {
                log::debug!("flipper: inconsistent system, target unreachable");
                return Ok(None);
            }
        };

        let flips: BTreeSet<u64> = positions
            .iter()
            .zip(solution.iter())
            .filter_map(|(&p, &set)| set.then_some(p))
            .collect();
        log::debug!("flipper: found a solution flipping {} of {} allowed positions", flips.len(), n);
        Ok(Some(flips))
    }

    /// For each position `p` (already validated, ascending since they come
    /// from a `BTreeSet`), returns `CRC(blank) XOR CRC(blank-with-bit-p-set)`
    /// where `blank` is the all-zero message of `length_in_bytes` bytes.
    ///
    /// Streams a single zero-fed engine forward byte by byte, splitting off
    /// a throwaway copy to inject each single bit, so the total work is
    /// `O(length_in_bytes + positions.len())` rather than
    /// `O(length_in_bytes * positions.len())`.
    fn positional_checksums(&self, positions: &[u64], length_in_bytes: u64) -> Vec<CrcValue> {
        let mut blank = (self.factory)();
        let mut bytes_processed = 0u64;
        let mut single_bit_crcs = Vec::with_capacity(positions.len());

        for &p in positions {
            let byte_index = p / 8;
            let bit_in_byte = (p % 8) as u32;

            let advance = byte_index - bytes_processed;
            if advance > 0 {
                blank.add_zeros(advance);
                bytes_processed += advance;
            }

            let mut single = blank.split();
            single.add_bytes(&[1u8 << bit_in_byte]);
            let remaining = length_in_bytes - bytes_processed - 1;
            single.add_zeros(remaining);
            single_bit_crcs.push(single.close());
        }

        let remaining_blank = length_in_bytes - bytes_processed;
        blank.add_zeros(remaining_blank);
        let crc_blank = blank.close();

        single_bit_crcs
            .into_iter()
            .map(|crc_single| CrcValue {
                value: crc_blank.value().bitxor(crc_single.value()),
                width: self.width,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn crc64_xz() -> CrcParams {
        CrcParams::new(
            64,
            0x42F0E1EBA9EA3693u128,
            0xFFFFFFFFFFFFFFFFu128,
            0xFFFFFFFFFFFFFFFFu128,
            true,
            true,
        )
        .unwrap()
    }

    fn crc32_xz() -> CrcParams {
        CrcParams::new(32, 0x04C11DB7u128, 0xFFFFFFFFu128, 0xFFFFFFFFu128, true, true).unwrap()
    }

    #[test]
    fn already_matching_returns_empty_set() {
        let flipper = Flipper::for_params(crc32_xz());
        let crc = CrcEngine::convert(crc32_xz(), b"123456789");
        let positions: BTreeSet<u64> = [0, 1, 2].into_iter().collect();
        let result = flipper.flip_with_data(b"123456789", &positions, &crc).unwrap();
        assert_eq!(result, Some(BTreeSet::new()));
    }

    #[test]
    fn empty_positions_with_mismatched_target_has_no_solution() {
        let flipper = Flipper::for_params(crc32_xz());
        let crc = CrcEngine::convert(crc32_xz(), b"123456789");
        // perturb by one bit so it doesn't match
        let target = CrcValue { value: crc.value().bitxor(&crate::primitive::Value::Fixed(1)), width: 32 };
        let result = flipper.flip_with_data(b"123456789", &BTreeSet::new(), &target).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let flipper = Flipper::for_params(crc32_xz());
        let target = CrcValue { value: crate::primitive::Value::Fixed(0), width: 16 };
        let result = flipper.flip_with_data(b"123456789", &BTreeSet::new(), &target);
        assert!(matches!(result, Err(CrcError::WidthMismatch { expected: 32, found: 16 })));
    }

    #[test]
    fn invalid_position_is_rejected() {
        let flipper = Flipper::for_params(crc32_xz());
        let crc = CrcEngine::convert(crc32_xz(), b"abc");
        let positions: BTreeSet<u64> = [100].into_iter().collect();
        let result = flipper.flip_with_data(b"abc", &positions, &crc);
        assert!(matches!(result, Err(CrcError::InvalidPosition { position: 100, length_bits: 24 })));
    }

    #[test]
    fn flips_a_single_bit_to_hit_an_arbitrary_target() {
        let flipper = Flipper::for_params(crc32_xz());
        let message = b"123456789".to_vec();
        let crc = CrcEngine::convert(crc32_xz(), &message);

        // allow flipping every bit of the message; some subset must reach
        // any reachable target since width=32 <= 9 bytes * 8 bits
        let positions: BTreeSet<u64> = (0..message.len() as u64 * 8).collect();
        let target = CrcValue { value: crc.value().bitxor(&crate::primitive::Value::Fixed(0xDEADBEEFu128)), width: 32 };

        let result = flipper.flip_with_data(&message, &positions, &target).unwrap();
        let flips = result.expect("target is reachable with the full bit range allowed");

        let mut flipped = message.clone();
        for p in &flips {
            let byte_index = (p / 8) as usize;
            let bit = (p % 8) as u32;
            flipped[byte_index] ^= 1 << bit;
        }
        let flipped_crc = CrcEngine::convert(crc32_xz(), &flipped);
        assert_eq!(flipped_crc, target);
        assert!(flips.iter().all(|p| positions.contains(p)));
        assert!(flips.len() <= 32);
    }

    #[test]
    fn soundness_holds_over_crc64() {
        let flipper = Flipper::for_params(crc64_xz());
        let message = b"the quick brown fox jumps over the lazy dog, twice".to_vec();
        let crc = CrcEngine::convert(crc64_xz(), &message);
        let positions: BTreeSet<u64> = (0..message.len() as u64 * 8).collect();
        let target = CrcValue {
            value: crc.value().bitxor(&crate::primitive::Value::Fixed(0x1234_5678_9ABC_DEF0u128)),
            width: 64,
        };

        let flips = flipper
            .flip_with_data(&message, &positions, &target)
            .unwrap()
            .expect("reachable with the full bit range allowed");

        let mut flipped = message.clone();
        for p in &flips {
            let byte_index = (p / 8) as usize;
            let bit = (p % 8) as u32;
            flipped[byte_index] ^= 1 << bit;
        }
        assert_eq!(CrcEngine::convert(crc64_xz(), &flipped), target);
    }

    /// Allowing only bit 5 of every lowercase ASCII letter (the bit that
    /// toggles case) is just a case-flip problem dressed up as a CRC one:
    /// the solver should find some subset of those letters whose case-flip
    /// lands the CRC on an arbitrary target. The exact subset depends on
    /// elimination tie-breaking (the system is underdetermined: far more
    /// lowercase letters than the 64-bit target space), so this checks the
    /// soundness property rather than one particular expected string.
    #[test]
    fn flips_case_bits_to_hit_an_arbitrary_crc64_target() {
        let flipper = Flipper::for_params(crc64_xz());
        let message =
            b"flipping lowercases to uppercases like mama pig making hot pancakes for daddy pig in peppa pig cartoon"
                .to_vec();
        assert_eq!(message.len(), 102);

        let positions: BTreeSet<u64> = message
            .iter()
            .enumerate()
            .filter(|(_, &b)| b.is_ascii_lowercase())
            .map(|(i, _)| i as u64 * 8 + 5)
            .collect();

        let target = CrcValue::from_u128(0xDEADBEEFCAFEBABEu128, 64);
        let flips = flipper
            .flip_with_data(&message, &positions, &target)
            .unwrap()
            .expect("reachable: 64 dims, far more than 64 candidate letters' worth of freedom");

        assert!(flips.iter().all(|p| positions.contains(p)));
        assert!(flips.len() <= 64);

        let mut flipped = message.clone();
        for &p in &flips {
            let byte_index = (p / 8) as usize;
            let bit = (p % 8) as u32;
            flipped[byte_index] ^= 1 << bit;
            // bit 5 is the only difference between an ASCII letter's upper
            // and lower case, so every flipped position really is a letter
            // changing case, nothing else.
            assert!(flipped[byte_index].is_ascii_alphabetic());
        }
        assert_eq!(CrcEngine::convert(crc64_xz(), &flipped), target);
    }
}
