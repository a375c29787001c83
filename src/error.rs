//! Error types
//!
//! This crate has no dependency on `thiserror`/`anyhow` — errors are a
//! small, closed set of conditions raised synchronously at construction or
//! at a flipper call site, so a hand-written enum plus `std::error::Error`
//! is all that's needed.
//!
//! `NoSolution` is deliberately not a variant here: an unreachable flip
//! target is an expected outcome of [`crate::flipper::Flipper`], represented
//! by `Ok(None)` rather than an `Err`.

use std::fmt;

/// Errors raised by CRC engine construction and flipper calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrcError {
    /// `width` wasn't a multiple of 8, or input/output reflection differed.
    UnsupportedModel { reason: String },
    /// A flipper position fell outside `0..8*length_in_bytes`.
    InvalidPosition { position: u64, length_bits: u64 },
    /// A flipper target's width didn't match the engine's width.
    WidthMismatch { expected: usize, found: usize },
    /// An out-of-bounds index into a `BitArray`/`BitMatrix`.
    RangeError { index: usize, len: usize },
}

impl fmt::Display for CrcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrcError::UnsupportedModel { reason } => {
                write!(f, "unsupported CRC model: {reason}")
            }
            CrcError::InvalidPosition { position, length_bits } => write!(
                f,
                "bit position {position} is out of range for a {length_bits}-bit message"
            ),
            CrcError::WidthMismatch { expected, found } => write!(
                f,
                "width mismatch: engine is {expected} bits wide, target is {found} bits wide"
            ),
            CrcError::RangeError { index, len } => {
                write!(f, "index {index} out of range for length {len}")
            }
        }
    }
}

impl std::error::Error for CrcError {}
