//! Parametric streaming CRCs, and a GF(2) solver for flipping bits to hit
//! a target checksum.
//!
//! [`engine`] is the Rocksoft-model CRC engine: construct it from
//! [`engine::CrcParams`], feed it bytes incrementally, and close it to get
//! a [`engine::CrcValue`]. [`multi_crc`] composes several engines into one
//! wider sink. [`flipper`] is the inverse problem: given a message, a CRC,
//! and a set of bit positions you're allowed to flip, find a subset whose
//! flip drives the CRC to an arbitrary target.

/// Error types raised by engine construction and flipper calls.
pub mod error;

/// Wide-integer primitives: the fixed/big-integer [`primitive::Value`] and
/// `reflect`.
pub mod primitive;

/// Byte-at-a-time lookup table construction and the process-wide cache.
pub mod table;

/// The streaming CRC engine and its parameters.
pub mod engine;

/// The multi-CRC composite sink.
pub mod multi_crc;

/// Bit-packed vectors/matrices and Gaussian elimination over GF(2).
pub mod bitmatrix;

/// The CRC-flipper.
pub mod flipper;

pub use engine::{CrcEngine, CrcParams, CrcSink, CrcValue, OutputSink};
pub use error::CrcError;
pub use flipper::Flipper;
pub use multi_crc::MultiCrc;
