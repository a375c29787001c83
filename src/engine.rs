//! The streaming CRC engine
//!
//! A [`CrcEngine`] is a small state machine: it owns a register, a shared
//! (read-only) [`LookupTable`], and a one-shot [`OutputSink`]. Bytes move
//! the register forward; [`CrcEngine::close`] XORs in the final mask and
//! delivers the result exactly once. [`CrcEngine::split`] snapshots the
//! register into an independent successor, which is how the flipper probes
//! many single-bit messages without re-hashing the whole prefix each time.

use std::fmt;
use std::rc::Rc;
use std::cell::RefCell;
use std::sync::Arc;

use crate::error::CrcError;
use crate::primitive::{reflect, Value};
use crate::table::{get_or_build_table, LookupTable};

/// A CRC register/constant at a fixed width, with value-equality that
/// widens across the fixed/big-integer boundary.
#[derive(Debug, Clone)]
pub struct CrcValue {
    pub(crate) value: Value,
    pub(crate) width: u32,
}

impl CrcValue {
    /// Builds a value of `width` bits from a native integer, truncating
    /// away any bits above `width`. Handy for constructing ad hoc flip
    /// targets without going through a full engine.
    pub fn from_u128(value: u128, width: u32) -> CrcValue {
        CrcValue { value: Value::Fixed(value).normalized(width), width }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Bit `i` (0 = least significant).
    pub fn bit(&self, i: u32) -> bool {
        self.value.bit(i)
    }

    pub fn to_radix_string(&self, radix: u32) -> String {
        self.value.to_radix_string(radix)
    }

    pub(crate) fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for CrcValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl PartialEq for CrcValue {
    fn eq(&self, other: &Self) -> bool {
        self.value.eq_widened(&other.value)
    }
}
impl Eq for CrcValue {}

macro_rules! crc_value_eq_native {
    ($($t:ty),*) => {
        $(
            impl PartialEq<$t> for CrcValue {
                fn eq(&self, other: &$t) -> bool {
                    self.value.eq_widened(&Value::Fixed(*other as u128))
                }
            }
        )*
    };
}
crc_value_eq_native!(u8, u16, u32, u64, u128);

/// The Rocksoft model parameters for a CRC.
///
/// Immutable once constructed: [`CrcParams::new`] is the only way to get
/// one, and it rejects the two model shapes this crate doesn't support
/// (non-byte-multiple widths, and mismatched input/output reflection).
#[derive(Debug, Clone, PartialEq)]
pub struct CrcParams {
    pub width: u32,
    pub polynomial: Value,
    pub initial_value: Value,
    pub final_mask: Value,
    pub input_reflected: bool,
    pub output_reflected: bool,
}

impl CrcParams {
    pub fn new(
        width: u32,
        polynomial: impl Into<Value>,
        initial_value: impl Into<Value>,
        final_mask: impl Into<Value>,
        input_reflected: bool,
        output_reflected: bool,
    ) -> Result<CrcParams, CrcError> {
        if width == 0 || width % 8 != 0 {
            return Err(CrcError::UnsupportedModel {
                reason: format!("width {width} is not a positive multiple of 8"),
            });
        }
        if input_reflected != output_reflected {
            return Err(CrcError::UnsupportedModel {
                reason: "differing input/output reflection is not supported".to_owned(),
            });
        }

        Ok(CrcParams {
            width,
            polynomial: polynomial.into().normalized(width),
            initial_value: initial_value.into().normalized(width),
            final_mask: final_mask.into().normalized(width),
            input_reflected,
            output_reflected,
        })
    }

    pub fn reflected(&self) -> bool {
        self.input_reflected
    }
}

/// A caller-owned, exactly-once output handle.
///
/// Closing an engine without a sink attached would lose the result
/// silently; modelling the sink as a consumed `FnOnce` makes "delivered
/// exactly once" a property of the type rather than a convention.
pub struct OutputSink {
    slot: Option<Box<dyn FnOnce(CrcValue)>>,
}

impl OutputSink {
    pub fn new(f: impl FnOnce(CrcValue) + 'static) -> OutputSink {
        OutputSink { slot: Some(Box::new(f)) }
    }

    /// A sink paired with a handle you can read back after `close()`.
    pub fn collector() -> (OutputSink, Rc<RefCell<Option<CrcValue>>>) {
        let cell = Rc::new(RefCell::new(None));
        let write = cell.clone();
        (OutputSink::new(move |v| *write.borrow_mut() = Some(v)), cell)
    }

    pub(crate) fn emit(&mut self, value: CrcValue) {
        match self.slot.take() {
            Some(f) => f(value),
            None => debug_assert!(false, "OutputSink emitted more than once"),
        }
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").field("consumed", &self.slot.is_none()).finish()
    }
}

/// A streaming CRC state machine.
///
/// See the module docs for the lifecycle; the recurrences `add_bytes` runs
/// per byte are exactly the ones the Rocksoft model defines for reflected
/// and normal processing.
pub struct CrcEngine {
    params: CrcParams,
    table: Arc<LookupTable>,
    register: Value,
    closed: bool,
    sink: OutputSink,
}

impl CrcEngine {
    pub fn new(params: CrcParams, sink: OutputSink) -> CrcEngine {
        let table = get_or_build_table(params.width, &params.polynomial, params.input_reflected);
        let register = if params.input_reflected {
            reflect(&params.initial_value, params.width)
        } else {
            params.initial_value.clone()
        };
        log::debug!(
            "constructed CRC engine: width={} reflected={}",
            params.width,
            params.input_reflected
        );
        CrcEngine { params, table, register, closed: false, sink }
    }

    /// A one-shot engine that feeds `message` once and returns its CRC.
    pub fn convert(params: CrcParams, message: &[u8]) -> CrcValue {
        let (sink, result) = OutputSink::collector();
        let mut engine = CrcEngine::new(params, sink);
        engine.add_bytes(message);
        engine.close();
        Rc::try_unwrap(result)
            .map(|cell| cell.into_inner())
            .unwrap_or_else(|cell| cell.borrow().clone())
            .expect("close() always delivers a value")
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn params(&self) -> &CrcParams {
        &self.params
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feeds a finite byte sequence through the register.
    pub fn add_bytes(&mut self, chunk: &[u8]) {
        debug_assert!(!self.closed, "add_bytes called on a closed engine");
        if self.closed {
            return;
        }
        let reflected = self.params.input_reflected;
        let width = self.params.width;
        let table = &self.table.entries;
        if reflected {
            for &b in chunk {
                self.register = step_reflected(&self.register, table, b);
            }
        } else {
            for &b in chunk {
                self.register = step_normal(&self.register, table, b, width);
            }
        }
    }

    /// Equivalent to `add_bytes(&vec![0; n])`, but a no-op once the
    /// register is already zero (`table[0]` is always zero, and both
    /// recurrences map zero-on-zero to zero, so the register can never
    /// become non-zero again without non-zero input).
    pub fn add_zeros(&mut self, n: u64) {
        debug_assert!(!self.closed, "add_zeros called on a closed engine");
        if self.closed || n == 0 || self.register.is_zero() {
            return;
        }
        let reflected = self.params.input_reflected;
        let width = self.params.width;
        let table = &self.table.entries;
        for _ in 0..n {
            self.register = if reflected {
                step_reflected(&self.register, table, 0)
            } else {
                step_normal(&self.register, table, 0, width)
            };
            if self.register.is_zero() {
                break;
            }
        }
    }

    /// Snapshots the current state into a new, independent engine that
    /// writes to `new_sink`. The receiver is unaffected by anything fed to
    /// the returned engine afterwards.
    pub fn split(&self, new_sink: OutputSink) -> CrcEngine {
        CrcEngine {
            params: self.params.clone(),
            table: self.table.clone(),
            register: self.register.clone(),
            closed: self.closed,
            sink: new_sink,
        }
    }

    /// Idempotent. Delivers `register XOR final_mask` to the sink on the
    /// first call; later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.sink.emit(self.peek());
    }

    /// The value `close()` would deliver, computed without mutating state
    /// or touching the sink. Used internally by [`crate::multi_crc::MultiCrc`],
    /// which needs to read a child's value without taking over its sink.
    pub fn peek(&self) -> CrcValue {
        let value = self.register.bitxor(&self.params.final_mask).normalized(self.params.width);
        CrcValue { value, width: self.params.width }
    }
}

/// The capability set a CRC-like sink exposes: feed bytes, extend by zero
/// runs, snapshot, and finalise to a value.
///
/// [`CrcEngine`] and [`crate::multi_crc::MultiCrc`] both implement this, so
/// the flipper (`crate::flipper`) can drive either one — a single catalogued
/// CRC or a composite of several — through the same trait object without
/// caring which.
pub trait CrcSink {
    fn width(&self) -> u32;
    fn add_bytes(&mut self, chunk: &[u8]);
    fn add_zeros(&mut self, n: u64);
    /// An independent successor snapshotting the current state, writing to
    /// a sink only this trait's caller can observe (via `close`'s return).
    fn split(&self) -> Box<dyn CrcSink>;
    /// Closes the sink (idempotently) and returns the value it delivered.
    fn close(&mut self) -> CrcValue;
}

impl CrcSink for CrcEngine {
    fn width(&self) -> u32 {
        CrcEngine::width(self)
    }

    fn add_bytes(&mut self, chunk: &[u8]) {
        CrcEngine::add_bytes(self, chunk)
    }

    fn add_zeros(&mut self, n: u64) {
        CrcEngine::add_zeros(self, n)
    }

    fn split(&self) -> Box<dyn CrcSink> {
        Box::new(CrcEngine::split(self, OutputSink::new(|_| {})))
    }

    fn close(&mut self) -> CrcValue {
        CrcEngine::close(self);
        self.peek()
    }
}

fn step_reflected(register: &Value, table: &[Value], byte: u8) -> Value {
    // reg <- table[(reg ^ byte) & 0xFF] ^ (reg >> 8)
    let idx = register.bitxor(&Value::Fixed(byte as u128)).low_byte();
    table[idx as usize].bitxor(&register.shr(8))
}

fn step_normal(register: &Value, table: &[Value], byte: u8, width: u32) -> Value {
    // reg <- table[((reg >> (width-8)) ^ byte) & 0xFF] ^ ((reg << 8) & mask)
    let idx = register.shr(width - 8).bitxor(&Value::Fixed(byte as u128)).low_byte();
    let shifted_left = register.shl(8).normalized(width);
    table[idx as usize].bitxor(&shifted_left)
}
