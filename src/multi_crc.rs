//! Multi-CRC composite
//!
//! Wraps an ordered list of CRC sinks (each a [`CrcEngine`], a nested
//! [`MultiCrc`], or anything else implementing [`CrcSink`]) as a single
//! sink of width `sum(child widths)`, whose output is the bit-concatenation
//! of the children's outputs in order. This is how the flipper targets
//! several independent CRCs with one linear system: build a `MultiCrc` over
//! the CRCs of interest and solve for a bit set that hits the concatenated
//! target.

use crate::engine::{CrcSink, CrcValue, OutputSink};
use crate::primitive::Value;

/// A composite CRC sink over `children`, width `sum(children widths)`.
pub struct MultiCrc {
    children: Vec<Box<dyn CrcSink>>,
    width: u32,
    closed: bool,
    sink: OutputSink,
    composed: Option<CrcValue>,
}

impl MultiCrc {
    /// Builds a composite over `children` (order matters: it determines
    /// both processing fan-out and the bit-concatenation order on close).
    pub fn new(children: Vec<Box<dyn CrcSink>>, sink: OutputSink) -> MultiCrc {
        let width = children.iter().map(|c| c.width()).sum();
        log::debug!("constructed multi-CRC composite: {} children, width={width}", children.len());
        MultiCrc { children, width, closed: false, sink, composed: None }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feeds `chunk` to every child in order.
    pub fn add_bytes(&mut self, chunk: &[u8]) {
        debug_assert!(!self.closed, "add_bytes called on a closed composite");
        for child in self.children.iter_mut() {
            child.add_bytes(chunk);
        }
    }

    /// Extends every child by `n` zero bytes.
    pub fn add_zeros(&mut self, n: u64) {
        debug_assert!(!self.closed, "add_zeros called on a closed composite");
        for child in self.children.iter_mut() {
            child.add_zeros(n);
        }
    }

    /// Deep-copies every child into a new, independent composite.
    pub fn split(&self, new_sink: OutputSink) -> MultiCrc {
        let children = self.children.iter().map(|c| c.split()).collect();
        MultiCrc { children, width: self.width, closed: self.closed, sink: new_sink, composed: None }
    }

    /// Idempotent. Closes every child, composes their values by
    /// bit-concatenation (`((v1 << w2) | v2) << w3 | v3) ...`), and
    /// delivers the result to the sink on the first call.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let value = self.compose();
        self.sink.emit(value);
    }

    fn compose(&mut self) -> CrcValue {
        if let Some(v) = &self.composed {
            return v.clone();
        }
        // Normalize to the *total* width at every step, not the
        // running partial width: the representation (fixed vs. big) must
        // stay fixed across the whole fold, or a late shift can overflow
        // a u128 accumulator that was sized for an earlier, narrower
        // partial sum.
        let mut acc = Value::zero(self.width);
        for child in self.children.iter_mut() {
            let child_width = child.width();
            let child_value = child.close();
            acc = acc.shl(child_width).bitor(child_value.value()).normalized(self.width);
        }
        let value = CrcValue { value: acc, width: self.width };
        self.composed = Some(value.clone());
        value
    }
}

impl CrcSink for MultiCrc {
    fn width(&self) -> u32 {
        MultiCrc::width(self)
    }

    fn add_bytes(&mut self, chunk: &[u8]) {
        MultiCrc::add_bytes(self, chunk)
    }

    fn add_zeros(&mut self, n: u64) {
        MultiCrc::add_zeros(self, n)
    }

    fn split(&self) -> Box<dyn CrcSink> {
        Box::new(MultiCrc::split(self, OutputSink::new(|_| {})))
    }

    fn close(&mut self) -> CrcValue {
        MultiCrc::close(self);
        self.compose()
    }
}
