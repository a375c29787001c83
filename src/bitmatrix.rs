//! Bit-packed vectors and matrices over GF(2), and Gaussian elimination
//!
//! The flipper reduces "which bits to flip" to "solve `Ax = b` over GF(2)",
//! and this is the GF(2) half of that: a packed boolean vector
//! ([`BitArray`]), a grid of them ([`BitMatrix`]), and in-place reduced
//! row-echelon elimination plus back substitution.

use crate::error::CrcError;

/// A fixed-length sequence of bits, packed 32 to a word.
///
/// Length is fixed at construction; there is no way to grow or shrink one
/// after the fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    len: usize,
    words: Vec<u32>,
}

impl BitArray {
    pub fn new(len: usize) -> BitArray {
        BitArray { len, words: vec![0u32; (len + 31) / 32] }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, i: usize) -> Result<bool, CrcError> {
        debug_assert!(i < self.len, "BitArray::get index {i} out of range for length {}", self.len);
        if i >= self.len {
            return Err(CrcError::RangeError { index: i, len: self.len });
        }
        Ok((self.words[i / 32] >> (i % 32)) & 1 == 1)
    }

    pub fn set(&mut self, i: usize, value: bool) -> Result<(), CrcError> {
        debug_assert!(i < self.len, "BitArray::set index {i} out of range for length {}", self.len);
        if i >= self.len {
            return Err(CrcError::RangeError { index: i, len: self.len });
        }
        let mask = 1u32 << (i % 32);
        if value {
            self.words[i / 32] |= mask;
        } else {
            self.words[i / 32] &= !mask;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        for w in &mut self.words {
            *w = 0;
        }
    }

    /// In-place `self ^= other`, panicking on length mismatch (a mismatch
    /// here is always a caller bug, not a reachable runtime condition).
    pub fn xor_assign(&mut self, other: &BitArray) {
        debug_assert_eq!(self.len, other.len, "xor_assign between mismatched-length rows");
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a ^= b;
        }
    }

    /// Index of the first set bit at or after `from`, if any.
    pub fn first_set_from(&self, from: usize) -> Option<usize> {
        (from..self.len).find(|&i| self.get(i).unwrap_or(false))
    }
}

/// A fixed `rows x cols` grid of bits, stored row-major as [`BitArray`]s.
#[derive(Debug, Clone)]
pub struct BitMatrix {
    rows: usize,
    cols: usize,
    data: Vec<BitArray>,
}

impl BitMatrix {
    pub fn new(rows: usize, cols: usize) -> BitMatrix {
        BitMatrix { rows, cols, data: (0..rows).map(|_| BitArray::new(cols)).collect() }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, r: usize, c: usize) -> Result<bool, CrcError> {
        debug_assert!(r < self.rows, "BitMatrix::get row {r} out of range for {} rows", self.rows);
        debug_assert!(c < self.cols, "BitMatrix::get col {c} out of range for {} cols", self.cols);
        if r >= self.rows {
            return Err(CrcError::RangeError { index: r, len: self.rows });
        }
        self.data[r].get(c)
    }

    pub fn set(&mut self, r: usize, c: usize, value: bool) -> Result<(), CrcError> {
        debug_assert!(r < self.rows, "BitMatrix::set row {r} out of range for {} rows", self.rows);
        debug_assert!(c < self.cols, "BitMatrix::set col {c} out of range for {} cols", self.cols);
        if r >= self.rows {
            return Err(CrcError::RangeError { index: r, len: self.rows });
        }
        self.data[r].set(c, value)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        self.data.swap(a, b);
    }

    /// Reduces this matrix to reduced row-echelon form in place and returns
    /// the per-row pivot column, or `-1` for a row that reduced to zero.
    ///
    /// Idempotent: an already-reduced matrix is left unchanged and running
    /// this twice returns the same pivot vector both times.
    pub fn eliminate(&mut self) -> Vec<i64> {
        let mut pivots = vec![-1i64; self.rows];
        let mut fixed_rows = 0;

        for col in 0..self.cols {
            if fixed_rows >= self.rows {
                break;
            }
            let pivot_row = (fixed_rows..self.rows)
                .find(|&r| self.data[r].get(col).unwrap_or(false));
            let Some(pivot_row) = pivot_row else { continue };

            self.swap_rows(fixed_rows, pivot_row);
            pivots[fixed_rows] = col as i64;

            for r in 0..self.rows {
                if r != fixed_rows && self.data[r].get(col).unwrap_or(false) {
                    let pivot = self.data[fixed_rows].clone();
                    self.data[r].xor_assign(&pivot);
                }
            }
            fixed_rows += 1;
        }

        pivots
    }

    /// Back-substitutes an already-eliminated matrix (with the augmented
    /// column being the last, index `cols - 1`) into a solution vector of
    /// length `cols - 1`. Returns `None` if the system is inconsistent
    /// (an all-zero row whose augmented bit is set, or a pivot that landed
    /// in the augmented column itself).
    pub fn back_substitute(&self, pivots: &[i64]) -> Option<Vec<bool>> {
        let n = self.cols - 1;
        let mut x = vec![false; n];

        for r in (0..self.rows).rev() {
            let p = pivots[r];
            let augmented = self.data[r].get(n).unwrap_or(false);
            if p < 0 {
                if augmented {
                    return None;
                }
                continue;
            }
            let p = p as usize;
            if p >= n {
                return None;
            }
            let mut known = augmented;
            for c in (p + 1)..n {
                if self.data[r].get(c).unwrap_or(false) && x[c] {
                    known ^= true;
                }
            }
            x[p] = known;
        }

        Some(x)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bit_array_get_set() {
        let mut a = BitArray::new(40);
        assert_eq!(a.len(), 40);
        a.set(0, true).unwrap();
        a.set(39, true).unwrap();
        assert!(a.get(0).unwrap());
        assert!(a.get(39).unwrap());
        assert!(!a.get(20).unwrap());
        a.reset();
        assert!(!a.get(0).unwrap());
    }

    // `get`/`set` trip a `debug_assert!` ahead of the soft `Err` return (the
    // same belt-and-suspenders shape as `CrcEngine::add_bytes`'s `!closed`
    // check), so in a debug test build this is a panic, not an `Err`.
    #[test]
    #[should_panic(expected = "out of range")]
    fn bit_array_out_of_range() {
        let a = BitArray::new(8);
        let _ = a.get(8);
    }

    #[test]
    fn diagonal_pivots() {
        let mut m = BitMatrix::new(3, 4);
        for i in 0..3 {
            m.set(i, i, true).unwrap();
        }
        let pivots = m.eliminate();
        assert_eq!(pivots, vec![0, 1, 2]);
    }

    #[test]
    fn anti_diagonal_pivots() {
        let mut m = BitMatrix::new(3, 4);
        for i in 0..3 {
            m.set(i, 2 - i, true).unwrap();
        }
        let pivots = m.eliminate();
        assert_eq!(pivots, vec![0, 1, 2]);
    }

    #[test]
    fn eliminate_is_idempotent() {
        let mut m = BitMatrix::new(3, 5);
        m.set(0, 1, true).unwrap();
        m.set(1, 0, true).unwrap();
        m.set(1, 2, true).unwrap();
        m.set(2, 2, true).unwrap();
        m.set(2, 4, true).unwrap();

        let once = m.eliminate();
        let snapshot = m.clone();
        let twice = m.eliminate();
        assert_eq!(once, twice);
        assert_eq!(snapshot.rows, m.rows);
    }

    #[test]
    fn inconsistent_row_yields_no_solution() {
        let mut m = BitMatrix::new(2, 3);
        // row 0: all zero in the coefficient columns, augmented bit set
        m.set(0, 2, true).unwrap();
        m.set(1, 0, true).unwrap();
        let pivots = m.eliminate();
        assert_eq!(m.back_substitute(&pivots), None);
    }

    #[test]
    fn consistent_system_solves() {
        // x0 ^ x1 = 1, x1 = 0  =>  x0 = 1, x1 = 0
        let mut m = BitMatrix::new(2, 3);
        m.set(0, 0, true).unwrap();
        m.set(0, 1, true).unwrap();
        m.set(0, 2, true).unwrap();
        m.set(1, 1, true).unwrap();
        let pivots = m.eliminate();
        let x = m.back_substitute(&pivots).unwrap();
        assert_eq!(x, vec![true, false]);
    }
}
