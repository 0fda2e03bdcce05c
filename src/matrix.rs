//! The backing store for every map the carver maintains: the image
//! itself, the grayscale, the edge magnitudes, the weights, and the
//! energy map are all a `Matrix` of some `Copy` payload.
//!
//! The one non-obvious feature is the distinction between the logical
//! `width` and the `stride` (the reserved width).  Seam operations
//! change the width by one pixel per pass, thousands of times per
//! resize; `resize_width` within the reserved stride is just a field
//! update, and `shift_row` compacts or opens a row in place with a
//! single `copy_within`.  Enlarging runs call `reserve_width` once,
//! up front, with the goal width.

use std::ops::{Index, IndexMut};

/// A row-major, width-resizable two-dimensional map.
#[derive(Debug, Clone)]
pub struct Matrix<T: Default + Copy> {
    width: usize,
    height: usize,
    stride: usize,
    data: Vec<T>,
}

impl<T: Default + Copy> Matrix<T> {
    /// A new matrix, every cell holding the payload's default.
    pub fn new(width: usize, height: usize) -> Self {
        Matrix {
            width,
            height,
            stride: width,
            data: vec![T::default(); width * height],
        }
    }

    /// Build a matrix from a row-major vector.  Handy for tests and
    /// for ingesting decoded image data.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), width * height);
        Matrix {
            width,
            height,
            stride: width,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    // Absolutely, the number one name of this game is keep the index
    // math in a singular location and never, ever mess with it.
    fn get_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.stride + x
    }

    /// The "safe" accessor: out-of-range coordinates clamp to the
    /// nearest edge, so a convolution kernel can run right up against
    /// the border of the map.
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let x = x.max(0).min(self.width as isize - 1) as usize;
        let y = y.max(0).min(self.height as isize - 1) as usize;
        self.data[y * self.stride + x]
    }

    /// Set every cell in the logical area to `value`.
    pub fn fill(&mut self, value: T) {
        for y in 0..self.height {
            let base = y * self.stride;
            for cell in &mut self.data[base..base + self.width] {
                *cell = value;
            }
        }
    }

    /// Grow the reserved stride to `new_stride`, preserving every
    /// logical cell positionally.  A no-op if the reservation is
    /// already at least that wide.
    pub fn reserve_width(&mut self, new_stride: usize) {
        if new_stride <= self.stride {
            return;
        }
        let mut data = vec![T::default(); new_stride * self.height];
        for y in 0..self.height {
            let src = y * self.stride;
            let dst = y * new_stride;
            data[dst..dst + self.width].copy_from_slice(&self.data[src..src + self.width]);
        }
        self.data = data;
        self.stride = new_stride;
    }

    /// Non-destructive width change.  Shrinking, or growing within
    /// the reserved stride, touches no cell data; growing beyond the
    /// reservation reallocates but still preserves contents.
    pub fn resize_width(&mut self, new_width: usize) {
        if new_width > self.stride {
            self.reserve_width(new_width);
        }
        self.width = new_width;
    }

    /// Shift the tail of row `y`, starting at column `x`, by `shift`
    /// columns (positive opens a gap rightward, negative compacts
    /// leftward).  Vacated cells keep their old values; the caller
    /// overwrites or resizes them away.
    pub fn shift_row(&mut self, x: usize, y: usize, shift: isize) {
        if shift == 0 || x >= self.width {
            return;
        }
        let base = y * self.stride;
        if shift > 0 {
            let s = shift as usize;
            if x + s >= self.width {
                return;
            }
            self.data
                .copy_within(base + x..base + self.width - s, base + x + s);
        } else {
            let s = (-shift) as usize;
            if x < s {
                return;
            }
            self.data
                .copy_within(base + x..base + self.width, base + x - s);
        }
    }

    /// A transposed copy.  The carver only ever operates on vertical
    /// seams; horizontal work transposes, carves, and transposes back.
    pub fn transpose(&self) -> Matrix<T> {
        let mut out = Matrix::new(self.height, self.width);
        for y in 0..self.height {
            let base = y * self.stride;
            for x in 0..self.width {
                out.data[x * out.stride + y] = self.data[base + x];
            }
        }
        out
    }
}

impl<T: Default + Copy> Index<(usize, usize)> for Matrix<T> {
    type Output = T;

    /// A convenience addressing mode for getting values.
    fn index(&self, (x, y): (usize, usize)) -> &T {
        let index = self.get_index(x, y);
        &self.data[index]
    }
}

impl<T: Default + Copy> IndexMut<(usize, usize)> for Matrix<T> {
    /// A convenience addressing mode for setting values.
    fn index_mut(&mut self, (x, y): (usize, usize)) -> &mut T {
        let index = self.get_index(x, y);
        &mut self.data[index]
    }
}

// Equality over the logical area only; reserved slack is invisible.
impl<T: Default + Copy + PartialEq> PartialEq for Matrix<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.width != other.width || self.height != other.height {
            return false;
        }
        (0..self.height).all(|y| {
            let a = y * self.stride;
            let b = y * other.stride;
            self.data[a..a + self.width] == other.data[b..b + self.width]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting(width: usize, height: usize) -> Matrix<i32> {
        Matrix::from_vec(width, height, (0..(width * height) as i32).collect())
    }

    #[test]
    fn index_round_trip() {
        let mut m = Matrix::new(4, 3);
        m[(2, 1)] = 7;
        assert_eq!(m[(2, 1)], 7);
        assert_eq!(m[(0, 0)], 0);
    }

    #[test]
    fn clamped_access_pins_to_edges() {
        let m = counting(3, 2);
        assert_eq!(m.get_clamped(-5, 0), m[(0, 0)]);
        assert_eq!(m.get_clamped(9, 0), m[(2, 0)]);
        assert_eq!(m.get_clamped(1, -1), m[(1, 0)]);
        assert_eq!(m.get_clamped(1, 6), m[(1, 1)]);
    }

    #[test]
    fn shift_row_compacts_leftward() {
        let mut m = counting(5, 2);
        m.shift_row(2, 0, -1);
        assert_eq!(m[(1, 0)], 2);
        assert_eq!(m[(2, 0)], 3);
        assert_eq!(m[(3, 0)], 4);
        // The other row is untouched.
        assert_eq!(m[(1, 1)], 6);
    }

    #[test]
    fn shift_row_opens_gap_rightward() {
        let mut m = counting(5, 1);
        m.shift_row(1, 0, 1);
        // The vacated cell keeps its old value; the tail moved over.
        assert_eq!(m[(1, 0)], 1);
        assert_eq!(m[(2, 0)], 1);
        assert_eq!(m[(3, 0)], 2);
        assert_eq!(m[(4, 0)], 3);
    }

    #[test]
    fn shift_past_the_end_is_a_noop() {
        let mut m = counting(3, 1);
        let before = m.clone();
        m.shift_row(3, 0, -1);
        m.shift_row(2, 0, 1);
        assert_eq!(m, before);
    }

    #[test]
    fn reserve_then_resize_preserves_contents() {
        let mut m = counting(3, 2);
        m.reserve_width(6);
        assert_eq!(m.width(), 3);
        assert_eq!(m[(2, 1)], 5);
        m.resize_width(5);
        assert_eq!(m.width(), 5);
        assert_eq!(m[(2, 1)], 5);
        assert_eq!(m[(4, 0)], 0);
    }

    #[test]
    fn resize_beyond_reserve_still_preserves() {
        let mut m = counting(2, 2);
        m.resize_width(4);
        assert_eq!(m[(0, 1)], 2);
        assert_eq!(m[(1, 1)], 3);
    }

    #[test]
    fn shrink_then_grow_within_stride_is_positional() {
        let mut m = counting(4, 1);
        m.resize_width(2);
        m.resize_width(3);
        assert_eq!(m[(2, 0)], 2);
    }

    #[test]
    fn transpose_flips_coordinates() {
        let m = counting(3, 2);
        let t = m.transpose();
        assert_eq!(t.width(), 2);
        assert_eq!(t.height(), 3);
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(m[(x, y)], t[(y, x)]);
            }
        }
    }

    #[test]
    fn equality_ignores_reserved_slack() {
        let mut a = counting(3, 2);
        let b = a.clone();
        a.reserve_width(8);
        assert_eq!(a, b);
    }
}
