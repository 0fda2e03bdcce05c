//! The parallel grayscale pass.  Every derived map starts from the
//! luma matrix built here; afterward the seam operations keep it up
//! to date incrementally, pixel by pixel.

use std::ops::Range;

use crate::matrix::Matrix;
use crate::pixel::{luma, Image};
use crate::pool::{Pool, SharedMat, Task};

/// One worker's share: a contiguous band of rows.
pub(crate) fn gray_strip(source: &Image, dest: &mut Matrix<u8>, rows: Range<usize>) {
    for y in rows {
        for x in 0..source.width() {
            dest[(x, y)] = luma(source[(x, y)]);
        }
    }
}

/// Convert the whole image, one strip per worker.
pub(crate) fn grayscale(pool: &mut Pool, source: &mut Image, dest: &mut Matrix<u8>) {
    let src = SharedMat::new(source);
    let dst = SharedMat::new(dest);
    let tasks = pool
        .strips(0..source.height())
        .into_iter()
        .map(|rows| Task::Gray {
            source: src,
            dest: dst,
            rows,
        })
        .collect();
    pool.gray.dispatch(tasks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Rgba8;

    #[test]
    fn strip_converts_only_its_rows() {
        let mut source = Matrix::new(2, 3);
        source.fill(Rgba8 { r: 255, g: 255, b: 255, a: 255 });
        let mut dest = Matrix::new(2, 3);
        gray_strip(&source, &mut dest, 1..2);
        assert_eq!(dest[(0, 0)], 0);
        assert_eq!(dest[(0, 1)], 255);
        assert_eq!(dest[(1, 1)], 255);
        assert_eq!(dest[(0, 2)], 0);
    }

    #[test]
    fn full_image_through_the_pool() {
        let mut source = Matrix::new(5, 4);
        source.fill(Rgba8 { r: 10, g: 20, b: 30, a: 255 });
        let mut dest = Matrix::new(5, 4);
        let mut pool = Pool::start(2).unwrap();
        grayscale(&mut pool, &mut source, &mut dest);
        for y in 0..4 {
            for x in 0..5 {
                assert_eq!(dest[(x, y)], 18);
            }
        }
    }
}
