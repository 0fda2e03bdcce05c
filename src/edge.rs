//! Edge detection over the grayscale matrix.  Five 3x3 kernels are
//! offered; the seam energy is only as good as the edge response, so
//! the choice of kernel is the main quality knob the caller has.
//!
//! Every kernel has radius 1, which splits the work cleanly: interior
//! pixels convolve with unchecked neighbor reads (`Safety::Fast`),
//! pixels within one step of any image border go through the clamped
//! accessor (`Safety::Clamped`).

use std::ops::Range;

use crate::matrix::Matrix;
use crate::pool::{Pool, SharedMat, Task};

/// The convolution kernel applied to the grayscale matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    Prewitt,
    VSquare,
    V1,
    Sobel,
    Laplacian,
}

/// Whether a convolution may index its neighbors directly or has to
/// clamp.  Fast requires the full 3x3 neighborhood in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Safety {
    Fast,
    Clamped,
}

pub(crate) fn convolve(
    gray: &Matrix<u8>,
    x: usize,
    y: usize,
    safety: Safety,
    kernel: Kernel,
) -> i32 {
    let g = |dx: isize, dy: isize| -> i32 {
        match safety {
            Safety::Clamped => i32::from(gray.get_clamped(x as isize + dx, y as isize + dy)),
            Safety::Fast => i32::from(
                gray[((x as isize + dx) as usize, (y as isize + dy) as usize)],
            ),
        }
    };
    match kernel {
        Kernel::Prewitt => {
            let gx = g(1, 1) + g(1, 0) + g(1, -1) - g(-1, 1) - g(-1, 0) - g(-1, -1);
            let gy = g(1, 1) + g(0, 1) + g(-1, 1) - g(1, -1) - g(0, -1) - g(-1, -1);
            gx.abs() + gy.abs()
        }
        Kernel::VSquare => {
            let gx = g(1, 1) + g(1, 0) + g(1, -1) - g(-1, 1) - g(-1, 0) - g(-1, -1);
            gx * gx
        }
        Kernel::V1 => {
            let gx = g(1, 1) + g(1, 0) + g(1, -1) - g(-1, 1) - g(-1, 0) - g(-1, -1);
            gx.abs()
        }
        Kernel::Sobel => {
            let gx = g(1, 1) + 2 * g(1, 0) + g(1, -1) - g(-1, 1) - 2 * g(-1, 0) - g(-1, -1);
            let gy = g(1, 1) + 2 * g(0, 1) + g(-1, 1) - g(1, -1) - 2 * g(0, -1) - g(-1, -1);
            gx.abs() + gy.abs()
        }
        Kernel::Laplacian => (g(1, 0) + g(-1, 0) + g(0, 1) + g(0, -1) - 4 * g(0, 0)).abs(),
    }
}

/// One worker's share of the interior rows.  The first and last
/// columns clamp even here; the first and last rows never reach this
/// function.
pub(crate) fn edge_strip(
    gray: &Matrix<u8>,
    edge: &mut Matrix<i32>,
    kernel: Kernel,
    rows: Range<usize>,
) {
    let width = gray.width();
    for y in rows {
        edge[(0, y)] = convolve(gray, 0, y, Safety::Clamped, kernel);
        for x in 1..width.saturating_sub(1) {
            edge[(x, y)] = convolve(gray, x, y, Safety::Fast, kernel);
        }
        if width > 1 {
            edge[(width - 1, y)] = convolve(gray, width - 1, y, Safety::Clamped, kernel);
        }
    }
}

/// Full edge detection.  The workers take the interior rows; the
/// calling thread does the two boundary rows itself while they run,
/// then joins.
pub(crate) fn edge_detect(
    pool: &mut Pool,
    gray: &mut Matrix<u8>,
    edge: &mut Matrix<i32>,
    kernel: Kernel,
) {
    let height = gray.height();
    let g = SharedMat::new(gray);
    let e = SharedMat::new(edge);
    let tasks = cq!(
        height > 2,
        pool.strips(1..height - 1)
            .into_iter()
            .map(|rows| Task::Edge {
                gray: g,
                edge: e,
                kernel,
                rows,
            })
            .collect(),
        Vec::new()
    );
    let posted = pool.edge.post(tasks);
    for x in 0..gray.width() {
        edge[(x, 0)] = convolve(gray, x, 0, Safety::Clamped, kernel);
    }
    if height > 1 {
        for x in 0..gray.width() {
            edge[(x, height - 1)] = convolve(gray, x, height - 1, Safety::Clamped, kernel);
        }
    }
    pool.edge.wait(posted);
}

/// Recompute the edge response around a carved seam column after the
/// grayscale has been shifted.  The seam disturbs a band of at most
/// three columns on the left and `extent` on the right.
pub(crate) fn refresh_seam(
    gray: &Matrix<u8>,
    edge: &mut Matrix<i32>,
    c: usize,
    y: usize,
    kernel: Kernel,
    extent: usize,
) {
    let width = gray.width();
    if width == 0 {
        return;
    }
    let lo = c.saturating_sub(3);
    let hi = (c + extent).min(width - 1);
    for x in lo..=hi {
        let safety = cq!(
            x == 0 || x + 1 >= width || y == 0 || y + 1 >= gray.height(),
            Safety::Clamped,
            Safety::Fast
        );
        edge[(x, y)] = convolve(gray, x, y, safety, kernel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KERNELS: [Kernel; 5] = [
        Kernel::Prewitt,
        Kernel::VSquare,
        Kernel::V1,
        Kernel::Sobel,
        Kernel::Laplacian,
    ];

    fn flat(width: usize, height: usize, value: u8) -> Matrix<u8> {
        let mut m = Matrix::new(width, height);
        m.fill(value);
        m
    }

    /// Columns 0..=2 hold 0, columns 3.. hold 9.
    fn step() -> Matrix<u8> {
        let mut m = Matrix::new(7, 7);
        for y in 0..7 {
            for x in 3..7 {
                m[(x, y)] = 9;
            }
        }
        m
    }

    #[test]
    fn flat_image_has_no_response() {
        let gray = flat(6, 5, 77);
        let mut edge = Matrix::new(6, 5);
        for &kernel in &KERNELS {
            edge.fill(-1);
            let mut pool = Pool::start(2).unwrap();
            let mut gray = gray.clone();
            edge_detect(&mut pool, &mut gray, &mut edge, kernel);
            for y in 0..5 {
                for x in 0..6 {
                    assert_eq!(edge[(x, y)], 0, "{:?} at ({}, {})", kernel, x, y);
                }
            }
        }
    }

    #[test]
    fn step_edge_magnitudes_per_kernel() {
        let gray = step();
        // Interior pixel on the high side of the step.
        let expected = [
            (Kernel::Prewitt, 27),
            (Kernel::VSquare, 729),
            (Kernel::V1, 27),
            (Kernel::Sobel, 36),
            (Kernel::Laplacian, 9),
        ];
        for &(kernel, want) in &expected {
            assert_eq!(convolve(&gray, 3, 3, Safety::Fast, kernel), want, "{:?}", kernel);
        }
    }

    #[test]
    fn clamped_matches_fast_on_the_interior() {
        let gray = step();
        for &kernel in &KERNELS {
            for y in 1..6 {
                for x in 1..6 {
                    assert_eq!(
                        convolve(&gray, x, y, Safety::Fast, kernel),
                        convolve(&gray, x, y, Safety::Clamped, kernel)
                    );
                }
            }
        }
    }

    #[test]
    fn boundary_rows_are_filled() {
        let mut gray = step();
        let mut edge = Matrix::new(7, 7);
        edge.fill(-1);
        let mut pool = Pool::start(2).unwrap();
        edge_detect(&mut pool, &mut gray, &mut edge, Kernel::Prewitt);
        for y in 0..7 {
            for x in 0..7 {
                assert!(edge[(x, y)] >= 0, "unfilled at ({}, {})", x, y);
            }
        }
        // The step is vertical, so the clamped top row sees it too.
        assert_eq!(edge[(3, 0)], 27);
    }
}
