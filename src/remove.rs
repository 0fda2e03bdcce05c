//! Seam removal.  Two parallel phases per seam: the first blends the
//! doomed pixel into its neighbors and compacts every per-pixel map,
//! the second repairs the edge response around the scar.  The edge
//! repair cannot share a phase with the shifts: a convolution at a
//! strip border reads grayscale rows another strip may still be
//! moving.

use std::ops::Range;

use crate::edge::{self, Kernel};
use crate::energy;
use crate::error::CarveError;
use crate::gray;
use crate::matrix::Matrix;
use crate::pixel::{average, luma, Image};
use crate::pool::{Pool, SharedMat, SharedSlice, Task};
use crate::retarget::{CarveOptions, Progress, Weights};

/// Phase one for a band of rows: blend, then close the gap in the
/// image, grayscale, weights and energy rows.  A negative weight
/// marks a pixel for outright deletion, so nothing of it bleeds into
/// the survivors.
pub(crate) fn shift_strip(
    image: &mut Image,
    gray: &mut Matrix<u8>,
    weights: &mut Matrix<i32>,
    energy: &mut Matrix<i32>,
    path: &[usize],
    rows: Range<usize>,
) {
    let width = image.width();
    for y in rows {
        let r = path[y];
        if r >= 1 {
            if weights[(r, y)] >= 0 {
                image[(r - 1, y)] = average(image[(r - 1, y)], image[(r, y)]);
            }
            gray[(r - 1, y)] = luma(image[(r - 1, y)]);
        }
        if r + 1 < width {
            if weights[(r, y)] >= 0 {
                image[(r + 1, y)] = average(image[(r + 1, y)], image[(r, y)]);
            }
            gray[(r + 1, y)] = luma(image[(r + 1, y)]);
        }
        image.shift_row(r + 1, y, -1);
        gray.shift_row(r + 1, y, -1);
        weights.shift_row(r + 1, y, -1);
        energy.shift_row(r + 1, y, -1);
    }
}

/// Phase two for a band of rows: compact the edge row and reconvolve
/// the band the seam disturbed.  Runs only after every grayscale row
/// has settled.
pub(crate) fn edge_strip(
    gray: &Matrix<u8>,
    edge: &mut Matrix<i32>,
    path: &[usize],
    kernel: Kernel,
    rows: Range<usize>,
) {
    for y in rows {
        let r = path[y];
        edge.shift_row(r + 1, y, -1);
        edge::refresh_seam(gray, edge, r, y, kernel, 2);
    }
}

/// Remove one seam everywhere.
#[allow(clippy::too_many_arguments)]
pub(crate) fn remove_path(
    pool: &mut Pool,
    image: &mut Image,
    path: &[usize],
    weights: &mut Weights,
    edge: &mut Matrix<i32>,
    gray: &mut Matrix<u8>,
    energy: &mut Matrix<i32>,
    kernel: Kernel,
) {
    let shared_image = SharedMat::new(image);
    let shared_gray = SharedMat::new(gray);
    let shared_weights = SharedMat::new(weights);
    let shared_energy = SharedMat::new(energy);
    let shared_path = SharedSlice::new(path);
    let tasks = pool
        .strips(0..image.height())
        .into_iter()
        .map(|rows| Task::RemoveShift {
            image: shared_image,
            gray: shared_gray,
            weights: shared_weights,
            energy: shared_energy,
            path: shared_path,
            rows,
        })
        .collect();
    pool.remove.dispatch(tasks);

    let narrowed = image.width() - 1;
    image.resize_width(narrowed);
    weights.resize_width(narrowed);
    gray.resize_width(narrowed);

    let shared_edge = SharedMat::new(edge);
    let tasks = pool
        .strips(0..image.height())
        .into_iter()
        .map(|rows| Task::RemoveEdge {
            gray: shared_gray,
            edge: shared_edge,
            path: shared_path,
            kernel,
            rows,
        })
        .collect();
    pool.remove.dispatch(tasks);
    edge.resize_width(narrowed);
}

/// Carve vertical seams until the image is `goal_x` wide.
pub(crate) fn remove_seams(
    pool: &mut Pool,
    image: &mut Image,
    weights: &mut Weights,
    goal_x: usize,
    opts: &CarveOptions,
    progress: &mut Progress<'_>,
) -> Result<(), CarveError> {
    let height = image.height();
    pool.resize_energy(height);
    let mut gray = Matrix::new(image.width(), height);
    let mut edge = Matrix::new(image.width(), height);
    let mut energy = Matrix::new(image.width(), height);
    let mut path = vec![0usize; height];
    gray::grayscale(pool, image, &mut gray);
    edge::edge_detect(pool, &mut gray, &mut edge, opts.kernel);
    let seams = image.width() - goal_x;
    for i in 0..seams {
        progress.step()?;
        energy::energy_path(
            pool,
            &mut edge,
            weights,
            &mut energy,
            &mut path,
            opts.energy,
            i == 0,
        );
        remove_path(pool, image, &path, weights, &mut edge, &mut gray, &mut energy, opts.kernel);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::Rgba8;

    fn pixel(v: u8) -> Rgba8 {
        Rgba8 { r: v, g: v, b: v, a: 255 }
    }

    #[test]
    fn neutral_weights_blend_the_neighbors() {
        let mut image = Matrix::from_vec(3, 1, vec![pixel(10), pixel(30), pixel(50)]);
        let mut gray = Matrix::new(3, 1);
        let mut weights = Matrix::new(3, 1);
        let mut energy = Matrix::new(3, 1);
        shift_strip(&mut image, &mut gray, &mut weights, &mut energy, &[1], 0..1);
        // Left neighbor took half of the carved pixel; the right
        // neighbor blended and then slid into its place.
        assert_eq!(image[(0, 0)], pixel(20));
        assert_eq!(image[(1, 0)], pixel(40));
        assert_eq!(gray[(0, 0)], 20);
    }

    #[test]
    fn marked_pixels_leave_no_trace() {
        let mut image = Matrix::from_vec(3, 1, vec![pixel(10), pixel(30), pixel(50)]);
        let mut gray = Matrix::new(3, 1);
        let mut weights = Matrix::new(3, 1);
        weights[(1, 0)] = -1000;
        let mut energy = Matrix::new(3, 1);
        shift_strip(&mut image, &mut gray, &mut weights, &mut energy, &[1], 0..1);
        assert_eq!(image[(0, 0)], pixel(10));
        assert_eq!(image[(1, 0)], pixel(50));
    }
}
