//! Seam insertion.  Enlarging replays removal in reverse, with one
//! extra concern: left alone, the energy minimum never moves, and
//! every inserted seam lands in the same place as a visible ribbon.
//! A scratch "artificial weight" matrix biases each inserted seam and
//! its predecessor upward so the next seam lands somewhere else.  The
//! caller's weight matrix never sees the bias; a per-seam sum matrix
//! feeds the energy build instead.

use std::ops::Range;

use crate::edge::{self, Kernel};
use crate::energy;
use crate::error::CarveError;
use crate::gray;
use crate::matrix::Matrix;
use crate::pixel::{average, luma, Image};
use crate::pool::{Pool, SharedMat, SharedSlice, Task};
use crate::retarget::{CarveOptions, Progress, Weights};

/// Phase one for a band of rows: the weights the energy build will
/// actually see.
pub(crate) fn sum_strip(
    weights: &Matrix<i32>,
    artificial: &Matrix<i32>,
    sum: &mut Matrix<i32>,
    rows: Range<usize>,
) {
    for y in rows {
        for x in 0..weights.width() {
            sum[(x, y)] = weights[(x, y)] + artificial[(x, y)];
        }
    }
}

/// Phase two for a band of rows: open the gap and fill the new pixel.
/// All matrices have already been widened by one column.
#[allow(clippy::too_many_arguments)]
pub(crate) fn shift_strip(
    image: &mut Image,
    gray: &mut Matrix<u8>,
    weights: &mut Weights,
    artificial: &mut Matrix<i32>,
    energy: &mut Matrix<i32>,
    path: &[usize],
    add_weight: i32,
    rows: Range<usize>,
) {
    for y in rows {
        let a = path[y];
        image.shift_row(a, y, 1);
        gray.shift_row(a, y, 1);
        weights.shift_row(a, y, 1);
        artificial.shift_row(a, y, 1);
        energy.shift_row(a, y, 1);
        let ax = a as isize;
        let ay = y as isize;
        image[(a, y)] = average(image[(a, y)], image.get_clamped(ax - 1, ay));
        weights[(a, y)] = (weights[(a, y)] + weights.get_clamped(ax - 1, ay)) / 2;
        gray[(a, y)] = luma(image[(a, y)]);
        // Bias the new seam and the one it was cloned from, so the
        // next insertion lands elsewhere.
        artificial[(a, y)] = add_weight;
        artificial[(a + 1, y)] += add_weight;
    }
}

/// Phase three for a band of rows: widen the edge row and reconvolve
/// around the insertion.
pub(crate) fn edge_strip(
    gray: &Matrix<u8>,
    edge: &mut Matrix<i32>,
    path: &[usize],
    kernel: Kernel,
    rows: Range<usize>,
) {
    for y in rows {
        let a = path[y];
        edge.shift_row(a, y, 1);
        edge::refresh_seam(gray, edge, a, y, kernel, 3);
    }
}

/// Rebuild the sum matrix the next energy build will read.
pub(crate) fn start_weight_add(
    pool: &mut Pool,
    weights: &mut Weights,
    artificial: &mut Matrix<i32>,
    sum: &mut Matrix<i32>,
) {
    sum.resize_width(weights.width());
    let shared_weights = SharedMat::new(weights);
    let shared_artificial = SharedMat::new(artificial);
    let shared_sum = SharedMat::new(sum);
    let tasks = pool
        .strips(0..weights.height())
        .into_iter()
        .map(|rows| Task::AddSum {
            weights: shared_weights,
            artificial: shared_artificial,
            sum: shared_sum,
            rows,
        })
        .collect();
    pool.add.dispatch(tasks);
}

/// Insert one seam everywhere.
#[allow(clippy::too_many_arguments)]
pub(crate) fn add_path(
    pool: &mut Pool,
    image: &mut Image,
    path: &[usize],
    weights: &mut Weights,
    artificial: &mut Matrix<i32>,
    edge: &mut Matrix<i32>,
    gray: &mut Matrix<u8>,
    energy: &mut Matrix<i32>,
    add_weight: i32,
    kernel: Kernel,
) {
    let widened = image.width() + 1;
    image.resize_width(widened);
    gray.resize_width(widened);
    weights.resize_width(widened);
    artificial.resize_width(widened);
    energy.resize_width(widened);
    edge.resize_width(widened);

    let shared_image = SharedMat::new(image);
    let shared_gray = SharedMat::new(gray);
    let shared_weights = SharedMat::new(weights);
    let shared_artificial = SharedMat::new(artificial);
    let shared_energy = SharedMat::new(energy);
    let shared_path = SharedSlice::new(path);
    let tasks = pool
        .strips(0..image.height())
        .into_iter()
        .map(|rows| Task::AddShift {
            image: shared_image,
            gray: shared_gray,
            weights: shared_weights,
            artificial: shared_artificial,
            energy: shared_energy,
            path: shared_path,
            add_weight,
            rows,
        })
        .collect();
    pool.add.dispatch(tasks);

    let shared_edge = SharedMat::new(edge);
    let tasks = pool
        .strips(0..image.height())
        .into_iter()
        .map(|rows| Task::AddEdge {
            gray: shared_gray,
            edge: shared_edge,
            path: shared_path,
            kernel,
            rows,
        })
        .collect();
    pool.add.dispatch(tasks);
}

/// Insert vertical seams until the image is `goal_x` wide.
pub(crate) fn add_seams(
    pool: &mut Pool,
    image: &mut Image,
    weights: &mut Weights,
    goal_x: usize,
    opts: &CarveOptions,
    progress: &mut Progress<'_>,
) -> Result<(), CarveError> {
    let height = image.height();
    let width = image.width();
    pool.resize_energy(height);
    image.reserve_width(goal_x);
    weights.reserve_width(goal_x);
    let mut gray = Matrix::new(width, height);
    let mut edge = Matrix::new(width, height);
    let mut energy = Matrix::new(width, height);
    let mut artificial = Matrix::new(width, height);
    let mut sum = Matrix::new(width, height);
    gray.reserve_width(goal_x);
    edge.reserve_width(goal_x);
    energy.reserve_width(goal_x);
    artificial.reserve_width(goal_x);
    sum.reserve_width(goal_x);
    let mut path = vec![0usize; height];
    gray::grayscale(pool, image, &mut gray);
    edge::edge_detect(pool, &mut gray, &mut edge, opts.kernel);
    let seams = goal_x - width;
    for i in 0..seams {
        progress.step()?;
        start_weight_add(pool, weights, &mut artificial, &mut sum);
        energy::energy_path(
            pool,
            &mut edge,
            &mut sum,
            &mut energy,
            &mut path,
            opts.energy,
            i == 0,
        );
        add_path(
            pool,
            image,
            &path,
            weights,
            &mut artificial,
            &mut edge,
            &mut gray,
            &mut energy,
            opts.add_weight,
            opts.kernel,
        );
    }
    Ok(())
}
