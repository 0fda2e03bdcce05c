//! The cumulative energy map and the seam path extracted from it.
//!
//! The map is a top-down dynamic program: each cell holds the cost of
//! the cheapest seam reaching it from row zero.  Two long-lived
//! workers fill it, one owning the left half of the columns, one the
//! right.  A worker starts a resize holding every mutex in its own
//! per-row array and releases row y's mutex once row y is written;
//! when its window touches the column where the halves meet, it locks
//! and immediately releases the neighbor's mutex for the previous row
//! first, so the value it is about to read has been published.  The
//! workers drift at most about a row apart and never block on a full
//! barrier.
//!
//! After the first build, a resize only disturbs the map near the
//! carved seam.  The rebuild window starts at `[path[0]-3, path[0]+2]`
//! and widens by a column per row on each side; when a freshly
//! computed value at the window's edge matches the stored one and the
//! prior seam is comfortably inside the window, that side shrinks
//! back.  The result is bit-identical to a full rebuild.

use std::sync::MutexGuard;

use crate::matrix::Matrix;
use crate::pool::{EnergyTask, Pool, Side};

/// Which cost model drives the dynamic program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyMode {
    /// Cheapest accumulated edge response, the classic formulation.
    Backward,
    /// Penalize each step by the gradient the removal would create.
    Forward,
}

/// Smallest of the three predecessors, preferring straight up, then
/// up-left, then up-right.  Later candidates win only on strict
/// improvement.
fn min_of_three(left: i32, up: i32, right: i32) -> i32 {
    let mut m = up;
    if left < m {
        m = left;
    }
    if right < m {
        m = right;
    }
    m
}

/// An energy read that treats out-of-range columns as impassable.
fn get_max(energy: &Matrix<i32>, x: isize, y: usize) -> i32 {
    cq!(
        x < 0 || x >= energy.width() as isize,
        i32::max_value(),
        energy[(x as usize, y)]
    )
}

/// The value of one interior cell of row y (y >= 1).  Shared by the
/// concurrent fill and by the single-threaded reference in the tests.
pub(crate) fn cell_energy(
    edge: &Matrix<i32>,
    weights: &Matrix<i32>,
    energy: &Matrix<i32>,
    x: usize,
    y: usize,
    mode: EnergyMode,
) -> i32 {
    let width = edge.width();
    let here = edge[(x, y)] + weights[(x, y)];
    if x == 0 {
        // Only two predecessors are in range, and no forward penalty
        // at the image border.
        return here
            + cq!(
                width > 1,
                energy[(0, y - 1)].min(energy[(1, y - 1)]),
                energy[(0, y - 1)]
            );
    }
    if x == width - 1 {
        return here + energy[(x, y - 1)].min(energy[(x - 1, y - 1)]);
    }
    match mode {
        EnergyMode::Backward => {
            here + min_of_three(
                energy[(x - 1, y - 1)],
                energy[(x, y - 1)],
                energy[(x + 1, y - 1)],
            )
        }
        EnergyMode::Forward => {
            // The introduced-gradient penalty stands in for the cell's
            // own edge response; only the weight carries over.
            let horizontal = (edge[(x + 1, y)] - edge[(x - 1, y)]).abs();
            let cost_left = horizontal + (edge[(x, y - 1)] - edge[(x - 1, y)]).abs();
            let cost_up = horizontal;
            let cost_right = horizontal + (edge[(x, y - 1)] - edge[(x + 1, y)]).abs();
            weights[(x, y)]
                + min_of_three(
                    energy[(x - 1, y - 1)] + cost_left,
                    energy[(x, y - 1)] + cost_up,
                    energy[(x + 1, y - 1)] + cost_right,
                )
        }
    }
}

/// Fill one worker's half of the map.  `guards` holds the locks on
/// every row of this half, taken before the protocol's good-to-go;
/// each is dropped as soon as its row is complete.
pub(crate) fn fill_half(task: &EnergyTask, guards: &mut [Option<MutexGuard<'_, ()>>]) {
    let edge = unsafe { task.edge.get() };
    let weights = unsafe { task.weights.get() };
    let energy = unsafe { task.energy.get() };
    let path = task.path.as_ref().map(|p| unsafe { p.get() });
    let width = edge.width();
    let height = edge.height();
    let top = task.top as isize;
    let bot = task.bot as isize;

    let (mut min_x, mut max_x) = match path {
        Some(p) => ((p[0] as isize - 3).max(top), (p[0] as isize + 2).min(bot)),
        None => (top, bot),
    };

    let mut x = min_x;
    while x <= max_x {
        let xu = x as usize;
        energy[(xu, 0)] = edge[(xu, 0)] + weights[(xu, 0)];
        x += 1;
    }
    guards[0].take();

    for y in 1..height {
        min_x = (min_x - 1).max(top);
        max_x = (max_x + 1).min(bot);
        let mut x = min_x;
        while x <= max_x {
            let xu = x as usize;
            let meets_neighbor = match task.side {
                Side::Left => xu == task.bot && xu + 1 < width,
                Side::Right => xu == task.top,
            };
            if meets_neighbor {
                // The neighbor holds this until its row y-1 is out.
                drop(task.not_mine[y - 1].lock().unwrap());
            }
            let value = cell_energy(edge, weights, energy, xu, y, task.mode);
            if path.is_some() && value == energy[(xu, y)] {
                let p = path.unwrap();
                if x == min_x && (p[y] as isize) > min_x + 3 {
                    min_x += 1;
                } else if x == max_x && (p[y] as isize) < max_x - 2 {
                    max_x -= 1;
                }
            } else {
                energy[(xu, y)] = value;
            }
            x += 1;
        }
        guards[y].take();
    }
}

/// Walk back up the finished map from the bottom-row minimum,
/// recording the seam column for every row.
pub(crate) fn generate_path(energy: &Matrix<i32>, min_x: usize, path: &mut Vec<usize>) {
    let height = energy.height();
    path.clear();
    path.resize(height, 0);
    let mut x = min_x as isize;
    path[height - 1] = min_x;
    for y in (0..height - 1).rev() {
        let up = get_max(energy, x, y);
        let left = get_max(energy, x - 1, y);
        let right = get_max(energy, x + 1, y);
        let mut best = up;
        let mut best_x = x;
        if left < best {
            best = left;
            best_x = x - 1;
        }
        if right < best {
            best_x = x + 1;
        }
        x = best_x;
        path[y] = x as usize;
    }
}

/// Build (or incrementally rebuild) the map, then extract the
/// cheapest seam.  Returns the seam's total energy.
pub(crate) fn energy_path(
    pool: &mut Pool,
    edge: &mut Matrix<i32>,
    weights: &mut Matrix<i32>,
    energy: &mut Matrix<i32>,
    path: &mut Vec<usize>,
    mode: EnergyMode,
    first: bool,
) -> i32 {
    energy.resize_width(edge.width());
    {
        let prior = cq!(first, None, Some(path.as_slice()));
        pool.energy_map(edge, weights, energy, mode, prior);
    }
    let last = energy.height() - 1;
    let mut min_x = 0;
    let mut min_energy = energy[(0, last)];
    for x in 1..energy.width() {
        if energy[(x, last)] < min_energy {
            min_energy = energy[(x, last)];
            min_x = x;
        }
    }
    generate_path(energy, min_x, path);
    min_energy
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [EnergyMode; 2] = [EnergyMode::Backward, EnergyMode::Forward];

    /// Deterministic pseudo-random fill.
    fn scramble(width: usize, height: usize, mut seed: u32, span: i32) -> Matrix<i32> {
        let mut m = Matrix::new(width, height);
        for y in 0..height {
            for x in 0..width {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                m[(x, y)] = ((seed >> 16) as i32) % span;
            }
        }
        m
    }

    /// The whole map, one thread, no windows.  The concurrent build
    /// must agree with this bit for bit.
    fn reference_energy(
        edge: &Matrix<i32>,
        weights: &Matrix<i32>,
        mode: EnergyMode,
    ) -> Matrix<i32> {
        let mut energy = Matrix::new(edge.width(), edge.height());
        for x in 0..edge.width() {
            energy[(x, 0)] = edge[(x, 0)] + weights[(x, 0)];
        }
        for y in 1..edge.height() {
            for x in 0..edge.width() {
                energy[(x, y)] = cell_energy(edge, weights, &energy, x, y, mode);
            }
        }
        energy
    }

    #[test]
    fn concurrent_map_matches_the_reference() {
        for &mode in &MODES {
            let mut edge = scramble(13, 9, 0xdead_beef, 256);
            let mut weights = scramble(13, 9, 0x0bad_cafe, 10);
            let expected = reference_energy(&edge, &weights, mode);
            let mut energy = Matrix::new(13, 9);
            let mut pool = Pool::start(2).unwrap();
            pool.energy_map(&mut edge, &mut weights, &mut energy, mode, None);
            assert_eq!(energy, expected, "{:?}", mode);
        }
    }

    #[test]
    fn incremental_rebuild_matches_a_full_one() {
        for &mode in &MODES {
            let width = 13;
            let height = 9;
            let mut edge = scramble(width, height, 0x1234_5678, 256);
            let mut weights = scramble(width, height, 0x8765_4321, 10);
            let mut energy = Matrix::new(width, height);
            let mut path = vec![0; height];
            let mut pool = Pool::start(2).unwrap();
            energy_path(&mut pool, &mut edge, &mut weights, &mut energy, &mut path, mode, true);

            // Take the seam out, the way a removal pass would: shift
            // the rows, narrow the matrices, churn the edge response
            // in the refresh band around the carved column.
            for y in 0..height {
                let r = path[y];
                edge.shift_row(r + 1, y, -1);
                weights.shift_row(r + 1, y, -1);
                energy.shift_row(r + 1, y, -1);
            }
            edge.resize_width(width - 1);
            weights.resize_width(width - 1);
            for y in 0..height {
                let r = path[y];
                let hi = (r + 1).min(edge.width() - 1);
                for x in r.saturating_sub(2)..=hi {
                    edge[(x, y)] = (edge[(x, y)] * 31 + 7) % 256;
                }
            }

            let mut full_edge = edge.clone();
            let mut full_weights = weights.clone();
            let mut full_energy = Matrix::new(edge.width(), height);
            let mut full_path = vec![0; height];
            let full_min = energy_path(
                &mut pool,
                &mut full_edge,
                &mut full_weights,
                &mut full_energy,
                &mut full_path,
                mode,
                true,
            );
            let incremental_min = energy_path(
                &mut pool,
                &mut edge,
                &mut weights,
                &mut energy,
                &mut path,
                mode,
                false,
            );
            assert_eq!(energy, full_energy, "{:?}", mode);
            assert_eq!(path, full_path, "{:?}", mode);
            assert_eq!(incremental_min, full_min, "{:?}", mode);
        }
    }

    #[test]
    fn forward_cost_replaces_the_edge_term_in_the_interior() {
        // edge:  2 5 9      weights:  1 0 2
        //        4 7 3                0 5 0
        let edge = Matrix::from_vec(3, 2, vec![2, 5, 9, 4, 7, 3]);
        let weights = Matrix::from_vec(3, 2, vec![1, 0, 2, 0, 5, 0]);
        let mut energy = Matrix::new(3, 2);
        for x in 0..3 {
            energy[(x, 0)] = edge[(x, 0)] + weights[(x, 0)];
        }
        // Interior (1,1): horizontal gradient |3-4| = 1, so the step
        // costs are left 1+|5-4| = 2, up 1, right 1+|5-3| = 3.  The
        // candidates are 3+2, 5+1 and 11+3; the cell's own edge
        // response of 7 never enters, only its weight of 5.
        assert_eq!(cell_energy(&edge, &weights, &energy, 1, 1, EnergyMode::Forward), 10);
        // Borders have no introduced gradient to charge for and keep
        // their own response: 4+0+min(3,5) and 3+0+min(5,11).
        assert_eq!(cell_energy(&edge, &weights, &energy, 0, 1, EnergyMode::Forward), 7);
        assert_eq!(cell_energy(&edge, &weights, &energy, 2, 1, EnergyMode::Forward), 8);
    }

    #[test]
    fn a_lone_interior_response_is_free_to_carve_forward() {
        let edge = Matrix::from_vec(3, 2, vec![0, 0, 0, 0, 100, 0]);
        let weights = Matrix::new(3, 2);
        let mut energy = Matrix::new(3, 2);
        assert_eq!(cell_energy(&edge, &weights, &energy, 1, 1, EnergyMode::Forward), 0);
    }

    #[test]
    fn paths_are_connected_and_in_range() {
        for &mode in &MODES {
            let mut edge = scramble(11, 14, 0xfeed_f00d, 256);
            let mut weights = Matrix::new(11, 14);
            let mut energy = Matrix::new(11, 14);
            let mut path = vec![0; 14];
            let mut pool = Pool::start(2).unwrap();
            energy_path(&mut pool, &mut edge, &mut weights, &mut energy, &mut path, mode, true);
            for y in 0..14 {
                assert!(path[y] < 11);
                if y > 0 {
                    let step = path[y] as isize - path[y - 1] as isize;
                    assert!(step.abs() <= 1, "disconnected at row {}", y);
                }
            }
        }
    }

    #[test]
    fn backtracking_prefers_up_then_left_then_strictly_right() {
        // Bottom row minimum sits at column 1; the row above decides.
        let even = Matrix::from_vec(3, 2, vec![5, 5, 5, 9, 0, 9]);
        let mut path = Vec::new();
        generate_path(&even, 1, &mut path);
        assert_eq!(path, vec![1, 1]);

        let leftward = Matrix::from_vec(3, 2, vec![4, 5, 9, 9, 0, 9]);
        generate_path(&leftward, 1, &mut path);
        assert_eq!(path, vec![0, 1]);

        let rightward = Matrix::from_vec(3, 2, vec![9, 5, 4, 9, 0, 9]);
        generate_path(&rightward, 1, &mut path);
        assert_eq!(path, vec![2, 1]);

        // A tie with the left never moves right.
        let left_tie = Matrix::from_vec(3, 2, vec![4, 5, 4, 9, 0, 9]);
        generate_path(&left_tie, 1, &mut path);
        assert_eq!(path, vec![0, 1]);
    }
}
