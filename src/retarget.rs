//! The public face of the carver: full resizes, seam-by-seam
//! adaptive shrinking, weighted object removal, and the precomputed
//! retargeting map.  Everything here works on vertical seams;
//! horizontal work transposes in, carves, and transposes back out.

use itertools::iproduct;

use crate::add;
use crate::edge::{self, Kernel};
use crate::energy::{self, EnergyMode};
use crate::error::CarveError;
use crate::gray;
use crate::matrix::Matrix;
use crate::pixel::{Image, Rgba8};
use crate::pool::Pool;
use crate::remove;

/// Per-pixel bias: positive protects, negative marks for deletion.
pub type Weights = Matrix<i32>;

/// Tuning for a resize run.
#[derive(Debug, Clone)]
pub struct CarveOptions {
    pub kernel: Kernel,
    pub energy: EnergyMode,
    /// Bias laid on each inserted seam so the next one lands
    /// somewhere else.
    pub add_weight: i32,
    threads: usize,
}

impl Default for CarveOptions {
    fn default() -> Self {
        CarveOptions {
            kernel: Kernel::Prewitt,
            energy: EnergyMode::Backward,
            add_weight: 30,
            threads: num_cpus::get().max(2),
        }
    }
}

impl CarveOptions {
    /// Worker threads per crew.  Takes effect at the next pool
    /// startup; the floor of two is load-bearing, the energy build
    /// always runs two-handed.
    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads.max(2);
    }

    pub fn threads(&self) -> usize {
        self.threads
    }
}

/// Which axis object removal may shrink along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Whichever axis has fewer marked lines.
    Auto,
    Horizontal,
    Vertical,
}

/// The caller's progress callback, invoked once before each seam with
/// the fraction of the run already done.  Returning false aborts.
pub(crate) struct Progress<'a> {
    callback: Option<&'a mut dyn FnMut(f32) -> bool>,
    total: usize,
    done: usize,
}

impl<'a> Progress<'a> {
    fn new(callback: Option<&'a mut dyn FnMut(f32) -> bool>, total: usize) -> Self {
        Progress {
            callback,
            total,
            done: 0,
        }
    }

    pub(crate) fn step(&mut self) -> Result<(), CarveError> {
        if let Some(callback) = self.callback.as_mut() {
            let fraction = cq!(self.total == 0, 1.0, self.done as f32 / self.total as f32);
            if !callback(fraction) {
                return Err(CarveError::Cancelled);
            }
        }
        self.done += 1;
        Ok(())
    }
}

fn span(a: usize, b: usize) -> usize {
    cq!(a > b, a - b, b - a)
}

/// Reborrow an optional callback so it can be handed down more than
/// once.
fn reborrow<'a>(
    callback: &'a mut Option<&mut dyn FnMut(f32) -> bool>,
) -> Option<&'a mut dyn FnMut(f32) -> bool> {
    match callback {
        Some(c) => Some(&mut **c),
        None => None,
    }
}

/// Transpose in, run the vertical operation, transpose back.
fn transposed<F>(
    pool: &mut Pool,
    image: &mut Image,
    weights: &mut Weights,
    op: F,
) -> Result<(), CarveError>
where
    F: FnOnce(&mut Pool, &mut Image, &mut Weights) -> Result<(), CarveError>,
{
    let mut t_image = image.transpose();
    let mut t_weights = weights.transpose();
    op(pool, &mut t_image, &mut t_weights)?;
    *image = t_image.transpose();
    *weights = t_weights.transpose();
    Ok(())
}

fn resize_with_pool(
    pool: &mut Pool,
    image: &mut Image,
    weights: &mut Weights,
    goal_x: usize,
    goal_y: usize,
    opts: &CarveOptions,
    progress: &mut Progress<'_>,
) -> Result<(), CarveError> {
    if goal_x < image.width() {
        remove::remove_seams(pool, image, weights, goal_x, opts, progress)?;
    }
    if goal_y < image.height() {
        transposed(pool, image, weights, |pool, image, weights| {
            remove::remove_seams(pool, image, weights, goal_y, opts, progress)
        })?;
    }
    if goal_x > image.width() {
        add::add_seams(pool, image, weights, goal_x, opts, progress)?;
    }
    if goal_y > image.height() {
        transposed(pool, image, weights, |pool, image, weights| {
            add::add_seams(pool, image, weights, goal_y, opts, progress)
        })?;
    }
    Ok(())
}

/// Retarget to `goal_x` by `goal_y`.  Axis order: vertical removal,
/// horizontal removal, vertical insertion, horizontal insertion.
/// Asking for the current size is a pure copy; no threads start.
pub fn resize(
    image: &Image,
    weights: &Weights,
    goal_x: usize,
    goal_y: usize,
    opts: &CarveOptions,
    callback: Option<&mut dyn FnMut(f32) -> bool>,
) -> Result<(Image, Weights), CarveError> {
    let mut image = image.clone();
    let mut weights = weights.clone();
    if goal_x == image.width() && goal_y == image.height() {
        return Ok((image, weights));
    }
    let total = span(image.width(), goal_x) + span(image.height(), goal_y);
    let mut progress = Progress::new(callback, total);
    let mut pool = Pool::start(opts.threads)?;
    resize_with_pool(&mut pool, &mut image, &mut weights, goal_x, goal_y, opts, &mut progress)?;
    Ok((image, weights))
}

/// Remove vertical seams down to `goal_x` columns.
pub fn remove_seams(
    image: &Image,
    weights: &Weights,
    goal_x: usize,
    opts: &CarveOptions,
    callback: Option<&mut dyn FnMut(f32) -> bool>,
) -> Result<(Image, Weights), CarveError> {
    resize(image, weights, goal_x.min(image.width()), image.height(), opts, callback)
}

/// Remove horizontal seams down to `goal_y` rows.
pub fn remove_seams_horizontal(
    image: &Image,
    weights: &Weights,
    goal_y: usize,
    opts: &CarveOptions,
    callback: Option<&mut dyn FnMut(f32) -> bool>,
) -> Result<(Image, Weights), CarveError> {
    resize(image, weights, image.width(), goal_y.min(image.height()), opts, callback)
}

/// Insert vertical seams up to `goal_x` columns.
pub fn add_seams(
    image: &Image,
    weights: &Weights,
    goal_x: usize,
    opts: &CarveOptions,
    callback: Option<&mut dyn FnMut(f32) -> bool>,
) -> Result<(Image, Weights), CarveError> {
    resize(image, weights, goal_x.max(image.width()), image.height(), opts, callback)
}

/// Insert horizontal seams up to `goal_y` rows.
pub fn add_seams_horizontal(
    image: &Image,
    weights: &Weights,
    goal_y: usize,
    opts: &CarveOptions,
    callback: Option<&mut dyn FnMut(f32) -> bool>,
) -> Result<(Image, Weights), CarveError> {
    resize(image, weights, image.width(), goal_y.max(image.height()), opts, callback)
}

/// The cheapest seam of one orientation, computed from scratch.
fn seam_candidate(
    pool: &mut Pool,
    image: &mut Image,
    weights: &mut Weights,
    opts: &CarveOptions,
) -> (i32, Matrix<u8>, Matrix<i32>, Matrix<i32>, Vec<usize>) {
    let mut gray = Matrix::new(image.width(), image.height());
    let mut edge = Matrix::new(image.width(), image.height());
    let mut energy = Matrix::new(image.width(), image.height());
    let mut path = vec![0usize; image.height()];
    gray::grayscale(pool, image, &mut gray);
    edge::edge_detect(pool, &mut gray, &mut edge, opts.kernel);
    let cost = energy::energy_path(
        pool,
        &mut edge,
        weights,
        &mut energy,
        &mut path,
        opts.energy,
        true,
    );
    (cost, gray, edge, energy, path)
}

/// Shrink toward the goal one seam at a time, each time carving
/// whichever orientation offers the cheaper seam.  Far slower than
/// `resize` and usually better looking.  Once one axis reaches its
/// goal the rest of the run is an ordinary `resize`.
pub fn adaptive_resize(
    image: &Image,
    weights: &Weights,
    goal_x: usize,
    goal_y: usize,
    opts: &CarveOptions,
    callback: Option<&mut dyn FnMut(f32) -> bool>,
) -> Result<(Image, Weights), CarveError> {
    let mut image = image.clone();
    let mut weights = weights.clone();
    let total = span(image.width(), goal_x) + span(image.height(), goal_y);
    let mut progress = Progress::new(callback, total);
    let mut pool = Pool::start(opts.threads)?;
    while image.width() > goal_x && image.height() > goal_y {
        progress.step()?;
        let (v_cost, mut v_gray, mut v_edge, mut v_energy, v_path) =
            seam_candidate(&mut pool, &mut image, &mut weights, opts);
        let mut t_image = image.transpose();
        let mut t_weights = weights.transpose();
        let (h_cost, mut h_gray, mut h_edge, mut h_energy, h_path) =
            seam_candidate(&mut pool, &mut t_image, &mut t_weights, opts);
        if v_cost <= h_cost {
            remove::remove_path(
                &mut pool,
                &mut image,
                &v_path,
                &mut weights,
                &mut v_edge,
                &mut v_gray,
                &mut v_energy,
                opts.kernel,
            );
        } else {
            remove::remove_path(
                &mut pool,
                &mut t_image,
                &h_path,
                &mut t_weights,
                &mut h_edge,
                &mut h_gray,
                &mut h_energy,
                opts.kernel,
            );
            image = t_image.transpose();
            weights = t_weights.transpose();
        }
    }
    resize_with_pool(&mut pool, &mut image, &mut weights, goal_x, goal_y, opts, &mut progress)?;
    Ok((image, weights))
}

/// Count the columns and rows holding at least one marked pixel.
fn count_negatives(weights: &Weights) -> (usize, usize) {
    let mut cols = vec![false; weights.width()];
    let mut rows = vec![false; weights.height()];
    for (x, y) in iproduct!(0..weights.width(), 0..weights.height()) {
        if weights[(x, y)] < 0 {
            cols[x] = true;
            rows[y] = true;
        }
    }
    (
        cols.iter().filter(|&&c| c).count(),
        rows.iter().filter(|&&r| r).count(),
    )
}

/// Carve out everything marked with negative weight, then grow back
/// to the original size.  Each attempt shrinks by the number of
/// marked lines; carving can smear a mark onto a surviving line, so
/// more than one attempt is sometimes needed.
pub fn object_removal(
    image: &Image,
    weights: &Weights,
    direction: Direction,
    max_attempts: usize,
    opts: &CarveOptions,
    mut callback: Option<&mut dyn FnMut(f32) -> bool>,
) -> Result<(Image, Weights), CarveError> {
    let original_x = image.width();
    let original_y = image.height();
    let mut image = image.clone();
    let mut weights = weights.clone();
    for _ in 0..max_attempts {
        let (marked_cols, marked_rows) = count_negatives(&weights);
        let vertical = match direction {
            Direction::Vertical => true,
            Direction::Horizontal => false,
            Direction::Auto => marked_cols <= marked_rows,
        };
        let marked = cq!(vertical, marked_cols, marked_rows);
        if marked == 0 {
            break;
        }
        let (goal_x, goal_y) = cq!(
            vertical,
            ((image.width() - marked).max(3), image.height()),
            (image.width(), (image.height() - marked).max(3))
        );
        let (carved_image, carved_weights) =
            resize(&image, &weights, goal_x, goal_y, opts, reborrow(&mut callback))?;
        image = carved_image;
        weights = carved_weights;
    }
    resize(&image, &weights, original_x, original_y, opts, callback)
}

/// Carve down to the minimum width, recording for every pixel the
/// image width at which it disappears.  Pixels that never disappear
/// stay zero.  `map_resize` then retargets in one pass per goal.
pub fn image_map(
    image: &Image,
    weights: &Weights,
    opts: &CarveOptions,
) -> Result<Matrix<i32>, CarveError> {
    let mut image = image.clone();
    let mut weights = weights.clone();
    let height = image.height();
    let mut map = Matrix::new(image.width(), height);
    let mut pool = Pool::start(opts.threads)?;
    let mut gray = Matrix::new(image.width(), height);
    let mut edge = Matrix::new(image.width(), height);
    let mut energy = Matrix::new(image.width(), height);
    let mut path = vec![0usize; height];
    gray::grayscale(&mut pool, &mut image, &mut gray);
    edge::edge_detect(&mut pool, &mut gray, &mut edge, opts.kernel);
    while image.width() > 3 {
        energy::energy_path(
            &mut pool,
            &mut edge,
            &mut weights,
            &mut energy,
            &mut path,
            opts.energy,
            true,
        );
        for y in 0..height {
            // Walk past already-recorded pixels to the one the seam
            // hits in the shrunken image's coordinates.
            let mut index = 0;
            let mut remaining = path[y];
            loop {
                while map[(index, y)] != 0 {
                    index += 1;
                }
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
                index += 1;
            }
            map[(index, y)] = image.width() as i32;
        }
        remove::remove_path(
            &mut pool,
            &mut image,
            &path,
            &mut weights,
            &mut edge,
            &mut gray,
            &mut energy,
            opts.kernel,
        );
    }
    Ok(map)
}

/// Retarget using a precomputed map.  A pixel whose recorded width is
/// above the goal is already gone at that width.
pub fn map_resize(image: &Image, map: &Matrix<i32>, goal_x: usize) -> Image {
    let mut out = Matrix::new(goal_x, image.height());
    for y in 0..image.height() {
        let mut input_x = 0;
        for x in 0..goal_x {
            while map[(input_x, y)] > goal_x as i32 {
                input_x += 1;
            }
            out[(x, y)] = image[(input_x, y)];
            input_x += 1;
        }
    }
    out
}

/// The luma matrix rendered back out as an image.
pub fn grayscale_image(image: &Image, opts: &CarveOptions) -> Result<Image, CarveError> {
    let mut pool = Pool::start(opts.threads)?;
    let mut source = image.clone();
    let mut gray = Matrix::new(image.width(), image.height());
    gray::grayscale(&mut pool, &mut source, &mut gray);
    let mut out = Matrix::new(image.width(), image.height());
    for (x, y) in iproduct!(0..image.width(), 0..image.height()) {
        let v = gray[(x, y)];
        out[(x, y)] = Rgba8 { r: v, g: v, b: v, a: 255 };
    }
    Ok(out)
}

/// The edge response, clamped into the displayable range.
pub fn edge_image(image: &Image, opts: &CarveOptions) -> Result<Image, CarveError> {
    let mut pool = Pool::start(opts.threads)?;
    let mut source = image.clone();
    let mut gray = Matrix::new(image.width(), image.height());
    let mut edge = Matrix::new(image.width(), image.height());
    gray::grayscale(&mut pool, &mut source, &mut gray);
    edge::edge_detect(&mut pool, &mut gray, &mut edge, opts.kernel);
    let mut out = Matrix::new(image.width(), image.height());
    for (x, y) in iproduct!(0..image.width(), 0..image.height()) {
        let v = edge[(x, y)].max(0).min(255) as u8;
        out[(x, y)] = Rgba8 { r: v, g: v, b: v, a: 255 };
    }
    Ok(out)
}

/// The unweighted vertical energy map, scaled to the displayable
/// range.
pub fn vertical_energy_image(image: &Image, opts: &CarveOptions) -> Result<Image, CarveError> {
    let mut pool = Pool::start(opts.threads)?;
    let mut source = image.clone();
    let mut gray = Matrix::new(image.width(), image.height());
    let mut edge = Matrix::new(image.width(), image.height());
    let mut energy = Matrix::new(image.width(), image.height());
    let mut weights = Matrix::new(image.width(), image.height());
    gray::grayscale(&mut pool, &mut source, &mut gray);
    edge::edge_detect(&mut pool, &mut gray, &mut edge, opts.kernel);
    pool.energy_map(&mut edge, &mut weights, &mut energy, opts.energy, None);
    let max = iproduct!(0..energy.width(), 0..energy.height())
        .map(|(x, y)| energy[(x, y)])
        .max()
        .unwrap_or(0)
        .max(1);
    let mut out = Matrix::new(image.width(), image.height());
    for (x, y) in iproduct!(0..image.width(), 0..image.height()) {
        let v = (i64::from(energy[(x, y)].max(0)) * 255 / i64::from(max)) as u8;
        out[(x, y)] = Rgba8 { r: v, g: v, b: v, a: 255 };
    }
    Ok(out)
}

/// The horizontal counterpart, by transposition.
pub fn horizontal_energy_image(image: &Image, opts: &CarveOptions) -> Result<Image, CarveError> {
    Ok(vertical_energy_image(&image.transpose(), opts)?.transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn flat(width: usize, height: usize, v: u8) -> Image {
        let mut image = Matrix::new(width, height);
        image.fill(Rgba8 { r: v, g: v, b: v, a: 255 });
        image
    }

    fn two_thread_opts() -> CarveOptions {
        let mut opts = CarveOptions::default();
        opts.set_threads(2);
        opts
    }

    #[test]
    fn identity_resize_is_a_pure_copy() {
        let image = flat(10, 6, 128);
        let weights = Matrix::new(10, 6);
        let (out_image, out_weights) =
            resize(&image, &weights, 10, 6, &two_thread_opts(), None).unwrap();
        assert_eq!(out_image, image);
        assert_eq!(out_weights, weights);
    }

    #[test]
    fn removing_one_seam_from_a_flat_image() {
        let image = flat(10, 6, 90);
        let weights = Matrix::new(10, 6);
        let (out, _) = resize(&image, &weights, 9, 6, &two_thread_opts(), None).unwrap();
        assert_eq!(out.width(), 9);
        assert_eq!(out.height(), 6);
        for y in 0..6 {
            for x in 0..9 {
                assert_eq!(out[(x, y)], image[(0, 0)]);
            }
        }
    }

    #[test]
    fn remove_then_add_round_trips_the_dimensions() {
        let image = flat(10, 6, 40);
        let weights = Matrix::new(10, 6);
        let opts = two_thread_opts();
        let (smaller, small_weights) = resize(&image, &weights, 8, 6, &opts, None).unwrap();
        assert_eq!(smaller.width(), 8);
        let (restored, _) = resize(&smaller, &small_weights, 10, 6, &opts, None).unwrap();
        assert_eq!(restored.width(), 10);
        assert_eq!(restored.height(), 6);
    }

    #[test]
    fn both_axes_shrink() {
        let image = flat(12, 10, 70);
        let weights = Matrix::new(12, 10);
        let (out, out_weights) = resize(&image, &weights, 9, 7, &two_thread_opts(), None).unwrap();
        assert_eq!(out.width(), 9);
        assert_eq!(out.height(), 7);
        assert_eq!(out_weights.width(), 9);
        assert_eq!(out_weights.height(), 7);
    }

    #[test]
    fn cancellation_stops_after_the_refusing_call() {
        let image = flat(12, 8, 128);
        let weights = Matrix::new(12, 8);
        let calls = Cell::new(0usize);
        let mut callback = |_fraction: f32| {
            calls.set(calls.get() + 1);
            calls.get() < 2
        };
        let result = resize(&image, &weights, 9, 8, &two_thread_opts(), Some(&mut callback));
        match result {
            Err(CarveError::Cancelled) => {}
            other => panic!("expected cancellation, got {:?}", other.map(|_| ())),
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn adaptive_resize_reaches_the_goal() {
        let image = flat(10, 10, 55);
        let weights = Matrix::new(10, 10);
        let (out, _) = adaptive_resize(&image, &weights, 8, 8, &two_thread_opts(), None).unwrap();
        assert_eq!(out.width(), 8);
        assert_eq!(out.height(), 8);
    }

    #[test]
    fn object_removal_restores_the_size_and_clears_the_marks() {
        let image = flat(20, 20, 100);
        let mut weights = Matrix::new(20, 20);
        for y in 0..20 {
            for x in 8..11 {
                weights[(x, y)] = -1000;
            }
        }
        let (out, out_weights) = object_removal(
            &image,
            &weights,
            Direction::Vertical,
            1,
            &two_thread_opts(),
            None,
        )
        .unwrap();
        assert_eq!(out.width(), 20);
        assert_eq!(out.height(), 20);
        for y in 0..20 {
            for x in 0..20 {
                assert!(out_weights[(x, y)] >= 0, "mark left at ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn map_resize_round_trips_at_full_width() {
        let image = flat(8, 5, 33);
        let weights = Matrix::new(8, 5);
        let map = image_map(&image, &weights, &two_thread_opts()).unwrap();
        assert_eq!(map_resize(&image, &map, 8), image);
        let narrowed = map_resize(&image, &map, 5);
        assert_eq!(narrowed.width(), 5);
        assert_eq!(narrowed.height(), 5);
    }

    #[test]
    fn visualization_helpers_keep_the_dimensions() {
        let image = flat(9, 7, 140);
        let opts = two_thread_opts();
        for out in &[
            grayscale_image(&image, &opts).unwrap(),
            edge_image(&image, &opts).unwrap(),
            vertical_energy_image(&image, &opts).unwrap(),
            horizontal_energy_image(&image, &opts).unwrap(),
        ] {
            assert_eq!(out.width(), 9);
            assert_eq!(out.height(), 7);
        }
    }
}
