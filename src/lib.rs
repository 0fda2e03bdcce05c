//! Content-aware image retargeting.
//!
//! Shrinks or grows an image by repeatedly carving out (or cloning
//! in) the connected vertical or horizontal path of pixels that
//! matters least, so the interesting content survives while the
//! boring parts give way.  A per-pixel weight matrix protects regions
//! or marks them for deletion, and the cumulative energy map at the
//! center of the algorithm is built by a pair of cooperating worker
//! threads and rebuilt incrementally between seams.
//!
//! The entry points live in [`retarget`]: `resize` for a plain
//! retarget, `adaptive_resize` for seam-at-a-time quality,
//! `object_removal` for weighted excision, and `image_map` /
//! `map_resize` for precomputed interactive resizing.

#[macro_use]
mod ternary;

pub mod matrix;
pub mod pixel;

mod add;
mod edge;
mod energy;
mod error;
mod gray;
mod pool;
mod remove;
pub mod retarget;

pub use crate::edge::Kernel;
pub use crate::energy::EnergyMode;
pub use crate::error::CarveError;
pub use crate::matrix::Matrix;
pub use crate::pixel::{image_from_rgba, image_to_rgba, Image, Rgba8};
pub use crate::retarget::{
    adaptive_resize, add_seams, add_seams_horizontal, edge_image, grayscale_image,
    horizontal_energy_image, image_map, map_resize, object_removal, remove_seams,
    remove_seams_horizontal, resize, vertical_energy_image, CarveOptions, Direction, Weights,
};
