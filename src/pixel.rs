//! Pixel-level primitives: the RGBA payload the image matrix carries,
//! the luma extraction every derived map starts from, and the
//! averaging blend used when a seam is removed or inserted.

use image::{Rgba, RgbaImage};

use crate::matrix::Matrix;

/// One RGBA pixel.  A plain struct rather than the `image` crate's
/// generic pixel because the matrix store wants a `Default + Copy`
/// payload with no type parameters attached.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// The image as the carver sees it.
pub type Image = Matrix<Rgba8>;

/// Performs an RGB->YUV type conversion (we only want Y', the luma).
#[inline]
pub fn luma(p: Rgba8) -> u8 {
    ((299 * u32::from(p.r) + 587 * u32::from(p.g) + 114 * u32::from(p.b)) / 1000) as u8
}

/// Channel-wise average of two pixels, alpha included.
#[inline]
pub fn average(p1: Rgba8, p2: Rgba8) -> Rgba8 {
    Rgba8 {
        r: ((u16::from(p1.r) + u16::from(p2.r)) / 2) as u8,
        g: ((u16::from(p1.g) + u16::from(p2.g)) / 2) as u8,
        b: ((u16::from(p1.b) + u16::from(p2.b)) / 2) as u8,
        a: ((u16::from(p1.a) + u16::from(p2.a)) / 2) as u8,
    }
}

/// Ingest a decoded RGBA buffer into the matrix store.
pub fn image_from_rgba(buf: &RgbaImage) -> Image {
    let (width, height) = buf.dimensions();
    let mut out = Matrix::new(width as usize, height as usize);
    for (x, y, p) in buf.enumerate_pixels() {
        out[(x as usize, y as usize)] = Rgba8 {
            r: p[0],
            g: p[1],
            b: p[2],
            a: p[3],
        };
    }
    out
}

/// Emit the matrix back out as an encodable RGBA buffer.
pub fn image_to_rgba(image: &Image) -> RgbaImage {
    let mut out = RgbaImage::new(image.width() as u32, image.height() as u32);
    for (x, y, p) in out.enumerate_pixels_mut() {
        let c = image[(x as usize, y as usize)];
        *p = Rgba([c.r, c.g, c.b, c.a]);
    }
    out
}
