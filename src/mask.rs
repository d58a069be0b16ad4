use image::{GrayImage, ImageBuffer, Luma};
use ndarray::ArrayView2;

use crate::imageops;

/// Per-pixel intensity map of one candidate foreground region.
pub type MaskBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A candidate region produced by a segmentation model.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pixels: MaskBuffer,
    score: f32,
}

impl Mask {
    pub const fn new(pixels: MaskBuffer) -> Self {
        Self { pixels, score: 1.0 }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    /// `0.0`/`1.0` mask from a binary image; any nonzero pixel is foreground.
    pub fn from_binary(pixels: &GrayImage) -> Self {
        Self::new(MaskBuffer::from_fn(pixels.width(), pixels.height(), |x, y| {
            Luma([if pixels.get_pixel(x, y)[0] > 0 { 1.0 } else { 0.0 }])
        }))
    }

    pub const fn pixels(&self) -> &MaskBuffer {
        &self.pixels
    }

    /// Quality score reported by the model (predicted IoU for SAM).
    pub const fn score(&self) -> f32 {
        self.score
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Sum of the positive pixel values, used as a proxy for object size.
    pub fn coverage(&self) -> f64 {
        self.pixels
            .pixels()
            .map(|&Luma([v])| v)
            .filter(|v| *v > 0.0)
            .map(f64::from)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        !self.pixels.pixels().any(|&Luma([v])| v > 0.0)
    }

    /// Inclusive `[x_min, y_min, x_max, y_max]` of the positive pixels.
    pub fn bounding_box(&self) -> Option<[u32; 4]> {
        let (width, height) = self.dimensions();
        let mut bounds = [width, height, 0, 0];
        let mut found = false;

        for (x, y, &Luma([v])) in self.pixels.enumerate_pixels() {
            if v > 0.0 {
                update_bounds(&mut bounds, x, y);
                found = true;
            }
        }

        found.then_some(bounds)
    }

    /// Strictly two-valued alpha map of this mask.
    pub fn binarize(&self) -> GrayImage {
        imageops::binarize(&self.pixels)
    }
}

/// Inclusive `[x_min, y_min, x_max, y_max]` of the positive values of a
/// `(height, width)` map, computed without building a mask.
pub fn positive_bounds(values: ArrayView2<f32>) -> Option<[u32; 4]> {
    let (height, width) = values.dim();
    let mut bounds = [width as u32, height as u32, 0, 0];
    let mut found = false;

    for ((y, x), &v) in values.indexed_iter() {
        if v > 0.0 {
            update_bounds(&mut bounds, x as u32, y as u32);
            found = true;
        }
    }

    found.then_some(bounds)
}

fn update_bounds(bounds: &mut [u32; 4], x: u32, y: u32) {
    bounds[0] = bounds[0].min(x);
    bounds[1] = bounds[1].min(y);
    bounds[2] = bounds[2].max(x);
    bounds[3] = bounds[3].max(y);
}

/// Picks the mask with the largest coverage.
///
/// The dominant region is assumed to be the product. On equal coverage the
/// earliest mask in model order wins. Returns `None` for an empty slice.
pub fn select_mask(masks: &[Mask]) -> Option<&Mask> {
    masks
        .iter()
        .map(|mask| (mask, mask.coverage()))
        .fold(None::<(&Mask, f64)>, |best, (mask, coverage)| match best {
            Some((_, best_coverage)) if coverage <= best_coverage => best,
            _ => Some((mask, coverage)),
        })
        .map(|(mask, _)| mask)
}
