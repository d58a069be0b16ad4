use image::{GenericImageView, GrayImage, Luma, Primitive, Rgb, Rgba, RgbaImage};
use num_traits::Zero;

use crate::errors::{BgRemoveError, Result};
use crate::imageops::{OPAQUE, TRANSPARENT};

/// Hard threshold: any value above zero becomes [`OPAQUE`], everything else
/// [`TRANSPARENT`]. No intermediate alpha values are produced.
pub fn binarize<I, S>(mask: &I) -> GrayImage
where
    I: GenericImageView<Pixel = Luma<S>>,
    S: Primitive + 'static,
{
    let (width, height) = mask.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let Luma([value]) = mask.get_pixel(x, y);
        if value > S::zero() {
            Luma([OPAQUE])
        } else {
            Luma([TRANSPARENT])
        }
    })
}

/// Pastes `image` onto a fully transparent canvas of the same size, using
/// `alpha` as the paste mask.
pub fn cutout<I, M>(image: &I, alpha: &M) -> Result<RgbaImage>
where
    I: GenericImageView<Pixel = Rgb<u8>>,
    M: GenericImageView<Pixel = Luma<u8>>,
{
    let (width, height) = image.dimensions();
    if alpha.dimensions() != (width, height) {
        let (mask_width, mask_height) = alpha.dimensions();
        return Err(BgRemoveError::ImageProcessing {
            path: "unknown".to_string(),
            operation: "マスク適用".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "画像とマスクのサイズが一致しません: 画像{}x{}, マスク{}x{}",
                    width, height, mask_width, mask_height
                ),
            )),
        });
    }

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, TRANSPARENT]));
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let Luma([a]) = alpha.get_pixel(x, y);
        if a != TRANSPARENT {
            let Rgb([red, green, blue]) = image.get_pixel(x, y);
            *pixel = Rgba([red, green, blue, a]);
        }
    }

    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, RgbImage};

    #[test]
    fn test_binarize_is_two_valued() {
        let values = [-1.5_f32, 0.0, 0.001, 0.5, 1.0, 42.0];
        let mask = ImageBuffer::from_fn(values.len() as u32, 1, |x, _| Luma([values[x as usize]]));

        let binary = binarize(&mask);
        let alphas: Vec<u8> = binary.pixels().map(|Luma([a])| *a).collect();
        assert_eq!(alphas, vec![0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn test_binarize_integer_mask() {
        let mask = GrayImage::from_fn(4, 1, |x, _| Luma([x as u8]));
        let binary = binarize(&mask);
        assert_eq!(binary.get_pixel(0, 0), &Luma([0]));
        assert_eq!(binary.get_pixel(1, 0), &Luma([255]));
        assert_eq!(binary.get_pixel(3, 0), &Luma([255]));
    }

    #[test]
    fn test_cutout_copies_rgb_through_mask() -> Result<()> {
        let image = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let alpha = GrayImage::from_fn(3, 2, |x, _| Luma([if x == 1 { 255 } else { 0 }]));

        let result = cutout(&image, &alpha)?;
        assert_eq!(result.dimensions(), (3, 2));
        assert_eq!(result.get_pixel(1, 0), &Rgba([10, 20, 30, 255]));
        assert_eq!(result.get_pixel(0, 1), &Rgba([0, 0, 0, 0]));
        assert_eq!(result.get_pixel(2, 1), &Rgba([0, 0, 0, 0]));
        Ok(())
    }

    #[test]
    fn test_cutout_rejects_mismatched_mask() {
        let image = RgbImage::new(4, 4);
        let alpha = GrayImage::new(4, 3);
        assert!(matches!(
            cutout(&image, &alpha),
            Err(BgRemoveError::ImageProcessing { .. })
        ));
    }
}
