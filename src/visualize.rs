use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, ImageFormat, Rgb, RgbImage, RgbaImage};

use crate::errors::{BgRemoveError, Result};

const GAP: u32 = 16;
const CHECKER_SIZE: u32 = 16;
const CHECKER_LIGHT: Rgb<u8> = Rgb([255, 255, 255]);
const CHECKER_DARK: Rgb<u8> = Rgb([204, 204, 204]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// `out/shoe_nobg.png` -> `out/shoe_nobg_compare.png`.
pub fn comparison_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    output.with_file_name(format!("{}_compare.png", stem))
}

/// Draws `result` over a checkerboard so transparent regions stay visible.
pub fn flatten_on_checkerboard(result: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(result.width(), result.height(), |x, y| {
        let background = if (x / CHECKER_SIZE + y / CHECKER_SIZE) % 2 == 0 {
            CHECKER_LIGHT
        } else {
            CHECKER_DARK
        };
        let [r, g, b, a] = result.get_pixel(x, y).0;
        let blend = |fg: u8, bg: u8| {
            let a = u16::from(a);
            ((u16::from(fg) * a + u16::from(bg) * (255 - a) + 127) / 255) as u8
        };
        Rgb([
            blend(r, background[0]),
            blend(g, background[1]),
            blend(b, background[2]),
        ])
    })
}

/// Scales `panel` to `height`, keeping its aspect ratio.
fn scale_to_height(panel: &RgbImage, height: u32) -> RgbImage {
    if panel.height() == height {
        return panel.clone();
    }
    let width = (u64::from(panel.width()) * u64::from(height) / u64::from(panel.height())).max(1);
    imageops::resize(panel, width as u32, height, FilterType::Triangle)
}

/// Original on the left, result on the right, both scaled to the taller
/// panel's height.
pub fn render_comparison(original: &RgbImage, result: &RgbaImage) -> RgbImage {
    let height = original.height().max(result.height());
    let left = scale_to_height(original, height);
    let right = scale_to_height(&flatten_on_checkerboard(result), height);

    let mut canvas = RgbImage::from_pixel(left.width() + GAP + right.width(), height, BACKGROUND);
    imageops::overlay(&mut canvas, &left, 0, 0);
    imageops::overlay(&mut canvas, &right, i64::from(left.width() + GAP), 0);
    canvas
}

pub fn save_comparison(original: &RgbImage, result: &RgbaImage, path: &Path) -> Result<()> {
    render_comparison(original, result)
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| BgRemoveError::ImageProcessing {
            path: path.display().to_string(),
            operation: "比較画像保存".to_string(),
            source: Box::new(e),
        })
}
