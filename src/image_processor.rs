use std::path::{Path, PathBuf};

use image::{ImageFormat, ImageReader, RgbImage, RgbaImage};
use tracing::{debug, info, warn};

use crate::errors::{BgRemoveError, Result};
use crate::imageops::cutout;
use crate::mask::select_mask;
use crate::traits::SegmentationModel;

/// Appended to the input file stem to name the output.
pub const OUTPUT_SUFFIX: &str = "_nobg";
/// Extension of every output file; PNG keeps the alpha channel losslessly.
pub const OUTPUT_EXTENSION: &str = "png";

/// `photo.jpg` -> `photo_nobg.png`.
pub fn output_file_name(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    format!("{}{}.{}", stem, OUTPUT_SUFFIX, OUTPUT_EXTENSION)
}

/// Output path used when none is given: the output file name, relative to
/// the current working directory.
pub fn default_output_path(input: &Path) -> PathBuf {
    PathBuf::from(output_file_name(input))
}

/// Decodes `path` by its content rather than its extension and converts it
/// to 8-bit RGB.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let read_error = |source: Box<dyn std::error::Error + Send + Sync>| {
        BgRemoveError::ImageProcessing {
            path: path.display().to_string(),
            operation: "画像読み込み".to_string(),
            source,
        }
    };

    let image = ImageReader::open(path)
        .map_err(|e| read_error(Box::new(e)))?
        .with_guessed_format()
        .map_err(|e| read_error(Box::new(e)))?
        .decode()
        .map_err(|e| read_error(Box::new(e)))?;
    Ok(image.into_rgb8())
}

/// Removes the background of single images with a segmentation model.
///
/// The model is loaded once and shared by every call.
pub struct BackgroundRemover<M: SegmentationModel> {
    model: M,
}

impl<M: SegmentationModel> BackgroundRemover<M> {
    pub const fn new(model: M) -> Self {
        Self { model }
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    /// Cuts the dominant object out of `input` and writes it as RGBA PNG.
    ///
    /// Returns `Ok(None)` without writing anything when the model finds no
    /// mask. Unreadable input, model failures and write failures are errors.
    pub fn remove_background(
        &self,
        input: &Path,
        output: Option<&Path>,
    ) -> Result<Option<RgbaImage>> {
        let output = output.map_or_else(|| default_output_path(input), Path::to_path_buf);

        let image = load_rgb(input)?;

        let masks = self.model.generate_masks(&image)?;
        let Some(mask) = select_mask(&masks) else {
            warn!("no mask found: {}", input.display());
            return Ok(None);
        };
        debug!(
            "selected mask with coverage {} out of {} candidates",
            mask.coverage(),
            masks.len()
        );

        let alpha = mask.binarize();
        let result = cutout(&image, &alpha).map_err(|e| match e {
            BgRemoveError::ImageProcessing {
                operation, source, ..
            } => BgRemoveError::ImageProcessing {
                path: input.display().to_string(),
                operation,
                source,
            },
            other => other,
        })?;

        result
            .save_with_format(&output, ImageFormat::Png)
            .map_err(|e| BgRemoveError::ImageProcessing {
                path: output.display().to_string(),
                operation: "画像保存".to_string(),
                source: Box::new(e),
            })?;
        info!("saved background-removed image: {}", output.display());

        Ok(Some(result))
    }
}
