use std::path::PathBuf;

use clap::{ArgAction, Args, Parser};

use crate::batch::default_output_dir;
use crate::errors::{BgRemoveError, Result};
use crate::model::{MobileSam, SamOptions, DEFAULT_DECODER_PATH, DEFAULT_ENCODER_PATH};

/// Model settings shared by both command-line tools.
#[derive(Args, Clone, Debug)]
pub struct ModelArgs {
    /// MobileSAM image encoder (ONNX)
    #[arg(long, default_value = DEFAULT_ENCODER_PATH)]
    pub encoder: PathBuf,

    /// MobileSAM prompt decoder (ONNX)
    #[arg(long, default_value = DEFAULT_DECODER_PATH)]
    pub decoder: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// Prompt grid density; the model is queried points_per_side^2 times per image
    #[arg(long, default_value_t = 16)]
    pub points_per_side: u32,

    #[arg(long, default_value_t = 0.88, value_parser = check_unit_interval)]
    pub pred_iou_thresh: f32,

    #[arg(long, default_value_t = 0.95, value_parser = check_unit_interval)]
    pub stability_score_thresh: f32,

    #[arg(long, default_value_t = 0.7, value_parser = check_unit_interval)]
    pub nms_thresh: f32,
}

impl ModelArgs {
    pub fn sam_options(&self) -> Result<SamOptions> {
        let options = SamOptions {
            points_per_side: self.points_per_side,
            pred_iou_thresh: self.pred_iou_thresh,
            stability_score_thresh: self.stability_score_thresh,
            nms_thresh: self.nms_thresh,
        };
        options.validate()?;
        Ok(options)
    }

    /// Loads MobileSAM, failing early when a model file is missing.
    pub fn load_model(&self) -> Result<MobileSam> {
        for (field, path) in [("encoder", &self.encoder), ("decoder", &self.decoder)] {
            if !path.is_file() {
                return Err(BgRemoveError::Validation {
                    field: field.to_string(),
                    reason: format!("model file does not exist: {}", path.display()),
                });
            }
        }

        MobileSam::new(
            &self.encoder,
            &self.decoder,
            self.device_id,
            self.sam_options()?,
        )
    }
}

/// Remove the background of one product photo
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct RemoveArgs {
    /// Input image
    pub input: PathBuf,

    /// Output image (default: <input stem>_nobg.png in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write a side-by-side comparison of the original and the result
    #[arg(long)]
    pub visualize: bool,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Remove the background of every product photo in a directory
#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct BatchArgs {
    /// Directory containing the input images
    pub input_dir: PathBuf,

    /// Output directory (default: <input_dir>/output)
    #[arg(short, long, alias = "output_dir")]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl BatchArgs {
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| default_output_dir(&self.input_dir))
    }
}

fn check_unit_interval(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("{} is not a number", s))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(format!("{} is outside [0, 1]", s));
    }
    Ok(value)
}
