use std::path::Path;

use crate::{
    errors::{BgRemoveError, Result},
    imageops::{OPAQUE, TRANSPARENT},
    mask::{positive_bounds, Mask},
    traits::SegmentationModel,
};
use image::{imageops, imageops::FilterType, GrayImage, Luma, RgbImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::Session,
};
use parking_lot::Mutex;
use tracing::{debug, info};

pub const DEFAULT_ENCODER_PATH: &str = "mobile_sam_encoder.onnx";
pub const DEFAULT_DECODER_PATH: &str = "mobile_sam_decoder.onnx";

/// Side of the square image the encoder consumes.
pub const ENCODER_INPUT_SIZE: u32 = 1024;

const LOW_RES_MASK_SIZE: usize = 256;
const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];
const STABILITY_SCORE_OFFSET: f32 = 1.0;

/// Knobs of the automatic ("segment everything") mask generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamOptions {
    /// The prompt grid has `points_per_side * points_per_side` points.
    pub points_per_side: u32,
    /// Minimum predicted IoU for a candidate to survive.
    pub pred_iou_thresh: f32,
    /// Minimum stability score for a candidate to survive.
    pub stability_score_thresh: f32,
    /// Box IoU above which the lower-scored of two masks is dropped.
    pub nms_thresh: f32,
}

impl Default for SamOptions {
    fn default() -> Self {
        Self {
            points_per_side: 16,
            pred_iou_thresh: 0.88,
            stability_score_thresh: 0.95,
            nms_thresh: 0.7,
        }
    }
}

impl SamOptions {
    pub fn validate(&self) -> Result<()> {
        if self.points_per_side == 0 {
            return Err(BgRemoveError::Validation {
                field: "points_per_side".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        for (field, value) in [
            ("pred_iou_thresh", self.pred_iou_thresh),
            ("stability_score_thresh", self.stability_score_thresh),
            ("nms_thresh", self.nms_thresh),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BgRemoveError::Validation {
                    field: field.to_string(),
                    reason: format!("must be within [0, 1], got {}", value),
                });
            }
        }

        Ok(())
    }
}

/// MobileSAM split into its ONNX image encoder and prompt decoder.
///
/// Both sessions are created once and reused for every image.
pub struct MobileSam {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    options: SamOptions,
}

impl MobileSam {
    pub fn new(
        encoder_path: &Path,
        decoder_path: &Path,
        device_id: i32,
        options: SamOptions,
    ) -> Result<Self> {
        options.validate()?;

        let encoder = build_session(encoder_path, device_id)?;
        let decoder = build_session(decoder_path, device_id)?;
        info!(
            "MobileSAM loaded (encoder: {}, decoder: {})",
            encoder_path.display(),
            decoder_path.display()
        );

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            options,
        })
    }

    fn embed(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let tensor = preprocess(image, ENCODER_INPUT_SIZE);
        let mut session = self.encoder.lock();
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(&tensor)?])?;
        let embeddings = outputs[0]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        Ok(embeddings)
    }
}

impl SegmentationModel for MobileSam {
    fn generate_masks(&self, image: &RgbImage) -> Result<Vec<Mask>> {
        let (width, height) = image.dimensions();
        let embeddings = self.embed(image)?;
        let scale = resize_scale(width, height, ENCODER_INPUT_SIZE);

        let mut kept = NmsSet::new(self.options.nms_thresh);
        let mut total = 0;
        let mut decoder = self.decoder.lock();
        for [x, y] in point_grid(self.options.points_per_side, width, height) {
            let (logits, scores) = decode_point(
                &mut decoder,
                &embeddings,
                [x * scale, y * scale],
                (width, height),
            )?;

            for (logit, &score) in logits.outer_iter().zip(scores.iter()) {
                if score < self.options.pred_iou_thresh
                    || stability_score(logit, STABILITY_SCORE_OFFSET)
                        < self.options.stability_score_thresh
                {
                    continue;
                }
                let Some(bounds) = positive_bounds(logit) else {
                    continue;
                };

                total += 1;
                kept.offer(bounds, score, || threshold_logits(logit));
            }
        }
        drop(decoder);

        let masks: Vec<Mask> = kept
            .into_ranked()
            .into_iter()
            .map(|(pixels, score)| Mask::from_binary(&pixels).with_score(score))
            .collect();
        debug!("{} candidate masks, {} kept after NMS", total, masks.len());
        Ok(masks)
    }
}

fn build_session(model_path: &Path, device_id: i32) -> Result<Session> {
    Session::builder()
        .map_err(|e| BgRemoveError::model("セッションビルダー初期化", e))?
        .with_execution_providers([
            TensorRTExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
            CUDAExecutionProvider::default()
                .with_device_id(device_id)
                .build(),
        ])
        .map_err(|e| BgRemoveError::model("実行プロバイダー設定", e))?
        .with_memory_pattern(true)
        .map_err(|e| BgRemoveError::model("メモリパターン設定", e))?
        .commit_from_file(model_path)
        .map_err(|e| {
            BgRemoveError::model(
                format!("モデルファイル読み込み: {}", model_path.display()),
                e,
            )
        })
}

/// Runs the prompt decoder for a single foreground point given in the
/// encoder's coordinate frame. Returns `(K, height, width)` mask logits and
/// the `K` predicted IoUs.
fn decode_point(
    decoder: &mut Session,
    embeddings: &Array4<f32>,
    point: [f32; 2],
    (width, height): (u32, u32),
) -> Result<(Array3<f32>, Array1<f32>)> {
    // the second point is the padding prompt the SAM decoder expects without a box
    let point_coords = array![[[point[0], point[1]], [0.0, 0.0]]];
    let point_labels = array![[1.0_f32, -1.0]];
    let mask_input = Array4::<f32>::zeros((1, 1, LOW_RES_MASK_SIZE, LOW_RES_MASK_SIZE));
    let has_mask_input = array![0.0_f32];
    let orig_im_size = array![height as f32, width as f32];

    let outputs = decoder.run(ort::inputs![
        "image_embeddings" => TensorRef::from_array_view(embeddings)?,
        "point_coords" => TensorRef::from_array_view(&point_coords)?,
        "point_labels" => TensorRef::from_array_view(&point_labels)?,
        "mask_input" => TensorRef::from_array_view(&mask_input)?,
        "has_mask_input" => TensorRef::from_array_view(&has_mask_input)?,
        "orig_im_size" => TensorRef::from_array_view(&orig_im_size)?,
    ])?;

    let masks = outputs["masks"]
        .try_extract_array::<f32>()?
        .into_dimensionality::<Ix4>()?;
    let scores = outputs["iou_predictions"]
        .try_extract_array::<f32>()?
        .into_dimensionality::<Ix2>()?;

    Ok((
        masks.index_axis(Axis(0), 0).to_owned(),
        scores.index_axis(Axis(0), 0).to_owned(),
    ))
}

fn resize_scale(width: u32, height: u32, target: u32) -> f32 {
    target as f32 / width.max(height) as f32
}

/// Resizes the longest side to `size`, normalizes each channel and pads the
/// bottom/right with zeros into a `(1, 3, size, size)` tensor.
pub fn preprocess(image: &RgbImage, size: u32) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let scale = resize_scale(width, height, size);
    let new_width = ((width as f32 * scale).round() as u32).clamp(1, size);
    let new_height = ((height as f32 * scale).round() as u32).clamp(1, size);

    let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
    let pixels = resized.as_ndarray3();

    let mut tensor = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (channel, (mean, std)) in PIXEL_MEAN.iter().zip(PIXEL_STD).enumerate() {
        tensor
            .slice_mut(s![0, channel, ..new_height as usize, ..new_width as usize])
            .zip_mut_with(&pixels.index_axis(Axis(0), channel), |t, &p| {
                *t = (f32::from(p) - mean) / std;
            });
    }

    tensor
}

/// Prompt points at the centers of an `n x n` grid over the image.
pub fn point_grid(n: u32, width: u32, height: u32) -> Vec<[f32; 2]> {
    let step = 1.0 / n as f32;
    (0..n)
        .flat_map(|j| {
            (0..n).map(move |i| {
                [
                    (i as f32 + 0.5) * step * width as f32,
                    (j as f32 + 0.5) * step * height as f32,
                ]
            })
        })
        .collect()
}

/// Ratio of the area above `+offset` to the area above `-offset`.
pub fn stability_score(logits: ArrayView2<f32>, offset: f32) -> f32 {
    let intersections = logits.iter().filter(|&&v| v > offset).count();
    let unions = logits.iter().filter(|&&v| v > -offset).count();
    if unions == 0 {
        0.0
    } else {
        intersections as f32 / unions as f32
    }
}

/// IoU of two inclusive `[x_min, y_min, x_max, y_max]` boxes.
pub fn box_iou(a: &[u32; 4], b: &[u32; 4]) -> f32 {
    let area = |r: &[u32; 4]| (r[2] - r[0] + 1) as f32 * (r[3] - r[1] + 1) as f32;

    let x_min = a[0].max(b[0]);
    let y_min = a[1].max(b[1]);
    let x_max = a[2].min(b[2]);
    let y_max = a[3].min(b[3]);
    if x_max < x_min || y_max < y_min {
        return 0.0;
    }

    let intersection = (x_max - x_min + 1) as f32 * (y_max - y_min + 1) as f32;
    intersection / (area(a) + area(b) - intersection)
}

/// Foreground where the logit is positive.
fn threshold_logits(logits: ArrayView2<f32>) -> GrayImage {
    let (height, width) = logits.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        if logits[[y as usize, x as usize]] > 0.0 {
            Luma([OPAQUE])
        } else {
            Luma([TRANSPARENT])
        }
    })
}

/// Greedy box NMS applied while candidates arrive.
///
/// No two entries overlap above `iou_thresh`, so suppressed masks are
/// released as soon as something better covers them and the set stays as
/// small as the number of distinct regions.
#[derive(Debug)]
pub struct NmsSet<T> {
    iou_thresh: f32,
    entries: Vec<(T, [u32; 4], f32)>,
}

impl<T> NmsSet<T> {
    pub const fn new(iou_thresh: f32) -> Self {
        Self {
            iou_thresh,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps the candidate unless an overlapping entry scores at least as
    /// high, evicting the overlapping entries it beats. `item` is only built
    /// for a kept candidate.
    pub fn offer(&mut self, bounds: [u32; 4], score: f32, item: impl FnOnce() -> T) -> bool {
        let overlaps = |other: &[u32; 4]| box_iou(&bounds, other) > self.iou_thresh;
        if self
            .entries
            .iter()
            .any(|(_, other, other_score)| *other_score >= score && overlaps(other))
        {
            return false;
        }

        let iou_thresh = self.iou_thresh;
        self.entries.retain(|(_, other, _)| box_iou(&bounds, other) <= iou_thresh);
        self.entries.push((item(), bounds, score));
        true
    }

    /// Kept items with their scores, highest score first. Equal scores keep
    /// arrival order.
    pub fn into_ranked(mut self) -> Vec<(T, f32)> {
        self.entries.sort_by(|a, b| b.2.total_cmp(&a.2));
        self.entries
            .into_iter()
            .map(|(item, _, score)| (item, score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_default_options_are_valid() {
        assert!(SamOptions::default().validate().is_ok());
    }

    #[test]
    fn test_options_validation() {
        let options = SamOptions {
            points_per_side: 0,
            ..SamOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(BgRemoveError::Validation { field, .. }) if field == "points_per_side"
        ));

        let options = SamOptions {
            nms_thresh: 1.5,
            ..SamOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(BgRemoveError::Validation { field, .. }) if field == "nms_thresh"
        ));
    }

    #[test]
    fn test_preprocess_resizes_longest_side_and_pads() {
        let mean = Rgb([124, 116, 104]);
        let image = RgbImage::from_pixel(200, 100, mean);

        let tensor = preprocess(&image, 64);
        assert_eq!(tensor.shape(), &[1, 3, 64, 64]);

        // content occupies the top half, normalized close to zero
        for channel in 0..3 {
            assert!(tensor[[0, channel, 10, 10]].abs() < 0.05);
        }
        // bottom half is padding
        assert_eq!(tensor[[0, 0, 40, 10]], 0.0);
        assert_eq!(tensor[[0, 2, 63, 63]], 0.0);
    }

    #[test]
    fn test_point_grid_centers() {
        let points = point_grid(2, 100, 50);
        assert_eq!(
            points,
            vec![[25.0, 12.5], [75.0, 12.5], [25.0, 37.5], [75.0, 37.5]]
        );
    }

    #[test]
    fn test_stability_score() {
        let logits = array![[2.0_f32, 0.5], [-0.5, -3.0]];
        assert_eq!(stability_score(logits.view(), 1.0), 1.0 / 3.0);

        let empty = Array2::<f32>::from_elem((2, 2), -5.0);
        assert_eq!(stability_score(empty.view(), 1.0), 0.0);
    }

    #[test]
    fn test_box_iou() {
        assert_eq!(box_iou(&[0, 0, 9, 9], &[0, 0, 9, 9]), 1.0);
        assert_eq!(box_iou(&[0, 0, 4, 4], &[10, 10, 14, 14]), 0.0);
        // 5x10 overlap of two 10x10 boxes
        let iou = box_iou(&[0, 0, 9, 9], &[5, 0, 14, 9]);
        assert!((iou - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_threshold_logits() {
        let logits = array![[-1.0_f32, 0.0, 2.0], [0.3, -0.1, 5.0]];
        let binary = threshold_logits(logits.view());

        assert_eq!(binary.dimensions(), (3, 2));
        assert_eq!(
            binary.as_raw(),
            &vec![TRANSPARENT, TRANSPARENT, OPAQUE, OPAQUE, TRANSPARENT, OPAQUE]
        );
    }

    #[test]
    fn test_nms_drops_overlapping_lower_score() {
        let mut kept = NmsSet::new(0.7);
        assert!(kept.offer([0, 0, 19, 19], 0.90, || "a"));
        assert!(kept.offer([1, 1, 19, 19], 0.95, || "b"));
        assert!(kept.offer([25, 25, 35, 35], 0.89, || "c"));

        assert_eq!(kept.into_ranked(), vec![("b", 0.95), ("c", 0.89)]);
    }

    #[test]
    fn test_nms_keeps_first_of_equal_scores() {
        let mut kept = NmsSet::new(0.7);
        assert!(kept.offer([0, 0, 9, 9], 0.9, || 1));
        assert!(!kept.offer([0, 0, 9, 9], 0.9, || 2));
        assert!(kept.offer([20, 20, 29, 29], 0.9, || 3));

        assert_eq!(kept.into_ranked(), vec![(1, 0.9), (3, 0.9)]);
    }

    #[test]
    fn test_nms_stays_bounded_for_repeated_regions() {
        // 一つの商品に当たった多数のグリッド点がほぼ同じマスクを返すケース
        let mut kept = NmsSet::new(0.7);
        let mut built = 0;
        for i in 0..1024_u32 {
            let score = 0.88 + (i % 7) as f32 * 0.01;
            kept.offer([100 + i % 3, 100, 900, 700 + i % 5], score, || {
                built += 1;
                vec![0_u8; 64]
            });
            assert_eq!(kept.len(), 1);
        }

        // only a strictly better score can replace the kept mask
        assert!(built <= 7);
        let ranked = kept.into_ranked();
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].1 - 0.94).abs() < 1e-6);
    }
}
