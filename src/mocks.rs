use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::Result;
use crate::mask::{Mask, MaskBuffer};
use crate::traits::SegmentationModel;
use image::{Luma, RgbImage};

type MaskFn = dyn Fn(&RgbImage) -> Vec<Mask> + Send + Sync;

/// テスト用のモックセグメンテーションモデル
///
/// 画像ごとに返すマスクをクロージャで決め、呼び出し回数を記録する。
pub struct MockSegmentationModel {
    masks: Box<MaskFn>,
    calls: AtomicUsize,
}

impl MockSegmentationModel {
    pub fn from_fn<F>(masks: F) -> Self
    where
        F: Fn(&RgbImage) -> Vec<Mask> + Send + Sync + 'static,
    {
        Self {
            masks: Box::new(masks),
            calls: AtomicUsize::new(0),
        }
    }

    /// 常にマスクを返さないモデル
    pub fn empty() -> Self {
        Self::from_fn(|_| Vec::new())
    }

    /// 画像中央の矩形を前景とするマスクを 1 枚返すモデル
    pub fn centered_box() -> Self {
        Self::from_fn(|image| vec![centered_box_mask(image.width(), image.height())])
    }

    /// `generate_masks` が呼ばれた回数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockSegmentationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSegmentationModel")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn generate_masks(&self, image: &RgbImage) -> Result<Vec<Mask>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.masks)(image))
    }
}

/// 幅・高さの中央 1/2 を覆うマスク
pub fn centered_box_mask(width: u32, height: u32) -> Mask {
    let (x0, x1) = (width / 4, width - width / 4);
    let (y0, y1) = (height / 4, height - height / 4);
    Mask::new(MaskBuffer::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            Luma([1.0])
        } else {
            Luma([0.0])
        }
    }))
}
