use crate::errors::Result;
use crate::mask::Mask;
use image::RgbImage;

/// 画像セグメンテーションモデルの抽象化
///
/// 具象モデル（ONNX の MobileSAM など）ではなくこのトレイトに依存することで、
/// テストではモックモデルに差し替えられる。
pub trait SegmentationModel: Send + Sync {
    /// 画像全体から候補マスクを生成する
    ///
    /// 各マスクは入力画像と同じサイズ。候補が見つからなければ空の `Vec` を返す。
    fn generate_masks(&self, image: &RgbImage) -> Result<Vec<Mask>>;
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for &M {
    fn generate_masks(&self, image: &RgbImage) -> Result<Vec<Mask>> {
        (**self).generate_masks(image)
    }
}

impl<M: SegmentationModel + ?Sized> SegmentationModel for Box<M> {
    fn generate_masks(&self, image: &RgbImage) -> Result<Vec<Mask>> {
        (**self).generate_masks(image)
    }
}
