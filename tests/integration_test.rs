use std::path::PathBuf;

use image::{GenericImageView, Luma, Rgb, RgbImage, Rgba};
use tempfile::TempDir;

use product_bg_remove::{
    mask::MaskBuffer, mocks::MockSegmentationModel, BackgroundRemover, Mask, SegmentationModel,
};

/// 50x20 の画像に対して先頭 `covered` 画素（行優先）を覆うマスク
fn mask_with_coverage(covered: u32) -> Mask {
    Mask::new(MaskBuffer::from_fn(50, 20, |x, y| {
        Luma([if y * 50 + x < covered { 1.0 } else { 0.0 }])
    }))
}

fn write_input(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.path().join(name);
    RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 200]))
        .save(&path)
        .unwrap();
    path
}

#[test]
fn test_no_mask_returns_none_and_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, "empty.png", 30, 30);
    let output = temp_dir.path().join("empty_nobg.png");

    let remover = BackgroundRemover::new(MockSegmentationModel::empty());
    let result = remover.remove_background(&input, Some(&output)).unwrap();

    assert!(result.is_none());
    assert!(!output.exists());
    assert_eq!(remover.model().calls(), 1);
}

#[test]
fn test_largest_coverage_mask_is_used() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, "product.png", 50, 20);
    let output = temp_dir.path().join("product_nobg.png");

    let model = MockSegmentationModel::from_fn(|_| {
        vec![
            mask_with_coverage(100),
            mask_with_coverage(500),
            mask_with_coverage(250),
        ]
    });
    let remover = BackgroundRemover::new(model);
    let result = remover
        .remove_background(&input, Some(&output))
        .unwrap()
        .unwrap();

    let opaque = result.pixels().filter(|p| p.0[3] == 255).count();
    assert_eq!(opaque, 500);
    // row 9 is the last fully covered row of the 500-pixel mask
    assert_eq!(result.get_pixel(49, 9), &Rgba([49, 9, 200, 255]));
    assert_eq!(result.get_pixel(0, 10), &Rgba([0, 0, 0, 0]));
}

#[test]
fn test_soft_mask_is_binarized() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, "soft.png", 4, 2);
    let output = temp_dir.path().join("soft_nobg.png");

    let values = [0.2_f32, -0.3, 0.0, 0.9, 0.01, 1.0, -1.0, 0.5];
    let model = MockSegmentationModel::from_fn(move |_| {
        vec![Mask::new(MaskBuffer::from_fn(4, 2, |x, y| {
            Luma([values[(y * 4 + x) as usize]])
        }))]
    });
    let remover = BackgroundRemover::new(model);
    remover.remove_background(&input, Some(&output)).unwrap();

    let written = image::open(&output).unwrap().into_rgba8();
    let alphas: Vec<u8> = written.pixels().map(|p| p.0[3]).collect();
    assert_eq!(alphas, vec![255, 0, 0, 255, 255, 255, 0, 255]);
}

#[test]
fn test_output_dimensions_match_input() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_input(&temp_dir, "wide.jpg", 37, 23);
    let output = temp_dir.path().join("wide_nobg.png");

    let remover = BackgroundRemover::new(MockSegmentationModel::centered_box());
    remover.remove_background(&input, Some(&output)).unwrap();

    let written = image::open(&output).unwrap();
    assert_eq!(written.dimensions(), (37, 23));
    assert!(written.color().has_alpha());
}

#[test]
fn test_model_sees_rgb_input() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rgba.png");
    image::RgbaImage::from_pixel(6, 6, Rgba([10, 20, 30, 40]))
        .save(&path)
        .unwrap();

    let model = MockSegmentationModel::from_fn(|image| {
        assert_eq!(image.get_pixel(0, 0), &Rgb([10, 20, 30]));
        Vec::new()
    });
    let remover = BackgroundRemover::new(model);
    assert!(remover
        .remove_background(&path, Some(&temp_dir.path().join("out.png")))
        .unwrap()
        .is_none());
}

#[test]
fn test_trait_object_model() {
    let model: Box<dyn SegmentationModel> = Box::new(MockSegmentationModel::centered_box());
    let masks = model.generate_masks(&RgbImage::new(8, 8)).unwrap();
    assert_eq!(masks.len(), 1);
    assert_eq!(masks[0].dimensions(), (8, 8));
}
