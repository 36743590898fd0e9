//! Output mode scenarios and background adaptation properties

use bgcompose::{
    adapt_background, ColorMode, OutputCompositor, OutputMode, PipelineError, Result,
};
use image::{DynamicImage, GrayImage, Luma, LumaA, Rgb, RgbImage};
use tempfile::TempDir;

fn red_green() -> DynamicImage {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    image.put_pixel(1, 0, Rgb([0, 255, 0]));
    DynamicImage::ImageRgb8(image)
}

fn keep_left() -> GrayImage {
    GrayImage::from_raw(2, 1, vec![255, 0]).expect("2x1 mask")
}

#[test]
fn test_composite_written_to_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("composite.png");
    OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 255]).write_output(
        &red_green(),
        &keep_left(),
        None,
        &path,
    )?;

    let written = image::open(&path)?.to_rgb8();
    assert_eq!(written.as_raw(), &vec![255, 0, 0, 0, 0, 255]);
    Ok(())
}

#[test]
fn test_mask_only_written_to_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("mask.png");
    OutputCompositor::new(OutputMode::MaskOnly, [0, 0, 0]).write_output(
        &red_green(),
        &keep_left(),
        None,
        &path,
    )?;

    let written = image::open(&path)?;
    assert!(matches!(written, DynamicImage::ImageLuma8(_)));
    assert_eq!(written.to_luma8().as_raw(), &vec![255, 0]);
    Ok(())
}

#[test]
fn test_alpha_written_to_disk() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("alpha.png");
    OutputCompositor::new(OutputMode::ImageWithAlpha, [0, 0, 0]).write_output(
        &red_green(),
        &keep_left(),
        None,
        &path,
    )?;

    let written = image::open(&path)?.to_rgba8();
    assert_eq!(written.as_raw(), &vec![255, 0, 0, 255, 0, 255, 0, 0]);
    Ok(())
}

#[test]
fn test_gray_input_with_alpha() -> Result<()> {
    let gray = DynamicImage::ImageLuma8(GrayImage::from_raw(2, 1, vec![10, 20]).expect("gray"));
    let output = OutputCompositor::new(OutputMode::ImageWithAlpha, [0, 0, 0])
        .compose(&gray, &keep_left(), None)?;

    let la = output.as_luma_alpha8().expect("gray with alpha");
    assert_eq!(*la.get_pixel(0, 0), LumaA([10, 255]));
    assert_eq!(*la.get_pixel(1, 0), LumaA([20, 0]));
    Ok(())
}

#[test]
fn test_intermediate_mask_values_blend_linearly() -> Result<()> {
    let white = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([255, 255, 255])));
    let half = GrayImage::from_pixel(1, 1, Luma([128]));
    let output = OutputCompositor::new(OutputMode::CompositedBackground, [0, 0, 0])
        .compose(&white, &half, None)?
        .to_rgb8();

    assert_eq!(output.get_pixel(0, 0).0, [128, 128, 128]);
    Ok(())
}

#[test]
fn test_failed_write_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wrong.png");
    let err = OutputCompositor::new(OutputMode::MaskOnly, [0, 0, 0])
        .write_output(&red_green(), &GrayImage::new(3, 3), None, &path)
        .unwrap_err();

    assert!(matches!(err, PipelineError::Mask(_)));
    assert!(!path.exists());
}

#[test]
fn test_adaptation_is_idempotent() {
    let originals = [
        DynamicImage::ImageRgb8(RgbImage::from_fn(13, 7, |x, y| {
            Rgb([(x * 19) as u8, (y * 31) as u8, 77])
        })),
        DynamicImage::ImageLuma8(GrayImage::from_fn(9, 11, |x, y| Luma([(x * y) as u8]))),
    ];
    let targets = [
        ((5, 5), ColorMode::Rgb),
        ((20, 3), ColorMode::Rgb),
        ((13, 7), ColorMode::Luma),
        ((4, 8), ColorMode::Luma),
    ];

    for original in &originals {
        for &(size, mode) in &targets {
            let once = adapt_background(Some(original), None, size, mode).expect("adapted");
            let twice =
                adapt_background(Some(original), Some(once.clone()), size, mode).expect("adapted");

            assert_eq!(twice.width(), once.width());
            assert_eq!(twice.height(), once.height());
            assert_eq!(ColorMode::of(&twice), ColorMode::of(&once));
            assert_eq!(twice.as_bytes(), once.as_bytes());
        }
    }
}

#[test]
fn test_no_original_means_no_background() {
    let cached = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
    assert!(adapt_background(None, Some(cached), (2, 2), ColorMode::Rgb).is_none());
}
