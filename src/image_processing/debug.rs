use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};

use super::crop::CropRegion;
use super::face::FaceBox;

const FACE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const CROP_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
/// Outline thickness in pixels
const STROKE: u32 = 3;

/// Copy of `img` with the detected face outlined in red and the crop region in green
pub fn draw_overlay(img: &RgbImage, face: &FaceBox, region: &CropRegion) -> RgbImage {
    let mut overlay = img.clone();
    let (iw, ih) = img.dimensions();

    let (fx, fy, fw, fh) = face.to_pixels(iw, ih);
    draw_thick_rect(&mut overlay, fx, fy, fw, fh, FACE_COLOR);
    draw_thick_rect(
        &mut overlay,
        region.x as i64,
        region.y as i64,
        region.width as i64,
        region.height as i64,
        CROP_COLOR,
    );

    overlay
}

fn draw_thick_rect(img: &mut RgbImage, x: i64, y: i64, width: i64, height: i64, color: Rgb<u8>) {
    for inset in 0..STROKE as i64 {
        let w = width - 2 * inset;
        let h = height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at((x + inset) as i32, (y + inset) as i32).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Write the overlay for the file keyed `key` into `debug_dir` and return its path
pub fn write_overlay(
    debug_dir: &Path,
    key: &str,
    img: &RgbImage,
    face: &FaceBox,
    region: &CropRegion,
) -> Result<PathBuf> {
    std::fs::create_dir_all(debug_dir)
        .with_context(|| format!("Failed to create debug directory {}", debug_dir.display()))?;

    let path = debug_dir.join(format!("{}_debug.png", key));
    draw_overlay(img, face, region)
        .save_with_format(&path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write debug image {}", path.display()))?;

    Ok(path)
}
