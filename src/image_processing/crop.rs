use anyhow::{anyhow, Result};
use image::{imageops, RgbImage};

use super::face::FaceBox;

/// How far the crop extends past the face box, as fractions of the face size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadAndNeckMargins {
    /// Added left and right, relative to the face width
    pub side: f32,
    /// Added above the face, relative to the face height
    pub above: f32,
    /// Added below the face to keep the neck, relative to the face height
    pub below: f32,
}

impl Default for HeadAndNeckMargins {
    fn default() -> Self {
        Self {
            side: 0.2,
            above: 0.8,
            below: 0.6,
        }
    }
}

/// Pixel rectangle inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Expand `face` by `margins` and clamp the result to the image bounds
pub fn head_and_neck_region(
    face: &FaceBox,
    image_width: u32,
    image_height: u32,
    margins: &HeadAndNeckMargins,
) -> Result<CropRegion> {
    let iw = image_width as f32;
    let ih = image_height as f32;

    let width = face.width * iw;
    let height = face.height * ih;
    let left = face.x * iw;
    let top = face.y * ih;

    let x0 = (left - margins.side * width).max(0.0).round() as u32;
    let x1 = (left + width + margins.side * width).min(iw).round() as u32;
    let y0 = (top - margins.above * height).max(0.0).round() as u32;
    let y1 = (top + height + margins.below * height).min(ih).round() as u32;

    if x1 <= x0 || y1 <= y0 {
        return Err(anyhow!(
            "Face region is empty on a {}x{} image",
            image_width,
            image_height
        ));
    }

    Ok(CropRegion {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

/// Copy `region` out of `img`
pub fn crop_image(img: &RgbImage, region: &CropRegion) -> Result<RgbImage> {
    let (img_width, img_height) = img.dimensions();

    if region.x + region.width > img_width || region.y + region.height > img_height {
        return Err(anyhow!(
            "Crop dimensions exceed image bounds: crop({},{},{}x{}) on {}x{} image",
            region.x,
            region.y,
            region.width,
            region.height,
            img_width,
            img_height
        ));
    }

    Ok(imageops::crop_imm(img, region.x, region.y, region.width, region.height).to_image())
}
