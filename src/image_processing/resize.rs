use anyhow::{anyhow, Result};
use fast_image_resize::{images::Image, PixelType, ResizeOptions, Resizer};
use image::{imageops, Rgb, RgbImage};
use std::num::NonZeroU32;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Largest size with the source aspect ratio that fits inside the target box
///
/// Both dimensions are at least 1 pixel.
pub fn fit_dimensions(
    src_width: u32,
    src_height: u32,
    target_width: u32,
    target_height: u32,
) -> (u32, u32) {
    let source_aspect = src_width as f64 / src_height as f64;
    let target_aspect = target_width as f64 / target_height as f64;

    let (width, height) = if target_aspect >= source_aspect {
        // Limited by height
        let width = (target_height as f64 * source_aspect).round() as u32;
        (width.min(target_width), target_height)
    } else {
        // Limited by width
        let height = (target_width as f64 / source_aspect).round() as u32;
        (target_width, height.min(target_height))
    };

    (width.max(1), height.max(1))
}

/// Scale `img` to fit `target_width x target_height` and centre it on a white canvas
pub fn letterbox(img: &RgbImage, target_width: u32, target_height: u32) -> Result<RgbImage> {
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(anyhow!("Cannot letterbox an empty image"));
    }

    let (new_width, new_height) = fit_dimensions(src_width, src_height, target_width, target_height);
    let resized = resize_image(img, new_width, new_height)?;

    let mut canvas = RgbImage::from_pixel(target_width, target_height, WHITE);
    let paste_x = (target_width - new_width) / 2;
    let paste_y = (target_height - new_height) / 2;
    imageops::replace(&mut canvas, &resized, paste_x as i64, paste_y as i64);

    Ok(canvas)
}

/// Resize an image to exact dimensions using high-quality algorithm
pub fn resize_image(img: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let (src_width, src_height) = img.dimensions();

    if src_width == width && src_height == height {
        return Ok(img.clone());
    }

    let src_width_nz =
        NonZeroU32::new(src_width).ok_or_else(|| anyhow!("Source width is zero"))?;
    let src_height_nz =
        NonZeroU32::new(src_height).ok_or_else(|| anyhow!("Source height is zero"))?;
    let dst_width_nz = NonZeroU32::new(width).ok_or_else(|| anyhow!("Target width is zero"))?;
    let dst_height_nz =
        NonZeroU32::new(height).ok_or_else(|| anyhow!("Target height is zero"))?;

    let src_image = Image::from_vec_u8(
        src_width_nz.get(),
        src_height_nz.get(),
        img.as_raw().clone(),
        PixelType::U8x3,
    )?;

    let mut dst_image = Image::new(dst_width_nz.get(), dst_height_nz.get(), PixelType::U8x3);

    let mut resizer = Resizer::new();
    resizer.resize(&src_image, &mut dst_image, Some(&ResizeOptions::default()))?;

    RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
        .ok_or_else(|| anyhow!("Resized buffer does not match {}x{}", width, height))
}
