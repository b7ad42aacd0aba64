use anyhow::{anyhow, Context, Result};
use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;
use std::process::Command;
use std::time::Duration;

use super::external::{run_with_timeout, split_command_line};

/// Default background removal command, reading an image on stdin and writing a PNG cutout
pub const DEFAULT_REMOVER_COMMAND: &str = "rembg i";

/// Turns an encoded image into an encoded cutout with a transparent background
pub trait BackgroundRemover {
    fn cutout(&self, image_bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Background remover that pipes the image through an external program
pub struct CommandBackgroundRemover {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandBackgroundRemover {
    pub fn new(command_line: &str, timeout: Duration) -> Result<Self> {
        let (program, args) = split_command_line(command_line)
            .ok_or_else(|| anyhow!("Background removal command is empty"))?;
        Ok(Self {
            program,
            args,
            timeout,
        })
    }
}

impl BackgroundRemover for CommandBackgroundRemover {
    fn cutout(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        let output = run_with_timeout(command, Some(image_bytes.to_vec()), self.timeout)?;
        if output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(if stderr.trim().is_empty() {
                anyhow!("{} produced no output", self.program)
            } else {
                anyhow!("{} produced no output: {}", self.program, stderr.trim())
            });
        }
        Ok(output.stdout)
    }
}

/// Cut the subject out of `img` and flatten it onto a white background
pub fn remove_background(img: &RgbImage, remover: &dyn BackgroundRemover) -> Result<RgbImage> {
    let mut encoded = Vec::new();
    img.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .context("Failed to encode crop")?;

    let cutout_bytes = remover.cutout(&encoded)?;
    let cutout = image::load_from_memory(&cutout_bytes)
        .context("Failed to decode background removal output")?
        .to_rgba8();

    Ok(composite_on_white(&cutout))
}

/// Alpha-blend an RGBA image over an opaque white canvas
pub fn composite_on_white(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}
