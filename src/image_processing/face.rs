use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use super::external::run_with_timeout;

/// Default minimum detection confidence passed to the face script
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.4;

/// Face bounding box relative to the image size, every value in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    /// Build a box from `[x, y, width, height]`, clamping it into the unit square
    pub fn from_relative(values: [f32; 4]) -> Option<Self> {
        let [x, y, width, height] = values;
        if values.iter().any(|v| !v.is_finite()) || width <= 0.0 || height <= 0.0 {
            return None;
        }

        let x0 = x.clamp(0.0, 1.0);
        let y0 = y.clamp(0.0, 1.0);
        let x1 = (x + width).clamp(0.0, 1.0);
        let y1 = (y + height).clamp(0.0, 1.0);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    /// Box in pixels as `(x, y, width, height)` for an image of the given size
    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> (i64, i64, i64, i64) {
        let iw = image_width as f32;
        let ih = image_height as f32;
        (
            (self.x * iw).round() as i64,
            (self.y * ih).round() as i64,
            (self.width * iw).round() as i64,
            (self.height * ih).round() as i64,
        )
    }
}

/// Finds the most prominent face in an image
pub trait FaceLocator {
    fn locate(&self, img: &RgbImage) -> Result<Option<FaceBox>>;
}

/// JSON printed by the face script
#[derive(Debug, Deserialize)]
struct ScriptResult {
    #[serde(rename = "box")]
    bounding_box: Option<[f32; 4]>,
    #[serde(default)]
    error: Option<String>,
}

/// Face locator backed by a Python script
///
/// The script is invoked as `<python> <script> --image <png> --min-confidence <f>` and
/// prints `{"box": [x, y, w, h]}` with relative coordinates, or `{"box": null}`
/// when no face was found.
pub struct ScriptFaceLocator {
    python: String,
    script_path: PathBuf,
    min_confidence: f32,
    timeout: Duration,
}

impl ScriptFaceLocator {
    pub fn new(
        python: impl Into<String>,
        script_path: &Path,
        min_confidence: f32,
        timeout: Duration,
    ) -> Self {
        Self {
            python: python.into(),
            script_path: script_path.to_path_buf(),
            min_confidence,
            timeout,
        }
    }

    /// Fail early when the script is missing, before any image is handed to it
    pub fn verify(&self) -> Result<()> {
        if !self.script_path.is_file() {
            return Err(anyhow!(
                "Face detection script not found: {}",
                self.script_path.display()
            ));
        }
        Ok(())
    }
}

impl FaceLocator for ScriptFaceLocator {
    fn locate(&self, img: &RgbImage) -> Result<Option<FaceBox>> {
        let temp = tempfile::Builder::new()
            .prefix("face_input_")
            .suffix(".png")
            .tempfile()
            .context("Failed to create temporary image")?;
        img.save_with_format(temp.path(), image::ImageFormat::Png)
            .context("Failed to write temporary image")?;

        let mut command = Command::new(&self.python);
        command
            .arg(&self.script_path)
            .arg("--image")
            .arg(temp.path())
            .arg("--min-confidence")
            .arg(self.min_confidence.to_string());

        let output = run_with_timeout(command, None, self.timeout)?;
        parse_script_output(&output.stdout)
    }
}

fn parse_script_output(stdout: &[u8]) -> Result<Option<FaceBox>> {
    let stdout = String::from_utf8_lossy(stdout);
    let result: ScriptResult = serde_json::from_str(stdout.trim()).map_err(|e| {
        anyhow!(
            "Failed to parse face script output: {} | Raw output: {}",
            e,
            stdout.trim()
        )
    })?;

    if let Some(error) = result.error {
        return Err(anyhow!("Face detection failed: {}", error));
    }

    Ok(result.bounding_box.and_then(FaceBox::from_relative))
}
