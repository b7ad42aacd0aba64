pub mod crop;
pub mod cutout;
pub mod debug;
pub mod external;
pub mod face;
pub mod orientation;
pub mod resize;

use anyhow::{Context, Result};
use image::{ImageFormat, ImageReader, RgbImage};
use std::path::{Path, PathBuf};

use crop::{crop_image, head_and_neck_region, CropRegion, HeadAndNeckMargins};
use cutout::{remove_background, BackgroundRemover};
use face::{FaceBox, FaceLocator};
use orientation::{apply_rotation, read_exif_orientation, ExifOrientation};

pub const DEFAULT_TARGET_WIDTH: u32 = 1600;
pub const DEFAULT_TARGET_HEIGHT: u32 = 1500;

#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    pub target_width: u32,
    pub target_height: u32,
    pub margins: HeadAndNeckMargins,
    /// Write face/crop overlays here when set
    pub debug_dir: Option<PathBuf>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_WIDTH,
            target_height: DEFAULT_TARGET_HEIGHT,
            margins: HeadAndNeckMargins::default(),
            debug_dir: None,
        }
    }
}

/// What happened to one input image
#[derive(Debug, Clone, PartialEq)]
pub enum PortraitOutcome {
    /// The portrait was written to the output path
    Written {
        face: FaceBox,
        region: CropRegion,
        orientation: ExifOrientation,
        debug_path: Option<PathBuf>,
    },
    /// No face was found, nothing was written
    NoFace,
}

/// Face crop, background removal and letterboxing for single images
///
/// The face locator and background remover are injected so the same engine runs
/// against external programs in production and against fakes in tests.
pub struct PortraitProcessor {
    config: ProcessingConfig,
    locator: Box<dyn FaceLocator>,
    remover: Box<dyn BackgroundRemover>,
}

impl PortraitProcessor {
    pub fn new(
        config: ProcessingConfig,
        locator: Box<dyn FaceLocator>,
        remover: Box<dyn BackgroundRemover>,
    ) -> Self {
        Self {
            config,
            locator,
            remover,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Turn `input_path` into a letterboxed white-background portrait at `output_path`
    ///
    /// `key` names the debug overlay when a debug directory is configured.
    pub fn process_file(
        &self,
        input_path: &Path,
        output_path: &Path,
        key: &str,
    ) -> Result<PortraitOutcome> {
        let (img, orientation) = load_upright(input_path)?;

        let Some(face) = self
            .locator
            .locate(&img)
            .with_context(|| format!("Face detection failed for {}", input_path.display()))?
        else {
            return Ok(PortraitOutcome::NoFace);
        };

        let (width, height) = img.dimensions();
        let region = head_and_neck_region(&face, width, height, &self.config.margins)?;

        let debug_path = match &self.config.debug_dir {
            Some(dir) => Some(debug::write_overlay(dir, key, &img, &face, &region)?),
            None => None,
        };

        let portrait = self.render(&img, &region)?;
        portrait
            .save_with_format(output_path, ImageFormat::Png)
            .with_context(|| format!("Failed to save {}", output_path.display()))?;

        Ok(PortraitOutcome::Written {
            face,
            region,
            orientation,
            debug_path,
        })
    }

    /// Crop, cut out and letterbox an upright image
    pub fn render(&self, img: &RgbImage, region: &CropRegion) -> Result<RgbImage> {
        let cropped = crop_image(img, region)?;
        let flattened = remove_background(&cropped, self.remover.as_ref())
            .context("Background removal failed")?;
        resize::letterbox(
            &flattened,
            self.config.target_width,
            self.config.target_height,
        )
    }
}

/// Decode an image and turn it upright according to its EXIF orientation
pub fn load_upright(path: &Path) -> Result<(RgbImage, ExifOrientation)> {
    let img = ImageReader::open(path)
        .with_context(|| format!("Failed to open image: {}", path.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read image: {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode image: {}", path.display()))?
        .to_rgb8();

    let orientation = read_exif_orientation(path).unwrap_or(ExifOrientation::Undefined);
    Ok((apply_rotation(img, orientation), orientation))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Stand-ins for the external collaborators

    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    /// Reports the same face for every image
    pub struct FixedLocator(pub Option<FaceBox>);

    impl FaceLocator for FixedLocator {
        fn locate(&self, _img: &RgbImage) -> Result<Option<FaceBox>> {
            Ok(self.0)
        }
    }

    /// Fails for every image
    pub struct FailingLocator;

    impl FaceLocator for FailingLocator {
        fn locate(&self, _img: &RgbImage) -> Result<Option<FaceBox>> {
            Err(anyhow::anyhow!("detector crashed"))
        }
    }

    /// Returns the input as an opaque PNG and counts calls. Clones share the counter.
    #[derive(Default, Clone)]
    pub struct OpaqueRemover {
        pub calls: Rc<Cell<usize>>,
    }

    impl BackgroundRemover for OpaqueRemover {
        fn cutout(&self, image_bytes: &[u8]) -> Result<Vec<u8>> {
            self.calls.set(self.calls.get() + 1);
            let img = image::load_from_memory(image_bytes)?.to_rgba8();
            let mut out = Vec::new();
            img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
            Ok(out)
        }
    }

    pub fn centre_face() -> FaceBox {
        FaceBox {
            x: 0.4,
            y: 0.4,
            width: 0.2,
            height: 0.2,
        }
    }

    pub fn processor(locator: impl FaceLocator + 'static, width: u32, height: u32) -> PortraitProcessor {
        processor_with_remover(locator, OpaqueRemover::default(), width, height)
    }

    pub fn processor_with_remover(
        locator: impl FaceLocator + 'static,
        remover: OpaqueRemover,
        width: u32,
        height: u32,
    ) -> PortraitProcessor {
        PortraitProcessor::new(
            ProcessingConfig {
                target_width: width,
                target_height: height,
                ..Default::default()
            },
            Box::new(locator),
            Box::new(remover),
        )
    }
}
