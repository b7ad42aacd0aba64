use anyhow::{Context, Result as AnyResult};
use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use strum_macros::{Display, EnumString};

use super::{list_files, require_dir, FileFailure, Stage, StageOptions};
use crate::error::Result;
use crate::report::{Reporter, StageSummary};
use crate::utils::{display_name, has_valid_extension};

/// Extensions the normalizer knows how to decode
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "tiff", "bmp"];

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Single output format for the final directory
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    ValueEnum,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    #[default]
    Jpg,
    Png,
    Bmp,
}

impl TargetFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TargetFormat::Jpg => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::Bmp => "bmp",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            TargetFormat::Jpg => ImageFormat::Jpeg,
            TargetFormat::Png => ImageFormat::Png,
            TargetFormat::Bmp => ImageFormat::Bmp,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizeSummary {
    pub converted: usize,
    /// Files with an extension the normalizer does not handle
    pub unsupported: usize,
    /// Files whose output name was taken by another file
    pub conflicts: usize,
    pub failures: Vec<FileFailure>,
}

impl StageSummary for NormalizeSummary {
    fn stage(&self) -> Stage {
        Stage::Normalize
    }

    fn counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("converted", self.converted),
            ("unsupported", self.unsupported),
            ("conflicts", self.conflicts),
            ("failed", self.failures.len()),
        ]
    }

    fn failures(&self) -> &[FileFailure] {
        &self.failures
    }
}

/// Re-encode every supported image in `dir` into `target`, replacing the source file.
pub fn normalize_to_single_format(
    dir: &Path,
    target: TargetFormat,
    jpeg_quality: u8,
    options: StageOptions,
    reporter: &Reporter,
) -> Result<NormalizeSummary> {
    require_dir(dir)?;

    let files = list_files(dir)?;
    // Exact names present in `dir`, kept current as files are written and removed
    let mut names: HashSet<String> = files
        .iter()
        .map(|path| display_name(path).to_string())
        .collect();

    let mut progress = reporter.start_stage(Stage::Normalize, files.len());
    let mut summary = NormalizeSummary::default();

    for path in &files {
        if !has_valid_extension(path, SUPPORTED_EXTENSIONS) {
            summary.unsupported += 1;
            progress.skipped(path, "unsupported format");
            continue;
        }

        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            let failure = FileFailure::new(path, "file name is not valid UTF-8");
            progress.failed(path, &failure.reason);
            summary.failures.push(failure);
            continue;
        };

        let source_name = display_name(path).to_string();
        let output_name = format!("{}.{}", stem, target.extension());
        let output_path = dir.join(&output_name);

        if output_name != source_name && names.contains(&output_name) && !options.force {
            summary.conflicts += 1;
            progress.skipped(path, format!("{} already exists", output_name));
            continue;
        }

        if !options.dry_run {
            if let Err(e) = convert_in_place(path, &output_path, target, jpeg_quality) {
                progress.failed(path, format!("{:#}", e));
                summary.failures.push(FileFailure::new(path, format!("{:#}", e)));
                continue;
            }
        }

        if output_name != source_name {
            names.remove(&source_name);
        }
        names.insert(output_name);
        summary.converted += 1;
        progress.completed(path, &output_path);
    }

    progress.finish(&summary);
    Ok(summary)
}

/// Decode `source` and write it as `output`, removing `source` when the names differ.
///
/// The encoded image goes to a temporary sibling first, so a failed encode never
/// leaves a truncated output behind.
fn convert_in_place(
    source: &Path,
    output: &Path,
    target: TargetFormat,
    jpeg_quality: u8,
) -> AnyResult<()> {
    let img = ImageReader::open(source)
        .with_context(|| format!("Failed to open {}", source.display()))?
        .with_guessed_format()
        .with_context(|| format!("Failed to read {}", source.display()))?
        .decode()
        .with_context(|| format!("Failed to decode {}", source.display()))?;

    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".normalize-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        encode(&img, &mut writer, target, jpeg_quality)
            .with_context(|| format!("Failed to encode {}", display_name(output)))?;
        writer.flush()?;
    }

    tmp.persist(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    // On a case-insensitive filesystem a case-only rename leaves `source` naming the
    // file just written
    if source != output && !is_same_file(source, output)? {
        fs::remove_file(source)
            .with_context(|| format!("Failed to remove {}", source.display()))?;
    }

    Ok(())
}

/// True when both paths resolve to the same directory entry
fn is_same_file(a: &Path, b: &Path) -> AnyResult<bool> {
    let (Ok(a_meta), Ok(b_meta)) = (fs::metadata(a), fs::metadata(b)) else {
        return Ok(false);
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(a_meta.dev() == b_meta.dev() && a_meta.ino() == b_meta.ino())
    }

    #[cfg(not(unix))]
    {
        let _ = (a_meta, b_meta);
        Ok(fs::canonicalize(a)? == fs::canonicalize(b)?)
    }
}

fn encode<W: Write + std::io::Seek>(
    img: &DynamicImage,
    writer: &mut W,
    target: TargetFormat,
    jpeg_quality: u8,
) -> image::ImageResult<()> {
    match target {
        TargetFormat::Jpg => {
            let encoder = JpegEncoder::new_with_quality(writer, jpeg_quality.clamp(1, 100));
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        TargetFormat::Png => img.write_to(writer, ImageFormat::Png),
        TargetFormat::Bmp => DynamicImage::ImageRgb8(img.to_rgb8()).write_to(writer, ImageFormat::Bmp),
    }
}
