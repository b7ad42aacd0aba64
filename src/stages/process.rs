use serde::Serialize;
use std::path::Path;

use super::{ensure_dir, list_files, require_dir, FileEntry, FileFailure, Stage, StageOptions, StageTag};
use crate::error::Result;
use crate::image_processing::{PortraitOutcome, PortraitProcessor};
use crate::report::{Reporter, StageSummary};
use crate::utils::has_valid_extension;

/// Extensions picked up from the intermediate directory
pub const INPUT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Extension of every processed portrait
pub const OUTPUT_EXTENSION: &str = "png";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessSummary {
    pub processed: usize,
    /// Images in which no face was found
    pub no_face: usize,
    /// Images whose output already existed
    pub already_processed: usize,
    pub failures: Vec<FileFailure>,
}

impl StageSummary for ProcessSummary {
    fn stage(&self) -> Stage {
        Stage::Process
    }

    fn counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("processed", self.processed),
            ("no face", self.no_face),
            ("already processed", self.already_processed),
            ("failed", self.failures.len()),
        ]
    }

    fn failures(&self) -> &[FileFailure] {
        &self.failures
    }
}

/// Produce a `<key>_final.png` portrait in `processed_dir` for every image in
/// `intermediate_dir`.
pub fn process(
    intermediate_dir: &Path,
    processed_dir: &Path,
    processor: &PortraitProcessor,
    options: StageOptions,
    reporter: &Reporter,
) -> Result<ProcessSummary> {
    require_dir(intermediate_dir)?;

    let files: Vec<_> = list_files(intermediate_dir)?
        .into_iter()
        .filter(|path| has_valid_extension(path, INPUT_EXTENSIONS))
        .collect();
    let mut progress = reporter.start_stage(Stage::Process, files.len());

    if !options.dry_run {
        match ensure_dir(processed_dir) {
            Ok(true) => progress.verbose(format!("Created directory: {}", processed_dir.display())),
            Ok(false) => {}
            Err(e) => {
                progress.abandon();
                return Err(e);
            }
        }
    }

    let config = processor.config();
    progress.verbose(format!(
        "Target size: {}x{}",
        config.target_width, config.target_height
    ));

    let mut summary = ProcessSummary::default();

    for path in &files {
        let Some(input) = FileEntry::from_path(path) else {
            let failure = FileFailure::new(path, "file name is not valid UTF-8");
            progress.failed(path, &failure.reason);
            summary.failures.push(failure);
            continue;
        };

        let output = FileEntry::tagged(processed_dir, &input.key, StageTag::Final, OUTPUT_EXTENSION);
        if output.path.exists() && !options.force {
            summary.already_processed += 1;
            progress.skipped(path, format!("{} already exists", output.file_name()));
            continue;
        }

        if options.dry_run {
            summary.processed += 1;
            progress.completed(path, &output.path);
            continue;
        }

        match processor.process_file(path, &output.path, &input.key) {
            Ok(PortraitOutcome::Written {
                face,
                region,
                orientation,
                debug_path,
            }) => {
                let rotated = if orientation.swaps_dimensions() {
                    " (width and height swapped)"
                } else {
                    ""
                };
                progress.verbose(format!(
                    "{}: orientation {:?}{}, face at ({:.3}, {:.3}) {:.3}x{:.3}, crop {}x{}+{}+{}",
                    input.file_name(),
                    orientation,
                    rotated,
                    face.x,
                    face.y,
                    face.width,
                    face.height,
                    region.width,
                    region.height,
                    region.x,
                    region.y
                ));
                if let Some(debug_path) = debug_path {
                    progress.verbose(format!("Debug overlay: {}", debug_path.display()));
                }
                summary.processed += 1;
                progress.completed(path, &output.path);
            }
            Ok(PortraitOutcome::NoFace) => {
                summary.no_face += 1;
                progress.skipped(path, "no face found");
            }
            Err(e) => {
                let reason = format!("{:#}", e);
                progress.failed(path, &reason);
                summary.failures.push(FileFailure::new(path, reason));
            }
        }
    }

    progress.finish(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::image_processing::testing::{
        centre_face, processor, processor_with_remover, FailingLocator, FixedLocator, OpaqueRemover,
    };
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    fn intermediate_with(names: &[&str]) -> TempDir {
        let root = TempDir::new().unwrap();
        let intermediate = root.path().join("intermediate");
        fs::create_dir(&intermediate).unwrap();
        for name in names {
            RgbImage::from_pixel(40, 40, Rgb([120, 90, 60]))
                .save(intermediate.join(name))
                .unwrap();
        }
        root
    }

    #[test]
    fn test_process_writes_tagged_png() {
        let root = intermediate_with(&["abc.jpg", "def.png"]);
        fs::write(root.path().join("intermediate").join("mapping.csv"), b"x").unwrap();
        let out = root.path().join("out");

        let summary = process(
            &root.path().join("intermediate"),
            &out,
            &processor(FixedLocator(Some(centre_face())), 32, 30),
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap();

        assert_eq!(summary.processed, 2);
        assert!(summary.failures.is_empty());
        assert!(out.join("abc_final.png").exists());
        assert!(out.join("def_final.png").exists());
        // The mapping file is not an image input
        assert_eq!(fs::read_dir(&out).unwrap().count(), 2);
    }

    #[test]
    fn test_process_counts_images_without_face() {
        let root = intermediate_with(&["abc.png"]);
        let out = root.path().join("out");

        let summary = process(
            &root.path().join("intermediate"),
            &out,
            &processor(FixedLocator(None), 32, 30),
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.no_face, 1);
        assert!(!out.join("abc_final.png").exists());
    }

    #[test]
    fn test_process_failure_does_not_stop_batch() {
        let root = intermediate_with(&["good.png"]);
        let intermediate = root.path().join("intermediate");
        fs::write(intermediate.join("broken.jpg"), b"not a jpeg").unwrap();
        let out = root.path().join("out");

        let summary = process(
            &intermediate,
            &out,
            &processor(FixedLocator(Some(centre_face())), 32, 30),
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file, intermediate.join("broken.jpg"));
    }

    #[test]
    fn test_process_locator_errors_are_per_file() {
        let root = intermediate_with(&["a.png", "b.png"]);

        let summary = process(
            &root.path().join("intermediate"),
            &root.path().join("out"),
            &processor(FailingLocator, 32, 30),
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap();

        assert_eq!(summary.failures.len(), 2);
    }

    #[test]
    fn test_process_skips_existing_output_unless_forced() {
        let root = intermediate_with(&["abc.png"]);
        let out = root.path().join("out");
        fs::create_dir(&out).unwrap();
        fs::write(out.join("abc_final.png"), b"old").unwrap();
        let processor = processor(FixedLocator(Some(centre_face())), 32, 30);

        let summary = process(
            &root.path().join("intermediate"),
            &out,
            &processor,
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap();
        assert_eq!(summary.already_processed, 1);
        assert_eq!(fs::read(out.join("abc_final.png")).unwrap(), b"old");

        let summary = process(
            &root.path().join("intermediate"),
            &out,
            &processor,
            StageOptions {
                force: true,
                ..Default::default()
            },
            &Reporter::silent(),
        )
        .unwrap();
        assert_eq!(summary.processed, 1);
        assert!(image::open(out.join("abc_final.png")).is_ok());
    }

    #[test]
    fn test_process_missing_intermediate_dir() {
        let root = TempDir::new().unwrap();
        let err = process(
            &root.path().join("intermediate"),
            &root.path().join("out"),
            &processor(FixedLocator(None), 32, 30),
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap_err();

        assert!(matches!(err, PipelineError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_process_calls_remover_only_when_face_found() {
        let root = intermediate_with(&["abc.png"]);
        let intermediate = root.path().join("intermediate");

        let remover = OpaqueRemover::default();
        process(
            &intermediate,
            &root.path().join("out-none"),
            &processor_with_remover(FixedLocator(None), remover.clone(), 32, 30),
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap();
        assert_eq!(remover.calls.get(), 0);

        let remover = OpaqueRemover::default();
        process(
            &intermediate,
            &root.path().join("out-face"),
            &processor_with_remover(FixedLocator(Some(centre_face())), remover.clone(), 32, 30),
            StageOptions::default(),
            &Reporter::silent(),
        )
        .unwrap();
        assert_eq!(remover.calls.get(), 1);
    }

    #[test]
    fn test_process_dry_run_runs_no_collaborators() {
        let root = intermediate_with(&["abc.png"]);
        let out = root.path().join("out");

        let remover = OpaqueRemover::default();
        let summary = process(
            &root.path().join("intermediate"),
            &out,
            &processor_with_remover(FailingLocator, remover.clone(), 32, 30),
            StageOptions {
                dry_run: true,
                ..Default::default()
            },
            &Reporter::silent(),
        )
        .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(remover.calls.get(), 0);
        assert!(!out.exists());
    }
}
