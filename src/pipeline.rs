//! Sequential driver for the four stages
//!
//! A run moves through `Pending -> Ingested -> Processed -> Restored -> Normalized`.
//! The first structural error stops the run and is returned tagged with the stage
//! that raised it; per-file problems only show up in the stage summaries.

use anyhow::Result as AnyResult;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use strum_macros::Display;

use crate::error::Result;
use crate::image_processing::crop::HeadAndNeckMargins;
use crate::image_processing::cutout::{CommandBackgroundRemover, DEFAULT_REMOVER_COMMAND};
use crate::image_processing::face::{ScriptFaceLocator, DEFAULT_MIN_CONFIDENCE};
use crate::image_processing::{
    PortraitProcessor, ProcessingConfig, DEFAULT_TARGET_HEIGHT, DEFAULT_TARGET_WIDTH,
};
use crate::report::{Reporter, StageSummary};
use crate::stages::normalize::DEFAULT_JPEG_QUALITY;
use crate::stages::{
    ingest, normalize_to_single_format, process, restore, IngestSummary, NormalizeSummary,
    ProcessSummary, RestoreSummary, Stage, StageOptions, TargetFormat,
};

pub const DEFAULT_MAPPING_FILE: &str = "mapping.csv";
pub const DEFAULT_FACE_SCRIPT: &str = "scripts/find_face.py";
pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// External programs used by the processing stage
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    pub python: String,
    pub face_script: PathBuf,
    pub min_confidence: f32,
    /// Background removal command line, image on stdin and cutout on stdout
    pub remover: String,
    pub timeout: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            python: DEFAULT_PYTHON.to_string(),
            face_script: PathBuf::from(DEFAULT_FACE_SCRIPT),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            remover: DEFAULT_REMOVER_COMMAND.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Everything a run needs to know, resolved from CLI, config file and defaults
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub intermediate_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub final_dir: PathBuf,
    /// File name of the mapping inside the intermediate directory
    pub mapping_file: String,
    /// Explicit mapping location for restore and lookup
    pub mapping_path: Option<PathBuf>,
    pub target_width: u32,
    pub target_height: u32,
    pub target_format: TargetFormat,
    pub jpeg_quality: u8,
    pub detection: DetectionConfig,
    pub debug_dir: Option<PathBuf>,
    pub dry_run: bool,
    pub force: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            intermediate_dir: PathBuf::from("intermediate"),
            processed_dir: PathBuf::from("out"),
            final_dir: PathBuf::from("final"),
            mapping_file: DEFAULT_MAPPING_FILE.to_string(),
            mapping_path: None,
            target_width: DEFAULT_TARGET_WIDTH,
            target_height: DEFAULT_TARGET_HEIGHT,
            target_format: TargetFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            detection: DetectionConfig::default(),
            debug_dir: None,
            dry_run: false,
            force: false,
        }
    }
}

impl PipelineConfig {
    /// Mapping file the restore stage and lookup read
    pub fn mapping_path(&self) -> PathBuf {
        self.mapping_path
            .clone()
            .unwrap_or_else(|| self.intermediate_dir.join(&self.mapping_file))
    }

    pub fn options(&self) -> StageOptions {
        StageOptions {
            dry_run: self.dry_run,
            force: self.force,
        }
    }

    pub fn processing_config(&self) -> ProcessingConfig {
        ProcessingConfig {
            target_width: self.target_width,
            target_height: self.target_height,
            margins: HeadAndNeckMargins::default(),
            debug_dir: self.debug_dir.clone(),
        }
    }

    /// Processor wired to the configured face script and background remover.
    /// The script is only required to exist when files will actually be processed.
    pub fn build_processor(&self) -> AnyResult<PortraitProcessor> {
        let detection = &self.detection;
        let locator = ScriptFaceLocator::new(
            detection.python.clone(),
            &detection.face_script,
            detection.min_confidence,
            detection.timeout,
        );
        if !self.dry_run {
            locator.verify()?;
        }
        let remover = CommandBackgroundRemover::new(&detection.remover, detection.timeout)?;

        Ok(PortraitProcessor::new(
            self.processing_config(),
            Box::new(locator),
            Box::new(remover),
        ))
    }
}

/// How far a run got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Pending,
    Ingested,
    Processed,
    Restored,
    Normalized,
}

impl PipelineState {
    /// Stage that moves the run out of this state
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Pending => Some(Stage::Ingest),
            PipelineState::Ingested => Some(Stage::Process),
            PipelineState::Processed => Some(Stage::Restore),
            PipelineState::Restored => Some(Stage::Normalize),
            PipelineState::Normalized => None,
        }
    }
}

/// Summaries of every stage that ran
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub ingest: Option<IngestSummary>,
    pub process: Option<ProcessSummary>,
    pub restore: Option<RestoreSummary>,
    pub normalize: Option<NormalizeSummary>,
}

impl Default for PipelineReport {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineReport {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Pending,
            ingest: None,
            process: None,
            restore: None,
            normalize: None,
        }
    }

    pub fn summaries(&self) -> Vec<&dyn StageSummary> {
        let mut summaries: Vec<&dyn StageSummary> = Vec::new();
        if let Some(summary) = &self.ingest {
            summaries.push(summary);
        }
        if let Some(summary) = &self.process {
            summaries.push(summary);
        }
        if let Some(summary) = &self.restore {
            summaries.push(summary);
        }
        if let Some(summary) = &self.normalize {
            summaries.push(summary);
        }
        summaries
    }

    /// Total per-file failures across all stages
    pub fn failure_count(&self) -> usize {
        self.summaries().iter().map(|s| s.failures().len()).sum()
    }
}

pub struct Pipeline<'a> {
    config: PipelineConfig,
    processor: PortraitProcessor,
    reporter: &'a Reporter,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: PipelineConfig, processor: PortraitProcessor, reporter: &'a Reporter) -> Self {
        Self {
            config,
            processor,
            reporter,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage in order
    pub fn run(&self) -> Result<PipelineReport> {
        let mut report = PipelineReport::new();
        while self.step(&mut report)?.is_some() {}
        Ok(report)
    }

    /// Run the stage that follows `report.state`, returning it, or `None` once the run
    /// is complete. On error `report.state` is left at the last completed stage.
    pub fn step(&self, report: &mut PipelineReport) -> Result<Option<Stage>> {
        let Some(stage) = report.state.next_stage() else {
            return Ok(None);
        };
        self.advance(stage, report)
            .map_err(|e| e.in_stage(stage))?;
        Ok(Some(stage))
    }

    fn advance(&self, stage: Stage, report: &mut PipelineReport) -> Result<()> {
        let config = &self.config;
        let options = config.options();

        match stage {
            Stage::Ingest => {
                report.ingest = Some(ingest(
                    &config.source_dir,
                    &config.intermediate_dir,
                    &config.mapping_file,
                    options,
                    self.reporter,
                )?);
                report.state = PipelineState::Ingested;
            }
            Stage::Process => {
                report.process = Some(process(
                    &config.intermediate_dir,
                    &config.processed_dir,
                    &self.processor,
                    options,
                    self.reporter,
                )?);
                report.state = PipelineState::Processed;
            }
            Stage::Restore => {
                report.restore = Some(restore(
                    &config.processed_dir,
                    &config.final_dir,
                    &config.mapping_path(),
                    options,
                    self.reporter,
                )?);
                report.state = PipelineState::Restored;
            }
            Stage::Normalize => {
                report.normalize = Some(normalize_to_single_format(
                    &config.final_dir,
                    config.target_format,
                    config.jpeg_quality,
                    options,
                    self.reporter,
                )?);
                report.state = PipelineState::Normalized;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, Severity};
    use crate::image_processing::testing::{centre_face, processor, FixedLocator};
    use image::{Rgb, RgbImage};
    use std::fs;
    use tempfile::TempDir;

    fn config_in(root: &TempDir) -> PipelineConfig {
        PipelineConfig {
            source_dir: root.path().join("src"),
            intermediate_dir: root.path().join("intermediate"),
            processed_dir: root.path().join("out"),
            final_dir: root.path().join("final"),
            target_width: 32,
            target_height: 30,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.source_dir, PathBuf::from("src"));
        assert_eq!(config.processed_dir, PathBuf::from("out"));
        assert_eq!((config.target_width, config.target_height), (1600, 1500));
        assert_eq!(config.target_format, TargetFormat::Jpg);
        assert_eq!(
            config.mapping_path(),
            PathBuf::from("intermediate").join("mapping.csv")
        );
        assert_eq!(config.detection.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_build_processor_needs_script_unless_dry_run() {
        let mut config = PipelineConfig::default();
        config.detection.face_script = PathBuf::from("/nonexistent/find_face.py");
        assert!(config.build_processor().is_err());

        config.dry_run = true;
        assert!(config.build_processor().is_ok());
    }

    #[test]
    fn test_explicit_mapping_path_wins() {
        let config = PipelineConfig {
            mapping_path: Some(PathBuf::from("/tmp/names.csv")),
            ..Default::default()
        };
        assert_eq!(config.mapping_path(), PathBuf::from("/tmp/names.csv"));
    }

    fn source_with_portrait(config: &PipelineConfig) {
        fs::create_dir(&config.source_dir).unwrap();
        RgbImage::from_pixel(60, 80, Rgb([200, 180, 160]))
            .save(config.source_dir.join("anna.png"))
            .unwrap();
    }

    #[test]
    fn test_step_walks_states_in_order() {
        let root = TempDir::new().unwrap();
        let config = config_in(&root);
        source_with_portrait(&config);

        let reporter = Reporter::silent();
        let pipeline = Pipeline::new(
            config,
            processor(FixedLocator(Some(centre_face())), 32, 30),
            &reporter,
        );
        let mut report = PipelineReport::new();

        let mut visited = Vec::new();
        while let Some(stage) = pipeline.step(&mut report).unwrap() {
            visited.push((stage, report.state));
        }

        assert_eq!(
            visited,
            vec![
                (Stage::Ingest, PipelineState::Ingested),
                (Stage::Process, PipelineState::Processed),
                (Stage::Restore, PipelineState::Restored),
                (Stage::Normalize, PipelineState::Normalized),
            ]
        );
        assert!(pipeline.step(&mut report).unwrap().is_none());
    }

    #[test]
    fn test_failed_stage_keeps_last_completed_state() {
        let root = TempDir::new().unwrap();
        let config = config_in(&root);
        source_with_portrait(&config);

        let reporter = Reporter::silent();
        let pipeline = Pipeline::new(
            config.clone(),
            processor(FixedLocator(Some(centre_face())), 32, 30),
            &reporter,
        );
        let mut report = PipelineReport::new();

        // Process fails once the intermediate directory is gone
        pipeline.step(&mut report).unwrap();
        let backup = root.path().join("intermediate.bak");
        fs::rename(&config.intermediate_dir, &backup).unwrap();
        let err = pipeline.step(&mut report).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed {
                stage: Stage::Process,
                ..
            }
        ));
        assert_eq!(report.state, PipelineState::Ingested);
        fs::rename(&backup, &config.intermediate_dir).unwrap();

        // Restore fails without the mapping file
        pipeline.step(&mut report).unwrap();
        let mapping = config.mapping_path();
        let saved = fs::read(&mapping).unwrap();
        fs::remove_file(&mapping).unwrap();
        let err = pipeline.step(&mut report).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed {
                stage: Stage::Restore,
                ..
            }
        ));
        assert_eq!(report.state, PipelineState::Processed);
        fs::write(&mapping, saved).unwrap();

        // Normalize fails once the final directory is gone
        pipeline.step(&mut report).unwrap();
        fs::remove_dir_all(&config.final_dir).unwrap();
        let err = pipeline.step(&mut report).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed {
                stage: Stage::Normalize,
                ..
            }
        ));
        assert_eq!(report.state, PipelineState::Restored);
    }

    #[test]
    fn test_full_run_restores_original_names() {
        let root = TempDir::new().unwrap();
        let config = config_in(&root);
        fs::create_dir(&config.source_dir).unwrap();
        RgbImage::from_pixel(60, 80, Rgb([200, 180, 160]))
            .save(config.source_dir.join("anna.png"))
            .unwrap();
        RgbImage::from_pixel(80, 60, Rgb([20, 40, 60]))
            .save(config.source_dir.join("jan.jpg"))
            .unwrap();

        let reporter = Reporter::silent();
        let pipeline = Pipeline::new(
            config.clone(),
            processor(FixedLocator(Some(centre_face())), 32, 30),
            &reporter,
        );
        let report = pipeline.run().unwrap();

        assert_eq!(report.state, PipelineState::Normalized);
        assert_eq!(report.ingest.as_ref().unwrap().copied, 2);
        assert_eq!(report.process.as_ref().unwrap().processed, 2);
        assert_eq!(report.restore.as_ref().unwrap().moved, 2);
        assert_eq!(report.normalize.as_ref().unwrap().converted, 2);
        assert_eq!(report.failure_count(), 0);
        assert_eq!(report.summaries().len(), 4);

        let mut names: Vec<_> = fs::read_dir(&config.final_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["anna.jpg", "jan.jpg"]);

        let portrait = image::open(config.final_dir.join("anna.jpg")).unwrap();
        assert_eq!((portrait.width(), portrait.height()), (32, 30));
        // Sources are never touched
        assert!(config.source_dir.join("anna.png").exists());
    }

    #[test]
    fn test_missing_source_stops_run_at_ingest() {
        let root = TempDir::new().unwrap();
        let reporter = Reporter::silent();
        let pipeline = Pipeline::new(
            config_in(&root),
            processor(FixedLocator(None), 32, 30),
            &reporter,
        );

        let err = pipeline.run().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::StageFailed {
                stage: Stage::Ingest,
                ..
            }
        ));
        assert_eq!(err.severity(), Severity::Structural);
    }

    #[test]
    fn test_no_faces_still_completes() {
        let root = TempDir::new().unwrap();
        let config = config_in(&root);
        fs::create_dir(&config.source_dir).unwrap();
        RgbImage::new(10, 10)
            .save(config.source_dir.join("empty.png"))
            .unwrap();

        let reporter = Reporter::silent();
        let report = Pipeline::new(config, processor(FixedLocator(None), 32, 30), &reporter)
            .run()
            .unwrap();

        assert_eq!(report.state, PipelineState::Normalized);
        assert_eq!(report.process.as_ref().unwrap().no_face, 1);
        assert_eq!(report.restore.as_ref().unwrap().moved, 0);
    }
}
