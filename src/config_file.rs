use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::{parse_size, Args};
use crate::pipeline::{DetectionConfig, PipelineConfig};
use crate::stages::TargetFormat;

/// JSON configuration file, every key optional
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    pub source_dir: Option<PathBuf>,
    pub intermediate_dir: Option<PathBuf>,
    pub processed_dir: Option<PathBuf>,
    pub final_dir: Option<PathBuf>,
    pub mapping_file: Option<String>,
    pub mapping_path: Option<PathBuf>,
    /// `WIDTHxHEIGHT`
    pub size: Option<String>,
    pub format: Option<TargetFormat>,
    pub jpeg_quality: Option<u8>,
    pub face_script: Option<PathBuf>,
    pub python: Option<String>,
    pub remover: Option<String>,
    pub min_confidence: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub debug_dir: Option<PathBuf>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

impl Args {
    /// Resolve the run configuration: command line first, then the config file, then defaults
    pub fn load_config(&self) -> Result<PipelineConfig> {
        let file = match &self.config_file {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        self.merge_with(file)
    }

    fn merge_with(&self, file: ConfigFile) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();

        let file_size = file
            .size
            .as_deref()
            .map(parse_size)
            .transpose()
            .map_err(|e| anyhow!("Invalid size in config file: {}", e))?;
        let (target_width, target_height) = self
            .size
            .or(file_size)
            .unwrap_or((defaults.target_width, defaults.target_height));

        let jpeg_quality = self
            .jpeg_quality
            .or(file.jpeg_quality)
            .unwrap_or(defaults.jpeg_quality);
        if !(1..=100).contains(&jpeg_quality) {
            return Err(anyhow!(
                "Invalid JPEG quality {}. Use a value between 1 and 100",
                jpeg_quality
            ));
        }

        let min_confidence = self
            .min_confidence
            .or(file.min_confidence)
            .unwrap_or(defaults.detection.min_confidence);
        if !(0.0..=1.0).contains(&min_confidence) {
            return Err(anyhow!(
                "Invalid minimum confidence {}. Use a value between 0.0 and 1.0",
                min_confidence
            ));
        }

        let timeout = match self.timeout_secs.or(file.timeout_secs) {
            Some(0) => return Err(anyhow!("Timeout must be greater than 0")),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.detection.timeout,
        };

        Ok(PipelineConfig {
            source_dir: pick(&self.source_dir, file.source_dir, defaults.source_dir),
            intermediate_dir: pick(
                &self.intermediate_dir,
                file.intermediate_dir,
                defaults.intermediate_dir,
            ),
            processed_dir: pick(&self.processed_dir, file.processed_dir, defaults.processed_dir),
            final_dir: pick(&self.final_dir, file.final_dir, defaults.final_dir),
            mapping_file: pick(&self.mapping_file, file.mapping_file, defaults.mapping_file),
            mapping_path: self.mapping_path.clone().or(file.mapping_path),
            target_width,
            target_height,
            target_format: self
                .format
                .or(file.format)
                .unwrap_or(defaults.target_format),
            jpeg_quality,
            detection: DetectionConfig {
                python: pick(&self.python, file.python, defaults.detection.python),
                face_script: pick(
                    &self.face_script,
                    file.face_script,
                    defaults.detection.face_script,
                ),
                min_confidence,
                remover: pick(&self.remover, file.remover, defaults.detection.remover),
                timeout,
            },
            debug_dir: self.debug_dir.clone().or(file.debug_dir),
            dry_run: self.dry_run,
            force: self.force,
        })
    }
}

fn pick<T: Clone>(cli: &Option<T>, file: Option<T>, default: T) -> T {
    cli.clone().or(file).unwrap_or(default)
}
