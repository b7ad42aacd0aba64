use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::stages::TargetFormat;

#[derive(Parser, Debug)]
#[command(
    name = "portrait-pipeline",
    version,
    about = "Batch portrait pipeline: anonymise, crop, cut out and restore photo names",
    long_about = "
Portrait Pipeline

Turns a directory of photos into uniformly framed head-and-neck portraits on a white
background. Files are copied under SHA-256 names before processing, so external tools
never see personal file names, and are given their original names back at the end.

Stages:
  ingest     src -> intermediate, hashed names, writes mapping.csv
  process    intermediate -> out, face crop + background removal + letterbox
  restore    out -> final, original names from mapping.csv
  normalize  final, single output format

Example Usage:
  # Full run with the default directories (src, intermediate, out, final)
  portrait-pipeline run

  # Custom size and PNG output
  portrait-pipeline -s 800x1000 --format png run

  # Individual stages
  portrait-pipeline --source ~/Photos ingest
  portrait-pipeline --face-script ./scripts/find_face.py process
  portrait-pipeline restore --dry-run

  # Find the original name of a processed file
  portrait-pipeline lookup 3f1c...e9_final.png

  # Machine-readable progress
  portrait-pipeline --json-progress run"
)]
pub struct Args {
    /// JSON configuration file (command-line options take precedence)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Directory with the original photos [default: src]
    #[arg(long = "source", value_name = "DIR", global = true)]
    pub source_dir: Option<PathBuf>,

    /// Directory for hashed copies and the mapping file [default: intermediate]
    #[arg(long = "intermediate", value_name = "DIR", global = true)]
    pub intermediate_dir: Option<PathBuf>,

    /// Directory for processed portraits [default: out]
    #[arg(long = "processed", value_name = "DIR", global = true)]
    pub processed_dir: Option<PathBuf>,

    /// Directory for restored portraits [default: final]
    #[arg(long = "final", value_name = "DIR", global = true)]
    pub final_dir: Option<PathBuf>,

    /// Mapping file name inside the intermediate directory [default: mapping.csv]
    #[arg(long = "mapping-file", value_name = "NAME", global = true)]
    pub mapping_file: Option<String>,

    /// Explicit mapping file location for restore and lookup
    #[arg(long = "mapping", value_name = "PATH", global = true)]
    pub mapping_path: Option<PathBuf>,

    /// Portrait size (format: WIDTHxHEIGHT) [default: 1600x1500]
    #[arg(
        short = 's',
        long = "size",
        value_name = "WIDTHxHEIGHT",
        value_parser = parse_size,
        global = true
    )]
    pub size: Option<(u32, u32)>,

    /// Output format of the final directory [default: jpg]
    #[arg(long = "format", value_name = "FORMAT", global = true)]
    pub format: Option<TargetFormat>,

    /// JPEG quality 1-100 [default: 90]
    #[arg(
        long = "jpeg-quality",
        value_name = "N",
        value_parser = clap::value_parser!(u8).range(1..=100),
        global = true
    )]
    pub jpeg_quality: Option<u8>,

    /// Face detection script [default: scripts/find_face.py]
    #[arg(long = "face-script", value_name = "FILE", global = true)]
    pub face_script: Option<PathBuf>,

    /// Python interpreter used for the face script [default: python3]
    #[arg(long = "python", value_name = "BIN", global = true)]
    pub python: Option<String>,

    /// Background removal command, image on stdin and PNG cutout on stdout [default: "rembg i"]
    #[arg(long = "remover", value_name = "CMD", global = true)]
    pub remover: Option<String>,

    /// Minimum face detection confidence 0.0-1.0 [default: 0.4]
    #[arg(long = "min-confidence", value_name = "F", global = true)]
    pub min_confidence: Option<f32>,

    /// Timeout for each external command in seconds [default: 120]
    #[arg(long = "timeout", value_name = "SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Write face and crop overlays into this directory
    #[arg(long = "debug-dir", value_name = "DIR", global = true)]
    pub debug_dir: Option<PathBuf>,

    /// Enable verbose output with detailed progress information
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Emit progress as JSON lines instead of human-readable output
    #[arg(long = "json-progress", global = true)]
    pub json_progress: bool,

    /// Show what a stage would do without touching any file
    #[arg(long = "dry-run", global = true)]
    pub dry_run: bool,

    /// Overwrite existing destination files
    #[arg(long = "force", global = true)]
    pub force: bool,

    /// After `run`, print a table with the results of every stage
    /// (a `pipeline_report` JSON line with --json-progress)
    #[arg(long = "report", global = true)]
    pub report: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Copy source photos into the intermediate directory under hashed names
    Ingest,
    /// Crop, cut out and letterbox every hashed photo
    Process,
    /// Move processed portraits to the final directory under their original names
    Restore,
    /// Convert every image in the final directory to a single format
    Normalize,
    /// Run all four stages in order
    Run,
    /// Find the original name for a hashed or processed file name
    Lookup {
        /// Hashed file name, digest or processed file name
        #[arg(value_name = "NAME", required_unless_present = "all")]
        name: Option<String>,

        /// Print the whole mapping table
        #[arg(long = "all", conflicts_with = "name")]
        all: bool,
    },
}

impl Args {
    /// Reject option combinations that cannot work together
    pub fn validate(&self) -> Result<(), String> {
        if self.dry_run && self.command == Commands::Run {
            return Err(
                "--dry-run is not supported with `run`: later stages need the files earlier stages write"
                    .to_string(),
            );
        }

        if let Some(confidence) = self.min_confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(format!(
                    "Invalid --min-confidence {}. Use a value between 0.0 and 1.0",
                    confidence
                ));
            }
        }

        if self.timeout_secs == Some(0) {
            return Err("--timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Parse a size string such as `1600x1500` into width and height
pub fn parse_size(size: &str) -> Result<(u32, u32), String> {
    let parts: Vec<&str> = size.trim().split(['x', 'X']).collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid size format '{}'. Use WIDTHxHEIGHT (e.g., 1600x1500)",
            size
        ));
    }

    let width = parts[0]
        .parse::<u32>()
        .map_err(|_| format!("Invalid width: '{}'", parts[0]))?;
    let height = parts[1]
        .parse::<u32>()
        .map_err(|_| format!("Invalid height: '{}'", parts[1]))?;

    if width == 0 || height == 0 {
        return Err("Width and height must be greater than 0".to_string());
    }

    if width > 10000 || height > 10000 {
        return Err("Width and height must be at most 10000 pixels".to_string());
    }

    Ok((width, height))
}
