// Library exports shared by the binary and the tests
pub mod cli;
pub mod config_file;
pub mod error;
pub mod hasher;
pub mod image_processing;
pub mod json_output;
pub mod lookup;
pub mod mapping;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod utils;

// Re-export commonly used types
pub use error::{PipelineError, Severity};
pub use image_processing::{PortraitOutcome, PortraitProcessor, ProcessingConfig};
pub use json_output::JsonMessage;
pub use mapping::{FileRecord, Mapping, MappingStore};
pub use pipeline::{Pipeline, PipelineConfig, PipelineReport, PipelineState};
pub use stages::{Stage, TargetFormat};
