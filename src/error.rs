use std::path::PathBuf;
use thiserror::Error;

use crate::stages::Stage;

/// How a failure affects the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the affected stage before or instead of doing its work
    Structural,
    /// One item failed, the batch continues
    PerFile,
    /// Reported, never aborts
    Integrity,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Directory does not exist or is not a directory: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("Mapping file does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Mapping file {} has no `{column}` column", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("Incomplete mapping row at line {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    #[error("Hashed name '{hashed_name}' maps to both '{first}' and '{second}'")]
    DigestCollision {
        hashed_name: String,
        first: String,
        second: String,
    },

    #[error("Hashed name '{0}' is recorded more than once")]
    DuplicateRecord(String),

    #[error("Failed to read mapping file {}: {source}", path.display())]
    MappingRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to write mapping file {}: {source}", path.display())]
    MappingWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn in_stage(self, stage: Stage) -> Self {
        PipelineError::StageFailed {
            stage,
            source: Box::new(self),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            PipelineError::DirectoryNotFound(_)
            | PipelineError::MissingFile(_)
            | PipelineError::MissingColumn { .. }
            | PipelineError::DigestCollision { .. }
            | PipelineError::MappingRead { .. }
            | PipelineError::MappingWrite { .. } => Severity::Structural,
            PipelineError::MalformedRow { .. } | PipelineError::DuplicateRecord(_) => {
                Severity::Integrity
            }
            PipelineError::Io { .. } => Severity::PerFile,
            PipelineError::StageFailed { source, .. } => source.severity(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
