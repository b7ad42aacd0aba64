//! JSON output for machine consumers
//!
//! When --json-progress is enabled, every stage event is emitted as one JSON
//! object per line on stdout and all other output is suppressed.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pipeline::{PipelineReport, PipelineState};
use crate::report::StageSummary;
use crate::stages::Stage;

/// Last progress emission timestamp (milliseconds since epoch)
/// Used for throttling progress updates to ~25 FPS (40ms between updates)
static LAST_PROGRESS_MS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// A stage began working on `total` files
    StageStarted { stage: Stage, total: usize },
    /// Progress update
    Progress {
        stage: Stage,
        current: usize,
        total: usize,
        message: String,
    },
    /// File handled successfully
    FileCompleted {
        stage: Stage,
        input_path: String,
        output_path: String,
    },
    /// File left untouched
    FileSkipped {
        stage: Stage,
        input_path: String,
        reason: String,
    },
    /// File processing failed
    FileFailed {
        stage: Stage,
        input_path: String,
        error: String,
    },
    /// Integrity warning not tied to a single file outcome
    Warning { stage: Stage, message: String },
    /// End-of-stage counts
    StageSummary {
        stage: Stage,
        counts: BTreeMap<&'static str, usize>,
    },
    /// End-of-run report for `--report`
    PipelineReport {
        state: PipelineState,
        failures: usize,
        stages: Vec<StageCounts>,
    },
}

/// Counts of one stage inside a pipeline report
#[derive(Debug, Serialize)]
pub struct StageCounts {
    pub stage: Stage,
    pub counts: BTreeMap<&'static str, usize>,
}

impl JsonMessage {
    /// Emit JSON message to stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Create and emit progress message (throttled to ~25 FPS)
    ///
    /// The final progress (current == total) is always emitted.
    pub fn progress(stage: Stage, current: usize, total: usize, message: impl Into<String>) {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let last_ms = LAST_PROGRESS_MS.load(Ordering::Relaxed);

        if now_ms.saturating_sub(last_ms) >= 40 || current == total {
            LAST_PROGRESS_MS.store(now_ms, Ordering::Relaxed);
            Self::Progress {
                stage,
                current,
                total,
                message: message.into(),
            }
            .emit();
        }
    }

    pub fn file_completed(stage: Stage, input_path: &Path, output_path: &Path) {
        Self::FileCompleted {
            stage,
            input_path: input_path.display().to_string(),
            output_path: output_path.display().to_string(),
        }
        .emit();
    }

    pub fn file_skipped(stage: Stage, input_path: &Path, reason: impl Into<String>) {
        Self::FileSkipped {
            stage,
            input_path: input_path.display().to_string(),
            reason: reason.into(),
        }
        .emit();
    }

    pub fn file_failed(stage: Stage, input_path: &Path, error: impl Into<String>) {
        Self::FileFailed {
            stage,
            input_path: input_path.display().to_string(),
            error: error.into(),
        }
        .emit();
    }

    pub fn pipeline_report(report: &PipelineReport) {
        Self::from_report(report).emit();
    }

    fn from_report(report: &PipelineReport) -> Self {
        Self::PipelineReport {
            state: report.state,
            failures: report.failure_count(),
            stages: report
                .summaries()
                .iter()
                .map(|summary| StageCounts {
                    stage: summary.stage(),
                    counts: summary.counts().into_iter().collect(),
                })
                .collect(),
        }
    }

    pub fn summary(stage: Stage, counts: &[(&'static str, usize)]) {
        Self::StageSummary {
            stage,
            counts: counts.iter().copied().collect(),
        }
        .emit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_tagged_snake_case() {
        let message = JsonMessage::FileSkipped {
            stage: Stage::Restore,
            input_path: "out/abc_final.png".to_string(),
            reason: "no mapping entry".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "file_skipped");
        assert_eq!(json["stage"], "restore");
        assert_eq!(json["input_path"], "out/abc_final.png");
    }

    #[test]
    fn test_summary_counts_serialize_as_object() {
        let message = JsonMessage::StageSummary {
            stage: Stage::Ingest,
            counts: [("copied", 2), ("failed", 0)].into_iter().collect(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(
            json,
            r#"{"type":"stage_summary","stage":"ingest","counts":{"copied":2,"failed":0}}"#
        );
    }

    #[test]
    fn test_pipeline_report_message() {
        let report = PipelineReport::new();
        let json = serde_json::to_value(JsonMessage::from_report(&report)).unwrap();
        assert_eq!(json["type"], "pipeline_report");
        assert_eq!(json["state"], "pending");
        assert_eq!(json["failures"], 0);
        assert_eq!(json["stages"], serde_json::json!([]));

        let mut report = PipelineReport::new();
        report.state = PipelineState::Ingested;
        report.ingest = Some(crate::stages::IngestSummary {
            copied: 2,
            ..Default::default()
        });
        let json = serde_json::to_value(JsonMessage::from_report(&report)).unwrap();
        assert_eq!(json["state"], "ingested");
        assert_eq!(json["stages"][0]["stage"], "ingest");
        assert_eq!(json["stages"][0]["counts"]["copied"], 2);
    }
}
