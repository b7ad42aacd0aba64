use serde::Serialize;
use std::path::{Path, PathBuf};

use super::{
    copy_preserving_metadata, ensure_dir, list_files, require_dir, FileFailure, Stage,
    StageOptions,
};
use crate::error::Result;
use crate::hasher::hashed_file_name;
use crate::mapping::MappingStore;
use crate::report::{Reporter, StageSummary};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    /// Files copied into the intermediate directory
    pub copied: usize,
    /// Files whose hashed copy already existed and was left alone
    pub already_present: usize,
    /// Rows written to the mapping file
    pub records: usize,
    pub mapping_path: PathBuf,
    pub failures: Vec<FileFailure>,
}

impl StageSummary for IngestSummary {
    fn stage(&self) -> Stage {
        Stage::Ingest
    }

    fn counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("copied", self.copied),
            ("already present", self.already_present),
            ("failed", self.failures.len()),
        ]
    }

    fn failures(&self) -> &[FileFailure] {
        &self.failures
    }
}

/// Copy every file of `source_dir` into `intermediate_dir` under its hashed name
/// and persist the name mapping next to the copies.
///
/// Per-file copy failures are reported and counted; only a missing source
/// directory or an unwritable mapping file fail the stage. The mapping is
/// written once, after the whole directory has been scanned.
pub fn ingest(
    source_dir: &Path,
    intermediate_dir: &Path,
    mapping_file_name: &str,
    options: StageOptions,
    reporter: &Reporter,
) -> Result<IngestSummary> {
    require_dir(source_dir)?;

    let files = list_files(source_dir)?;
    let mut progress = reporter.start_stage(Stage::Ingest, files.len());

    if !options.dry_run && ensure_dir(intermediate_dir)? {
        progress.verbose(format!("Created directory: {}", intermediate_dir.display()));
    }

    let mut store = MappingStore::new();
    let mut summary = IngestSummary {
        mapping_path: intermediate_dir.join(mapping_file_name),
        ..Default::default()
    };

    for source_path in &files {
        let Some(original_name) = source_path.file_name().and_then(|name| name.to_str()) else {
            let failure = FileFailure::new(source_path, "file name is not valid UTF-8");
            progress.failed(source_path, &failure.reason);
            summary.failures.push(failure);
            continue;
        };

        let hashed_name = hashed_file_name(original_name);
        let destination = intermediate_dir.join(&hashed_name);

        if destination.exists() && !options.force {
            store.record(original_name, hashed_name.as_str());
            summary.already_present += 1;
            progress.skipped(source_path, format!("{} already present", hashed_name));
            continue;
        }

        if !options.dry_run {
            if let Err(e) = copy_preserving_metadata(source_path, &destination) {
                progress.failed(source_path, &e);
                summary.failures.push(FileFailure::new(source_path, e));
                continue;
            }
        }

        store.record(original_name, hashed_name.as_str());
        summary.copied += 1;
        progress.completed(source_path, &destination);
    }

    for duplicate in store.duplicates() {
        progress.warn(format!("{} recorded more than once", duplicate));
    }
    summary.records = store.len();

    if options.dry_run {
        progress.verbose(format!(
            "Dry run: {} rows would be written to {}",
            summary.records,
            summary.mapping_path.display()
        ));
    } else if let Err(e) = store.persist(&summary.mapping_path) {
        progress.abandon();
        return Err(e);
    } else {
        progress.verbose(format!(
            "Saved mapping to {}",
            summary.mapping_path.display()
        ));
    }

    progress.finish(&summary);
    Ok(summary)
}
