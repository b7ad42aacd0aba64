use serde::Serialize;
use std::path::Path;

use super::{
    ensure_dir, list_files, move_file, require_dir, FileEntry, FileFailure, Stage, StageOptions,
};
use crate::error::{PipelineError, Result};
use crate::mapping::{FileRecord, MappingStore};
use crate::report::{Reporter, StageSummary};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreSummary {
    /// Files moved into the final directory under their original names
    pub moved: usize,
    /// Files whose key has no mapping entry
    pub unresolved: usize,
    /// Files left in place because the destination already existed
    pub conflicts: usize,
    /// Rows skipped or collapsed while loading the mapping
    pub mapping_warnings: usize,
    pub failures: Vec<FileFailure>,
}

impl StageSummary for RestoreSummary {
    fn stage(&self) -> Stage {
        Stage::Restore
    }

    fn counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("moved", self.moved),
            ("unresolved", self.unresolved),
            ("conflicts", self.conflicts),
            ("mapping warnings", self.mapping_warnings),
            ("failed", self.failures.len()),
        ]
    }

    fn failures(&self) -> &[FileFailure] {
        &self.failures
    }
}

/// Name a processed file gets back: the original stem with the processed extension
pub fn restored_name(record: &FileRecord, entry: &FileEntry) -> String {
    let extension = entry
        .extension
        .as_deref()
        .or_else(|| record.original_extension());

    match extension {
        Some(ext) => format!("{}.{}", record.original_stem(), ext),
        None => record.original_stem().to_string(),
    }
}

/// Move every file of `processed_dir` into `final_dir` under its original name.
///
/// Both the processed directory and the mapping file are checked before anything
/// is moved. Files without a mapping entry stay where they are.
pub fn restore(
    processed_dir: &Path,
    final_dir: &Path,
    mapping_path: &Path,
    options: StageOptions,
    reporter: &Reporter,
) -> Result<RestoreSummary> {
    require_dir(processed_dir)?;
    if !mapping_path.is_file() {
        return Err(PipelineError::MissingFile(mapping_path.to_path_buf()));
    }

    let mapping = MappingStore::load(mapping_path)?;
    let files = list_files(processed_dir)?;
    let mut progress = reporter.start_stage(Stage::Restore, files.len());
    progress.verbose(format!(
        "Loaded {} mapping entries from {}",
        mapping.len(),
        mapping.source().display()
    ));

    let mut summary = RestoreSummary {
        mapping_warnings: mapping.warnings().len(),
        ..Default::default()
    };
    for warning in mapping.warnings() {
        progress.warn(warning);
    }

    if !options.dry_run {
        match ensure_dir(final_dir) {
            Ok(true) => progress.verbose(format!("Created directory: {}", final_dir.display())),
            Ok(false) => {}
            Err(e) => {
                progress.abandon();
                return Err(e);
            }
        }
    }

    for path in &files {
        let Some(entry) = FileEntry::from_path(path) else {
            let failure = FileFailure::new(path, "file name is not valid UTF-8");
            progress.failed(path, &failure.reason);
            summary.failures.push(failure);
            continue;
        };

        let Some(record) = mapping.get_by_stem(&entry.key) else {
            summary.unresolved += 1;
            progress.warn(format!("No mapping entry for {}", entry.file_name()));
            progress.skipped(path, "no mapping entry");
            continue;
        };

        let destination = final_dir.join(restored_name(record, &entry));
        if destination.exists() && !options.force {
            summary.conflicts += 1;
            progress.skipped(
                path,
                format!("{} already exists", destination.display()),
            );
            continue;
        }

        if !options.dry_run {
            if let Err(e) = move_file(path, &destination) {
                progress.failed(path, &e);
                summary.failures.push(FileFailure::new(path, e));
                continue;
            }
        }

        summary.moved += 1;
        progress.completed(path, &destination);
    }

    progress.finish(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{hash_name, hashed_file_name};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Dirs {
        _root: TempDir,
        processed: PathBuf,
        final_dir: PathBuf,
        mapping: PathBuf,
    }

    fn setup(originals: &[&str]) -> Dirs {
        let root = TempDir::new().unwrap();
        let processed = root.path().join("out");
        let final_dir = root.path().join("final");
        let mapping = root.path().join("mapping.csv");
        fs::create_dir(&processed).unwrap();

        let mut store = MappingStore::new();
        for original in originals {
            store.record(*original, hashed_file_name(original));
        }
        store.persist(&mapping).unwrap();

        Dirs {
            _root: root,
            processed,
            final_dir,
            mapping,
        }
    }

    fn run(dirs: &Dirs, options: StageOptions) -> Result<RestoreSummary> {
        restore(
            &dirs.processed,
            &dirs.final_dir,
            &dirs.mapping,
            options,
            &Reporter::silent(),
        )
    }

    #[test]
    fn test_restored_name_uses_processed_extension() {
        let record = FileRecord::new("photo.png", format!("{}.png", hash_name("photo.png")));

        let same = FileEntry::from_path(Path::new("x_final.png")).unwrap();
        assert_eq!(restored_name(&record, &same), "photo.png");

        let changed = FileEntry::from_path(Path::new("x_final.JPG")).unwrap();
        assert_eq!(restored_name(&record, &changed), "photo.jpg");

        let bare = FileEntry::from_path(Path::new("x_final")).unwrap();
        assert_eq!(restored_name(&record, &bare), "photo.png");
    }

    #[test]
    fn test_restore_tagged_file_round_trip() {
        let dirs = setup(&["photo.png"]);
        let processed = dirs
            .processed
            .join(format!("{}_final.png", hash_name("photo.png")));
        fs::write(&processed, b"pixels").unwrap();

        let summary = run(&dirs, StageOptions::default()).unwrap();

        assert_eq!(summary.moved, 1);
        assert_eq!(summary.unresolved, 0);
        assert!(!processed.exists());
        assert_eq!(fs::read(dirs.final_dir.join("photo.png")).unwrap(), b"pixels");
    }

    #[test]
    fn test_restore_untagged_file_with_format_change() {
        let dirs = setup(&["photo.png"]);
        fs::write(
            dirs.processed.join(format!("{}.jpg", hash_name("photo.png"))),
            b"jpeg",
        )
        .unwrap();

        let summary = run(&dirs, StageOptions::default()).unwrap();

        assert_eq!(summary.moved, 1);
        assert!(dirs.final_dir.join("photo.jpg").exists());
        assert!(!dirs.final_dir.join("photo.png").exists());
    }

    #[test]
    fn test_restore_keeps_dots_in_original_stem() {
        let dirs = setup(&["holiday.2023.png"]);
        fs::write(
            dirs.processed
                .join(format!("{}_final.png", hash_name("holiday.2023.png"))),
            b"x",
        )
        .unwrap();

        run(&dirs, StageOptions::default()).unwrap();
        assert!(dirs.final_dir.join("holiday.2023.png").exists());
    }

    #[test]
    fn test_restore_leaves_unknown_files_in_place() {
        let dirs = setup(&["photo.png"]);
        let stray = dirs.processed.join("deadbeef_final.png");
        fs::write(&stray, b"x").unwrap();

        let summary = run(&dirs, StageOptions::default()).unwrap();

        assert_eq!(summary.moved, 0);
        assert_eq!(summary.unresolved, 1);
        assert!(stray.exists());
    }

    #[test]
    fn test_restore_conflict_skips_unless_forced() {
        let dirs = setup(&["photo.png"]);
        let processed = dirs
            .processed
            .join(format!("{}_final.png", hash_name("photo.png")));
        fs::write(&processed, b"new").unwrap();
        fs::create_dir(&dirs.final_dir).unwrap();
        fs::write(dirs.final_dir.join("photo.png"), b"old").unwrap();

        let summary = run(&dirs, StageOptions::default()).unwrap();
        assert_eq!(summary.conflicts, 1);
        assert_eq!(summary.moved, 0);
        assert!(processed.exists());
        assert_eq!(fs::read(dirs.final_dir.join("photo.png")).unwrap(), b"old");

        let forced = StageOptions {
            force: true,
            ..Default::default()
        };
        let summary = run(&dirs, forced).unwrap();
        assert_eq!(summary.moved, 1);
        assert_eq!(fs::read(dirs.final_dir.join("photo.png")).unwrap(), b"new");
    }

    #[test]
    fn test_restore_missing_mapping_moves_nothing() {
        let dirs = setup(&["photo.png"]);
        let processed = dirs
            .processed
            .join(format!("{}_final.png", hash_name("photo.png")));
        fs::write(&processed, b"x").unwrap();
        fs::remove_file(&dirs.mapping).unwrap();

        let err = run(&dirs, StageOptions::default()).unwrap_err();

        assert!(matches!(err, PipelineError::MissingFile(_)));
        assert!(processed.exists());
        assert!(!dirs.final_dir.exists());
    }

    #[test]
    fn test_restore_missing_processed_dir() {
        let dirs = setup(&["photo.png"]);
        fs::remove_dir(&dirs.processed).unwrap();

        let err = run(&dirs, StageOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_restore_counts_malformed_rows() {
        let dirs = setup(&[]);
        let hashed = hashed_file_name("b.jpg");
        fs::write(
            &dirs.mapping,
            format!("original_name;new_name\na.png;\nb.jpg;{}\n", hashed),
        )
        .unwrap();
        fs::write(
            dirs.processed.join(format!("{}_final.png", hash_name("b.jpg"))),
            b"x",
        )
        .unwrap();

        let summary = run(&dirs, StageOptions::default()).unwrap();

        assert_eq!(summary.mapping_warnings, 1);
        assert_eq!(summary.moved, 1);
        assert!(dirs.final_dir.join("b.png").exists());
    }

    #[test]
    fn test_restore_dry_run_moves_nothing() {
        let dirs = setup(&["photo.png"]);
        let processed = dirs
            .processed
            .join(format!("{}_final.png", hash_name("photo.png")));
        fs::write(&processed, b"x").unwrap();

        let summary = run(
            &dirs,
            StageOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(summary.moved, 1);
        assert!(processed.exists());
        assert!(!dirs.final_dir.exists());
    }

    #[test]
    fn test_restore_move_failure_does_not_stop_batch() {
        let dirs = setup(&["photo.png", "other.png"]);
        let blocked = dirs
            .processed
            .join(format!("{}_final.png", hash_name("photo.png")));
        fs::write(&blocked, b"photo").unwrap();
        fs::write(
            dirs.processed
                .join(format!("{}_final.png", hash_name("other.png"))),
            b"other",
        )
        .unwrap();
        // A directory in place of the restored file makes that one move fail
        fs::create_dir_all(dirs.final_dir.join("photo.png")).unwrap();

        let summary = run(
            &dirs,
            StageOptions {
                force: true,
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(summary.moved, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].file, blocked);
        assert!(blocked.exists());
        assert_eq!(fs::read(dirs.final_dir.join("other.png")).unwrap(), b"other");
    }
}
