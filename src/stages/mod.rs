pub mod ingest;
pub mod normalize;
pub mod process;
pub mod restore;

use filetime::FileTime;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use strum_macros::{Display, EnumString};
use walkdir::WalkDir;

use crate::error::{PipelineError, Result};
use crate::utils::get_file_extension;

pub use ingest::{ingest, IngestSummary};
pub use normalize::{normalize_to_single_format, NormalizeSummary, TargetFormat};
pub use process::{process, ProcessSummary};
pub use restore::{restore, RestoreSummary};

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ingest,
    Process,
    Restore,
    Normalize,
}

/// Marker attached to files produced by the processing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum StageTag {
    Final,
}

impl StageTag {
    pub const ALL: [StageTag; 1] = [StageTag::Final];

    /// Suffix appended to the stem, e.g. `_final`
    pub fn suffix(&self) -> String {
        format!("_{}", self)
    }
}

/// A file inside a stage directory together with its mapping key
///
/// The key is the hashed stem with any stage tag removed. The tag is kept as a
/// field so the name never has to be searched for a tag substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    pub key: String,
    pub tag: Option<StageTag>,
    pub extension: Option<String>,
}

impl FileEntry {
    /// Entry for a file the processing stage is about to write into `dir`
    pub fn tagged(dir: &Path, key: &str, tag: StageTag, extension: &str) -> Self {
        let extension = extension.to_lowercase();
        let path = dir.join(format!("{}{}.{}", key, tag.suffix(), extension));
        Self {
            path,
            key: key.to_string(),
            tag: Some(tag),
            extension: Some(extension),
        }
    }

    /// Rebuild an entry from an existing file.
    ///
    /// A tag is only recognised as a trailing `_<tag>` on the stem.
    pub fn from_path(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?;
        let extension = get_file_extension(path);

        let (key, tag) = StageTag::ALL
            .iter()
            .find_map(|tag| {
                stem.strip_suffix(tag.suffix().as_str())
                    .filter(|key| !key.is_empty())
                    .map(|key| (key, Some(*tag)))
            })
            .unwrap_or((stem, None));

        Some(Self {
            path: path.to_path_buf(),
            key: key.to_string(),
            tag,
            extension,
        })
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
    }
}

/// Behaviour switches shared by the file-moving stages
#[derive(Debug, Clone, Copy, Default)]
pub struct StageOptions {
    /// Report what would happen without touching the filesystem
    pub dry_run: bool,
    /// Overwrite existing destination files
    pub force: bool,
}

/// One file that could not be handled by a stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub reason: String,
}

impl FileFailure {
    pub fn new(file: &Path, reason: impl ToString) -> Self {
        Self {
            file: file.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Fail unless `dir` is an existing directory
pub fn require_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(PipelineError::DirectoryNotFound(dir.to_path_buf()))
    }
}

/// Create `dir` and its parents if needed. Returns true if it was created.
pub fn ensure_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))?;
    Ok(true)
}

/// Regular files directly inside `dir`, sorted by file name.
///
/// Only failing to read `dir` itself is an error. Entries that cannot be
/// resolved, such as dangling symlinks, are left out like any other non-file.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                return Err(PipelineError::io(path, e.into()));
            }
            Err(_) => continue,
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

/// Copy a file and carry over its permissions and timestamps
pub fn copy_preserving_metadata(from: &Path, to: &Path) -> Result<()> {
    fs::copy(from, to).map_err(|e| PipelineError::io(from, e))?;

    let metadata = fs::metadata(from).map_err(|e| PipelineError::io(from, e))?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    filetime::set_file_times(to, atime, mtime).map_err(|e| PipelineError::io(to, e))?;

    Ok(())
}

/// Move a file, falling back to copy and delete across filesystems
pub fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    copy_preserving_metadata(from, to)?;
    fs::remove_file(from).map_err(|e| PipelineError::io(from, e))
}
