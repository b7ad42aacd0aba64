//! Persisted original <-> hashed filename table
//!
//! The table is a `;`-delimited CSV with an `original_name;new_name` header. It is
//! written once after ingestion and read once before restoration.

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

pub const ORIGINAL_COLUMN: &str = "original_name";
pub const HASHED_COLUMN: &str = "new_name";
const DELIMITER: u8 = b';';

/// One row of the mapping table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub original_name: String,
    #[serde(rename = "new_name")]
    pub hashed_name: String,
}

impl FileRecord {
    pub fn new(original_name: impl Into<String>, hashed_name: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            hashed_name: hashed_name.into(),
        }
    }

    /// Original filename without its extension
    pub fn original_stem(&self) -> &str {
        file_stem(&self.original_name)
    }

    /// Original extension without the dot, if any
    pub fn original_extension(&self) -> Option<&str> {
        Path::new(&self.original_name)
            .extension()
            .and_then(|ext| ext.to_str())
    }

    /// Hashed filename without its extension
    pub fn hashed_stem(&self) -> &str {
        file_stem(&self.hashed_name)
    }
}

fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
}

/// In-memory mapping collected during ingestion
#[derive(Debug, Default)]
pub struct MappingStore {
    records: Vec<FileRecord>,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record. Uniqueness is checked when the table is persisted or loaded.
    pub fn record(&mut self, original_name: impl Into<String>, hashed_name: impl Into<String>) {
        self.records.push(FileRecord::new(original_name, hashed_name));
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hashed names recorded more than once, in first-seen order
    pub fn duplicates(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();

        for record in &self.records {
            if !seen.insert(record.hashed_name.as_str())
                && reported.insert(record.hashed_name.as_str())
            {
                duplicates.push(record.hashed_name.clone());
            }
        }

        duplicates
    }

    /// Write every record, in insertion order, to `path`
    pub fn persist(&self, path: &Path) -> Result<()> {
        let write_error = |source: csv::Error| PipelineError::MappingWrite {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .from_path(path)
            .map_err(write_error)?;

        // Written explicitly so an empty batch still produces a header
        writer
            .write_record([ORIGINAL_COLUMN, HASHED_COLUMN])
            .map_err(write_error)?;
        for record in &self.records {
            writer.serialize(record).map_err(write_error)?;
        }
        writer
            .flush()
            .map_err(|e| write_error(csv::Error::from(e)))?;

        Ok(())
    }

    /// Read a mapping table back into lookup form
    pub fn load(path: &Path) -> Result<Mapping> {
        if !path.is_file() {
            return Err(PipelineError::MissingFile(path.to_path_buf()));
        }

        let read_error = |source: csv::Error| PipelineError::MappingRead {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = ReaderBuilder::new()
            .delimiter(DELIMITER)
            .flexible(true)
            .from_path(path)
            .map_err(read_error)?;

        let headers = reader.headers().map_err(read_error)?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|header| header.trim() == name)
                .ok_or_else(|| PipelineError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name,
                })
        };
        let original_idx = column(ORIGINAL_COLUMN)?;
        let hashed_idx = column(HASHED_COLUMN)?;

        let mut mapping = Mapping::new(path);
        for row in reader.records() {
            let row = row.map_err(read_error)?;
            let line = row.position().map(|pos| pos.line()).unwrap_or_default();

            let original = row.get(original_idx).filter(|value| !value.is_empty());
            let hashed = row.get(hashed_idx).filter(|value| !value.is_empty());

            match (original, hashed) {
                (Some(original), Some(hashed)) => {
                    mapping.insert(FileRecord::new(original, hashed))?;
                }
                (None, _) => mapping.warnings.push(PipelineError::MalformedRow {
                    line,
                    reason: format!("missing {}", ORIGINAL_COLUMN),
                }),
                (_, None) => mapping.warnings.push(PipelineError::MalformedRow {
                    line,
                    reason: format!("missing {}", HASHED_COLUMN),
                }),
            }
        }

        Ok(mapping)
    }
}

/// Mapping loaded from disk, keyed by full hashed filename and by hashed stem
#[derive(Debug)]
pub struct Mapping {
    source: PathBuf,
    records: Vec<FileRecord>,
    by_name: HashMap<String, usize>,
    by_stem: HashMap<String, usize>,
    warnings: Vec<PipelineError>,
}

impl Mapping {
    fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            records: Vec::new(),
            by_name: HashMap::new(),
            by_stem: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    fn insert(&mut self, record: FileRecord) -> Result<()> {
        if let Some(&idx) = self.by_name.get(&record.hashed_name) {
            let existing = &self.records[idx];
            if existing.original_name != record.original_name {
                return Err(PipelineError::DigestCollision {
                    hashed_name: record.hashed_name,
                    first: existing.original_name.clone(),
                    second: record.original_name,
                });
            }
            self.warnings
                .push(PipelineError::DuplicateRecord(record.hashed_name));
            return Ok(());
        }

        let stem = record.hashed_stem().to_string();
        if let Some(&idx) = self.by_stem.get(&stem) {
            let existing = &self.records[idx];
            if existing.original_name != record.original_name {
                return Err(PipelineError::DigestCollision {
                    hashed_name: stem,
                    first: existing.original_name.clone(),
                    second: record.original_name,
                });
            }
        }

        let idx = self.records.len();
        self.by_name.insert(record.hashed_name.clone(), idx);
        self.by_stem.entry(stem).or_insert(idx);
        self.records.push(record);
        Ok(())
    }

    /// Path the mapping was loaded from
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn get_by_name(&self, hashed_name: &str) -> Option<&FileRecord> {
        self.by_name.get(hashed_name).map(|&idx| &self.records[idx])
    }

    pub fn get_by_stem(&self, stem: &str) -> Option<&FileRecord> {
        self.by_stem.get(stem).map(|&idx| &self.records[idx])
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows skipped or collapsed while loading
    pub fn warnings(&self) -> &[PipelineError] {
        &self.warnings
    }
}
