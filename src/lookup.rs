use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::hasher::DIGEST_LEN;
use crate::mapping::{FileRecord, Mapping};
use crate::stages::FileEntry;

fn digest_regex() -> Option<&'static Regex> {
    static DIGEST: OnceLock<Option<Regex>> = OnceLock::new();
    DIGEST
        .get_or_init(|| Regex::new(&format!("^[0-9a-f]{{{}}}$", DIGEST_LEN)).ok())
        .as_ref()
}

/// True when `value` looks like a hex digest produced by the hasher
pub fn looks_like_digest(value: &str) -> bool {
    digest_regex().is_some_and(|re| re.is_match(value))
}

/// Find the record for a hashed file name, a bare digest or a processed file name
/// such as `<digest>_final.png`.
pub fn lookup<'a>(mapping: &'a Mapping, query: &str) -> Option<&'a FileRecord> {
    let query = query.trim();
    let file_name = Path::new(query)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(query);

    mapping
        .get_by_name(file_name)
        .or_else(|| mapping.get_by_stem(file_name))
        .or_else(|| {
            FileEntry::from_path(Path::new(file_name))
                .and_then(|entry| mapping.get_by_stem(&entry.key))
        })
}
