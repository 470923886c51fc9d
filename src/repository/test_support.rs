use crate::model::{FileRecord, Snapshot};
use chrono::Utc;
use std::path::Path;

/// A snapshot of `path` holding one small regular file per name.
pub(crate) fn make_snapshot(reporter: &str, path: &str, names: &[&str]) -> Snapshot {
    let records = names
        .iter()
        .map(|name| FileRecord {
            name: name.to_string(),
            full_path: format!("{}/{}", path, name),
            owner_user: String::new(),
            mode: "-rw-r--r--".to_string(),
            size_bytes: 10,
            is_regular_file: true,
            modified_at: Utc::now(),
        })
        .collect();
    Snapshot::build(reporter, Path::new(path), records)
}
