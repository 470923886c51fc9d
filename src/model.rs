use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};

/// One direct child of the scanned directory.
///
/// Names and paths are stored lossily as UTF-8, and timestamps as
/// `DateTime<Utc>`, so any entry the filesystem can hold (including
/// pre-1970 mtimes) can be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub full_path: String,
    /// Owner lookup is platform-dependent and not resolved; always empty.
    pub owner_user: String,
    pub mode: String,
    pub size_bytes: i64,
    pub is_regular_file: bool,
    pub modified_at: DateTime<Utc>,
}

/// The result of one scan cycle, before it is handed to a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub reporter_identity: String,
    #[serde(serialize_with = "serialize_path_lossy")]
    pub scanned_path: PathBuf,
    pub records: Vec<FileRecord>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn build(
        reporter_identity: &str,
        scanned_path: &Path,
        records: Vec<FileRecord>,
    ) -> Snapshot {
        Snapshot::build_at(reporter_identity, scanned_path, records, Utc::now())
    }

    pub fn build_at(
        reporter_identity: &str,
        scanned_path: &Path,
        records: Vec<FileRecord>,
        captured_at: DateTime<Utc>,
    ) -> Snapshot {
        Snapshot {
            reporter_identity: reporter_identity.to_string(),
            scanned_path: scanned_path.to_path_buf(),
            records,
            captured_at,
        }
    }

    pub fn file_names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.name.clone()).collect()
    }

    pub fn total_bytes(&self) -> i64 {
        self.records
            .iter()
            .filter(|r| r.is_regular_file)
            .map(|r| r.size_bytes)
            .sum()
    }
}

fn serialize_path_lossy<S: Serializer>(path: &Path, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&path.to_string_lossy())
}
