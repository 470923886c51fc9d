mod mode;

pub use mode::mode_string;

use crate::error::ScanError;
use crate::model::FileRecord;
use chrono::{DateTime, Utc};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List the direct children of `dir` and capture their metadata.
///
/// No recursion and no symlink following: each entry is described by its
/// own `lstat`. The call is all-or-nothing; an entry that disappears
/// between the listing and the metadata read fails the whole extraction.
pub fn extract(dir: &Path) -> Result<Vec<FileRecord>, ScanError> {
    let entries = fs::read_dir(dir).map_err(|source| ScanError::DirectoryUnavailable {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for entry_result in entries {
        let entry = entry_result.map_err(|source| ScanError::EntryUnreadable {
            path: dir.to_path_buf(),
            source,
        })?;

        let record = describe_entry(entry.path(), entry.metadata())?;
        debug!(
            "Found entry {} ({} bytes, {})",
            record.name, record.size_bytes, record.mode
        );
        records.push(record);
    }

    Ok(records)
}

fn describe_entry(path: PathBuf, metadata: io::Result<Metadata>) -> Result<FileRecord, ScanError> {
    let unreadable = |source| ScanError::EntryUnreadable {
        path: path.clone(),
        source,
    };
    let metadata = metadata.map_err(unreadable)?;
    let modified_at = metadata.modified().map_err(unreadable)?;

    Ok(FileRecord {
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        full_path: path.to_string_lossy().into_owned(),
        owner_user: String::new(),
        mode: mode_string(&metadata),
        size_bytes: i64::try_from(metadata.len()).unwrap_or(i64::MAX),
        is_regular_file: metadata.file_type().is_file(),
        modified_at: DateTime::<Utc>::from(modified_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_extract_counts_files_and_directories() {
        let tmp = tempdir().unwrap();
        for name in ["file1.txt", "file2.log", "file3.dat"] {
            fs::write(tmp.path().join(name), "test content").unwrap();
        }
        fs::create_dir(tmp.path().join("subdir")).unwrap();
        fs::create_dir(tmp.path().join("other")).unwrap();
        // Grandchildren must not be listed.
        fs::write(tmp.path().join("subdir").join("nested.txt"), "nested").unwrap();

        let records = extract(tmp.path()).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records.iter().filter(|r| r.is_regular_file).count(), 3);
        assert!(records.iter().all(|r| r.name != "nested.txt"));

        for record in &records {
            assert!(!record.name.is_empty());
            assert!(!record.name.contains('/'));
            assert_eq!(
                record.full_path,
                tmp.path().join(&record.name).to_string_lossy()
            );
            assert!(record.size_bytes >= 0);
            assert!(record.owner_user.is_empty());
        }
    }

    #[test]
    fn test_extract_nonexistent_directory() {
        let tmp = tempdir().unwrap();
        let missing = tmp.path().join("does-not-exist");

        let err = extract(&missing).unwrap_err();
        assert!(matches!(err, ScanError::DirectoryUnavailable { ref path, .. } if *path == missing));
    }

    #[test]
    fn test_extract_file_instead_of_directory() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("plain.txt");
        fs::write(&file, "not a dir").unwrap();

        let err = extract(&file).unwrap_err();
        assert!(matches!(err, ScanError::DirectoryUnavailable { .. }));
    }

    #[test]
    fn test_extract_empty_directory() {
        let tmp = tempdir().unwrap();
        let records = extract(tmp.path()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_extract_regular_file_metadata() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("a.txt"), vec![b'a'; 100]).unwrap();

        let records = extract(tmp.path()).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "a.txt");
        assert_eq!(record.size_bytes, 100);
        assert!(record.is_regular_file);
        assert!(record.mode.starts_with('-'));
        assert!(record.modified_at.timestamp() > 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_does_not_follow_symlinks() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("target.txt"), "target").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("target.txt"), tmp.path().join("link"))
            .unwrap();

        let records = extract(tmp.path()).unwrap();
        let link = records.iter().find(|r| r.name == "link").unwrap();
        assert!(!link.is_regular_file);
        assert!(link.mode.starts_with('L'));
    }

    #[test]
    fn test_unreadable_metadata_is_entry_unreadable() {
        let path = PathBuf::from("/mnt/data/vanished.txt");
        let failure = io::Error::new(io::ErrorKind::NotFound, "removed after listing");

        let err = describe_entry(path.clone(), Err(failure)).unwrap_err();
        match err {
            ScanError::EntryUnreadable { path: reported, source } => {
                assert_eq!(reported, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("expected EntryUnreadable, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_fails_on_unsearchable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().unwrap();
        let locked = tmp.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::write(locked.join("a.txt"), "a").unwrap();
        // Listable but not searchable: names come back, lstat is denied.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o400)).unwrap();

        let bypassed = fs::symlink_metadata(locked.join("a.txt")).is_ok();
        let result = extract(&locked);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        // Permission checks do not apply to root.
        if bypassed {
            return;
        }
        let err = result.unwrap_err();
        assert!(
            matches!(err, ScanError::EntryUnreadable { ref path, .. } if *path == locked.join("a.txt"))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_keeps_non_utf8_names_and_pre_epoch_mtimes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        use std::time::{Duration, UNIX_EPOCH};

        let tmp = tempdir().unwrap();
        let odd = tmp.path().join(OsStr::from_bytes(b"bad\xff.txt"));
        fs::write(&odd, "x").unwrap();
        let old = tmp.path().join("old.txt");
        fs::write(&old, "y").unwrap();
        fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(UNIX_EPOCH - Duration::from_secs(86_400))
            .unwrap();

        let records = extract(tmp.path()).unwrap();
        assert_eq!(records.len(), 2);

        let odd_record = records.iter().find(|r| r.name.starts_with("bad")).unwrap();
        assert_eq!(odd_record.name, "bad\u{FFFD}.txt");
        assert!(odd_record.full_path.ends_with("bad\u{FFFD}.txt"));

        let old_record = records.iter().find(|r| r.name == "old.txt").unwrap();
        assert_eq!(old_record.modified_at.timestamp(), -86_400);
    }
}
