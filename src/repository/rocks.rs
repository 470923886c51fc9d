use super::{Flavor, Repository};
use crate::error::RepoError;
use crate::model::Snapshot;
use rocksdb::{Options, DB};
use std::path::Path;
use tracing::{debug, trace};

/// Replace-in-place store: one RocksDB value per scanned path.
///
/// A single `put` swaps the whole bincode-encoded snapshot, so a reader sees
/// either the previous value or the new one.
pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    pub fn open(path: &str) -> Result<Self, RepoError> {
        debug!("Using '{}' for snapshot store", path);

        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        let db = DB::open(&db_options, path).map_err(|e| {
            RepoError::ConnectionFailure(format!("Failed to open RocksDB store {}: {}", path, e))
        })?;
        Ok(RocksStore { db })
    }

    fn key(scanned_path: &Path) -> Vec<u8> {
        scanned_path.to_string_lossy().into_owned().into_bytes()
    }
}

impl Repository for RocksStore {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    fn flavor(&self) -> Flavor {
        Flavor::ReplaceInPlace
    }

    fn write(&self, _snapshot: &Snapshot) -> Result<(), RepoError> {
        Err(RepoError::Unimplemented {
            backend: self.name(),
            operation: "write",
        })
    }

    fn replace(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        if snapshot.scanned_path.as_os_str().is_empty() {
            return Err(RepoError::SchemaViolation(
                "scanned path must not be empty".to_string(),
            ));
        }
        let value = bincode::serialize(snapshot)
            .map_err(|e| RepoError::SchemaViolation(format!("Serialize error: {}", e)))?;
        self.db
            .put(Self::key(&snapshot.scanned_path), value)
            .map_err(|e| RepoError::ConnectionFailure(e.to_string()))?;
        trace!(
            "Replaced {} records for {}",
            snapshot.records.len(),
            snapshot.scanned_path.display()
        );
        Ok(())
    }

    fn clear(&self, scanned_path: &Path) -> Result<(), RepoError> {
        self.db
            .delete(Self::key(scanned_path))
            .map_err(|e| RepoError::ConnectionFailure(e.to_string()))
    }

    fn read(&self, scanned_path: &Path) -> Result<Snapshot, RepoError> {
        match self.db.get(Self::key(scanned_path)) {
            Ok(Some(value)) => bincode::deserialize(&value)
                .map_err(|e| RepoError::SchemaViolation(format!("Deserialize error: {}", e))),
            Ok(None) => Err(RepoError::NotFound(scanned_path.to_path_buf())),
            Err(e) => Err(RepoError::ConnectionFailure(e.to_string())),
        }
    }

    fn history(&self, _scanned_path: &Path) -> Result<Vec<Snapshot>, RepoError> {
        Err(RepoError::Unimplemented {
            backend: self.name(),
            operation: "history",
        })
    }
}
