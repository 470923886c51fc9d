use super::{check_snapshot_keys, Flavor, Repository};
use crate::error::RepoError;
use crate::model::Snapshot;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Append-only log kept in process memory. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    entries: Arc<Mutex<Vec<Snapshot>>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Snapshot>>, RepoError> {
        self.entries
            .lock()
            .map_err(|e| RepoError::ConnectionFailure(format!("Failed to lock memory log: {}", e)))
    }
}

impl Repository for MemoryLog {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn flavor(&self) -> Flavor {
        Flavor::AppendOnly
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        check_snapshot_keys(snapshot)?;
        self.lock()?.push(snapshot.clone());
        Ok(())
    }

    fn replace(&self, _snapshot: &Snapshot) -> Result<(), RepoError> {
        Err(RepoError::Unimplemented {
            backend: self.name(),
            operation: "replace",
        })
    }

    fn clear(&self, scanned_path: &Path) -> Result<(), RepoError> {
        self.lock()?
            .retain(|snapshot| snapshot.scanned_path != scanned_path);
        Ok(())
    }

    fn read(&self, scanned_path: &Path) -> Result<Snapshot, RepoError> {
        let entries = self.lock()?;
        entries
            .iter()
            .rev()
            .find(|snapshot| snapshot.scanned_path == scanned_path)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(scanned_path.to_path_buf()))
    }

    fn history(&self, scanned_path: &Path) -> Result<Vec<Snapshot>, RepoError> {
        let entries = self.lock()?;
        Ok(entries
            .iter()
            .filter(|snapshot| snapshot.scanned_path == scanned_path)
            .cloned()
            .collect())
    }
}
