//! Persistence of scan snapshots.
//!
//! Two flavors exist and a deployment runs exactly one of them:
//!
//! - append-only: every snapshot becomes a new entry keyed by reporter,
//!   path and capture time ([`PgEventLog`], [`MemoryLog`]).
//! - replace-in-place: one entry per scanned path, overwritten on every
//!   write ([`RocksStore`]).
//!
//! Every backend implements the whole [`Repository`] trait. Operations a
//! flavor cannot honour return [`RepoError::Unimplemented`] straight away.

pub mod memory;
pub mod pg;
pub mod rocks;
pub mod schema;
#[cfg(test)]
pub(crate) mod test_support;

pub use memory::MemoryLog;
pub use pg::PgEventLog;
pub use rocks::RocksStore;

use crate::config::{AppConfig, Backend};
use crate::error::RepoError;
use crate::model::Snapshot;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    AppendOnly,
    ReplaceInPlace,
}

pub trait Repository: Send + Sync {
    /// Short backend name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn flavor(&self) -> Flavor;

    /// Append `snapshot` as a new historical entry. Never overwrites.
    fn write(&self, snapshot: &Snapshot) -> Result<(), RepoError>;

    /// Atomically supersede whatever is stored for `snapshot.scanned_path`.
    fn replace(&self, snapshot: &Snapshot) -> Result<(), RepoError>;

    /// Remove everything stored for `scanned_path`.
    fn clear(&self, scanned_path: &Path) -> Result<(), RepoError>;

    /// Most recently stored state for `scanned_path`.
    fn read(&self, scanned_path: &Path) -> Result<Snapshot, RepoError>;

    /// Every retained entry for `scanned_path`, oldest first.
    fn history(&self, scanned_path: &Path) -> Result<Vec<Snapshot>, RepoError>;

    /// Store a freshly built snapshot using the backend's own write mode.
    fn persist(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        match self.flavor() {
            Flavor::AppendOnly => self.write(snapshot),
            Flavor::ReplaceInPlace => self.replace(snapshot),
        }
    }
}

impl<R: Repository + ?Sized> Repository for Box<R> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn flavor(&self) -> Flavor {
        (**self).flavor()
    }

    fn write(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        (**self).write(snapshot)
    }

    fn replace(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        (**self).replace(snapshot)
    }

    fn clear(&self, scanned_path: &Path) -> Result<(), RepoError> {
        (**self).clear(scanned_path)
    }

    fn read(&self, scanned_path: &Path) -> Result<Snapshot, RepoError> {
        (**self).read(scanned_path)
    }

    fn history(&self, scanned_path: &Path) -> Result<Vec<Snapshot>, RepoError> {
        (**self).history(scanned_path)
    }

    fn persist(&self, snapshot: &Snapshot) -> Result<(), RepoError> {
        (**self).persist(snapshot)
    }
}

/// Construct the backend selected in `config`. Failing here is a bootstrap
/// error; the caller should exit.
pub fn open_repository(config: &AppConfig) -> Result<Box<dyn Repository>, RepoError> {
    let repo: Box<dyn Repository> = match config.backend {
        Backend::Postgres => Box::new(PgEventLog::connect(&config.database_url())?),
        Backend::RocksDb => Box::new(RocksStore::open(&config.store_path)?),
        Backend::Memory => Box::new(MemoryLog::new()),
    };
    info!(
        "Using {} repository ({:?})",
        repo.name(),
        repo.flavor()
    );
    Ok(repo)
}

/// Snapshots handed to a repository must name both a reporter and a path;
/// the SQL schema enforces the same through CHECK constraints.
pub(crate) fn check_snapshot_keys(snapshot: &Snapshot) -> Result<(), RepoError> {
    if snapshot.reporter_identity.is_empty() {
        return Err(RepoError::SchemaViolation(
            "reporter identity must not be empty".to_string(),
        ));
    }
    if snapshot.scanned_path.as_os_str().is_empty() {
        return Err(RepoError::SchemaViolation(
            "scanned path must not be empty".to_string(),
        ));
    }
    Ok(())
}
